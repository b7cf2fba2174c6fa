use anyhow::Result;
use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{debug, warn};
use truthlens_core::{AnalysisKind, AnalysisRequest, ChatMessage, Error, HistoryFilter};

use crate::app::{App, InputMode, Screen, SignInField, TextInput};
use crate::tui::{AppEvent, HistoryOutcome, TaskEvent};

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick(),
        AppEvent::Task(task) => handle_task(app, task),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.show_sign_in {
        handle_sign_in_popup(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => {
            app.should_quit = true;
            return;
        }
        KeyCode::Char('1') => return switch_screen(app, Screen::Analyze),
        KeyCode::Char('2') => return switch_screen(app, Screen::Chat),
        KeyCode::Char('3') => return switch_screen(app, Screen::History),
        KeyCode::Char('4') => return switch_screen(app, Screen::Dashboard),
        KeyCode::Tab => {
            let next = app.screen.next();
            return switch_screen(app, next);
        }
        KeyCode::Char('L') => {
            if app.lens.user().is_none() {
                app.show_sign_in = true;
                app.sign_in_field = SignInField::Email;
            }
            return;
        }
        KeyCode::Char('O') => {
            if app.lens.user().is_some() {
                sign_out(app);
            }
            return;
        }
        KeyCode::Esc if app.toast.is_some() => {
            app.toast = None;
            return;
        }
        _ => {}
    }

    match app.screen {
        Screen::Analyze => handle_analyze_normal(app, key),
        Screen::Chat => handle_chat_normal(app, key),
        Screen::History => handle_history_normal(app, key),
        Screen::Dashboard => handle_dashboard_normal(app, key),
    }
}

fn switch_screen(app: &mut App, screen: Screen) {
    if app.screen == screen {
        return;
    }
    app.screen = screen;
    match screen {
        Screen::History => reload_history(app),
        Screen::Dashboard if app.dashboard.is_none() => load_dashboard(app),
        _ => {}
    }
}

fn handle_analyze_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('h') | KeyCode::Left => app.kind_prev(),
        KeyCode::Char('l') | KeyCode::Right => app.kind_next(),
        KeyCode::Char('i') | KeyCode::Char('e') => app.input_mode = InputMode::Editing,
        KeyCode::Enter => submit_analysis(app),
        KeyCode::Char('v') => submit_verification(app),
        KeyCode::Char('c') => open_chat_from_result(app),
        KeyCode::Char('x') => {
            app.lens.clear_result();
            app.verification = None;
            app.input.clear();
            app.result_scroll = 0;
        }
        KeyCode::Char('j') | KeyCode::Down => {
            app.result_scroll = app.result_scroll.saturating_add(1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.result_scroll = app.result_scroll.saturating_sub(1);
        }
        _ => {}
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('i') | KeyCode::Char('e') => app.input_mode = InputMode::Editing,
        KeyCode::Enter => send_chat(app),
        // Leaving the chat ends the conversation.
        KeyCode::Char('b') | KeyCode::Esc => {
            if let Some(chat) = &mut app.chat {
                chat.reset();
                app.chat_scroll = 0;
            }
            app.sync_chat_view();
            app.screen = Screen::Analyze;
        }
        KeyCode::Char('j') | KeyCode::Down => {
            app.chat_scroll = app.chat_scroll.saturating_add(1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.chat_scroll = app.chat_scroll.saturating_sub(1);
        }
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),
        _ => {}
    }
}

fn handle_history_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.history_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.history_nav_up(),
        KeyCode::Char('f') => {
            let next = match app.history_filter {
                HistoryFilter::All => HistoryFilter::Bookmarked,
                HistoryFilter::Bookmarked => HistoryFilter::All,
            };
            load_history(app, next);
        }
        KeyCode::Char('/') => {
            app.searching = true;
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Char('b') => {
            if let Some(item) = app.selected_history() {
                toggle_bookmark(app, item.id);
            }
        }
        KeyCode::Char('d') => {
            if let Some(item) = app.selected_history() {
                delete_history(app, item.id);
            }
        }
        KeyCode::Char('r') => reload_history(app),
        KeyCode::Enter => {
            if let Some(item) = app.selected_history() {
                match item.content.as_deref() {
                    Some(content) if item.analysis_type != AnalysisKind::Image => {
                        app.kind = item.analysis_type;
                        app.input.set(content);
                        app.verification = None;
                        app.screen = Screen::Analyze;
                    }
                    _ => app.notify("Image analyses cannot be re-run from history"),
                }
            }
        }
        _ => {}
    }
}

fn handle_dashboard_normal(app: &mut App, key: KeyEvent) {
    if let KeyCode::Char('r') = key.code {
        load_dashboard(app);
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    let searching = app.screen == Screen::History && app.searching;
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
            app.searching = false;
            return;
        }
        KeyCode::Enter => {
            app.input_mode = InputMode::Normal;
            match app.screen {
                Screen::Analyze => submit_analysis(app),
                Screen::Chat => send_chat(app),
                Screen::History => app.searching = false,
                Screen::Dashboard => {}
            }
            return;
        }
        _ => {}
    }

    let input = match app.screen {
        Screen::Analyze => &mut app.input,
        Screen::Chat => &mut app.chat_input,
        Screen::History if searching => &mut app.history_search,
        _ => return,
    };
    edit_text(input, key);

    if searching {
        app.clamp_history_selection();
    }
}

/// Apply one editing key to a text field.
fn edit_text(input: &mut TextInput, key: KeyEvent) {
    match key.code {
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        KeyCode::Char(c) => input.insert(c),
        _ => {}
    }
}

fn handle_sign_in_popup(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.show_sign_in = false;
            app.sign_in_password.clear();
        }
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Down | KeyCode::Up => {
            app.sign_in_field = match app.sign_in_field {
                SignInField::Email => SignInField::Password,
                SignInField::Password => SignInField::Email,
            };
        }
        KeyCode::Enter => match app.sign_in_field {
            SignInField::Email => app.sign_in_field = SignInField::Password,
            SignInField::Password => sign_in(app),
        },
        _ => {
            let field = match app.sign_in_field {
                SignInField::Email => &mut app.sign_in_email,
                SignInField::Password => &mut app.sign_in_password,
            };
            edit_text(field, key);
        }
    }
}

// Background work. Each operation spawns a task that reports back through
// the event channel; clients with `&mut self` operations are checked out
// of the App for the duration.

fn submit_analysis(app: &mut App) {
    if app.analyzing {
        return;
    }
    let input = app.input.value.trim().to_string();
    let kind = app.kind;
    app.analyzing = true;
    app.verification = None;
    app.result_scroll = 0;
    app.last_submitted = Some((kind, input.clone()));

    let lens = app.lens.clone();
    let tx = app.tx.clone();
    tokio::spawn(async move {
        let result = match AnalysisRequest::from_input(kind, &input).await {
            Ok(request) => lens.analyze(request).await,
            Err(err) => Err(err),
        };
        let _ = tx.send(AppEvent::Task(TaskEvent::Analysis(result)));
    });
}

fn submit_verification(app: &mut App) {
    if app.verifying || app.lens.analysis_state().result().is_none() {
        return;
    }
    let Some((kind, content)) = app.last_submitted.clone() else {
        return;
    };
    if kind == AnalysisKind::Image {
        app.notify("Source verification works on text and links");
        return;
    }
    app.verifying = true;

    let lens = app.lens.clone();
    let tx = app.tx.clone();
    tokio::spawn(async move {
        let result = lens.verify(&content, kind).await;
        let _ = tx.send(AppEvent::Task(TaskEvent::Verification(result)));
    });
}

fn open_chat_from_result(app: &mut App) {
    let state = app.lens.analysis_state();
    let Some(result) = state.result() else {
        return;
    };
    if let Some(chat) = &mut app.chat {
        chat.seed_from(result);
    }
    app.sync_chat_view();
    app.screen = Screen::Chat;
    app.scroll_chat_to_bottom();
}

fn send_chat(app: &mut App) {
    let message = app.chat_input.value.trim().to_string();
    if message.is_empty() {
        return;
    }
    // Still streaming the previous reply.
    let Some(mut chat) = app.chat.take() else {
        return;
    };
    app.chat_input.clear();
    app.chat_view.push(ChatMessage::user(message.clone()));
    app.chat_partial = Some(String::new());
    app.scroll_chat_to_bottom();

    let context = app.lens.analysis_state().result().cloned();
    let tx = app.tx.clone();
    tokio::spawn(async move {
        let delta_tx = tx.clone();
        let result = chat
            .send(&message, context.as_ref(), |running| {
                let _ = delta_tx.send(AppEvent::Task(TaskEvent::ChatDelta(running.to_string())));
            })
            .await;
        let _ = tx.send(AppEvent::Task(TaskEvent::ChatFinished(Box::new(chat), result)));
    });
}

fn load_history(app: &mut App, filter: HistoryFilter) {
    let snapshot = app.visible_history();
    let Some(mut client) = app.history.take() else {
        return;
    };
    app.history_snapshot = snapshot;
    app.history_filter = filter;

    let tx = app.tx.clone();
    tokio::spawn(async move {
        let outcome = client.list(filter).await.map(|_| HistoryOutcome::Loaded);
        let _ = tx.send(AppEvent::Task(TaskEvent::History(client, outcome)));
    });
}

fn reload_history(app: &mut App) {
    let filter = app.history_filter;
    load_history(app, filter);
}

fn toggle_bookmark(app: &mut App, id: String) {
    let snapshot = app.visible_history();
    let Some(mut client) = app.history.take() else {
        return;
    };
    app.history_snapshot = snapshot;

    let tx = app.tx.clone();
    tokio::spawn(async move {
        let outcome = client
            .toggle_bookmark(&id)
            .await
            .map(HistoryOutcome::Bookmarked);
        let _ = tx.send(AppEvent::Task(TaskEvent::History(client, outcome)));
    });
}

fn delete_history(app: &mut App, id: String) {
    let snapshot = app.visible_history();
    let Some(mut client) = app.history.take() else {
        return;
    };
    app.history_snapshot = snapshot;

    let tx = app.tx.clone();
    tokio::spawn(async move {
        let outcome = client.delete(&id).await.map(|_| HistoryOutcome::Deleted);
        let _ = tx.send(AppEvent::Task(TaskEvent::History(client, outcome)));
    });
}

fn load_dashboard(app: &mut App) {
    if app.dashboard_loading {
        return;
    }
    app.dashboard_loading = true;

    let lens = app.lens.clone();
    let tx = app.tx.clone();
    tokio::spawn(async move {
        let result = lens.dashboard(Utc::now().date_naive()).await;
        let _ = tx.send(AppEvent::Task(TaskEvent::Dashboard(result)));
    });
}

fn sign_in(app: &mut App) {
    if app.signing_in {
        return;
    }
    let email = app.sign_in_email.value.trim().to_string();
    let password = app.sign_in_password.value.clone();
    if email.is_empty() || password.is_empty() {
        app.notify_error(&Error::Validation(
            "Please enter your email and password".to_string(),
        ));
        return;
    }
    app.signing_in = true;

    let lens = app.lens.clone();
    let tx = app.tx.clone();
    tokio::spawn(async move {
        let result = lens.sign_in(&email, &password).await;
        let _ = tx.send(AppEvent::Task(TaskEvent::SignedIn(result)));
    });
}

fn sign_out(app: &mut App) {
    let lens = app.lens.clone();
    let tx = app.tx.clone();
    tokio::spawn(async move {
        let result = lens.sign_out().await;
        let _ = tx.send(AppEvent::Task(TaskEvent::SignedOut(result)));
    });
}

fn handle_task(app: &mut App, task: TaskEvent) {
    match task {
        TaskEvent::Analysis(result) => {
            app.analyzing = false;
            match result {
                Ok(analysis) => {
                    debug!(verdict = analysis.verdict.as_str(), "analysis shown");
                    // Stats now include this result.
                    app.dashboard = None;
                }
                Err(err) => {
                    if matches!(err, Error::UsageLimitReached) {
                        app.show_sign_in = true;
                        app.sign_in_field = SignInField::Email;
                    }
                    app.notify_error(&err);
                }
            }
        }
        TaskEvent::Verification(result) => {
            app.verifying = false;
            match result {
                Ok(verification) => app.verification = Some(verification),
                Err(err) => app.notify_error(&err),
            }
        }
        TaskEvent::ChatDelta(running) => {
            app.chat_partial = Some(running);
            app.scroll_chat_to_bottom();
        }
        TaskEvent::ChatFinished(chat, result) => {
            app.chat = Some(*chat);
            app.chat_partial = None;
            app.sync_chat_view();
            app.scroll_chat_to_bottom();
            if let Err(err) = result {
                if matches!(err, Error::UsageLimitReached) {
                    app.show_sign_in = true;
                }
                app.notify_error(&err);
            }
        }
        TaskEvent::History(client, outcome) => {
            app.history = Some(client);
            match outcome {
                Ok(HistoryOutcome::Loaded) => {}
                Ok(HistoryOutcome::Bookmarked(true)) => app.notify("Added to bookmarks"),
                Ok(HistoryOutcome::Bookmarked(false)) => app.notify("Removed from bookmarks"),
                Ok(HistoryOutcome::Deleted) => {
                    app.notify("Item deleted");
                    app.dashboard = None;
                }
                Err(err) => {
                    warn!(error = %err, "history operation failed");
                    app.notify_error(&err);
                }
            }
            app.clamp_history_selection();
        }
        TaskEvent::Dashboard(result) => {
            app.dashboard_loading = false;
            match result {
                Ok(stats) => app.dashboard = Some(stats),
                Err(err) => app.notify_error(&err),
            }
        }
        TaskEvent::SignedIn(result) => {
            app.signing_in = false;
            match result {
                Ok(user) => {
                    app.show_sign_in = false;
                    app.sign_in_password.clear();
                    app.notify(format!("Signed in as {}", user.display_name()));
                    app.dashboard = None;
                    if app.screen == Screen::History {
                        reload_history(app);
                    }
                }
                Err(err) => app.notify_error(&err),
            }
        }
        TaskEvent::SignedOut(result) => {
            match result {
                Ok(()) => app.notify("Signed out"),
                Err(err) => app.notify_error(&err),
            }
            app.dashboard = None;
            load_history(app, HistoryFilter::All);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventKind;
    use truthlens_core::{Config, TruthLens};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: crossterm::event::KeyEventState::NONE,
        }
    }

    fn test_app(dir: &std::path::Path) -> App {
        let mut config = Config::new();
        config.backend_url = Some("http://127.0.0.1:9".to_string());
        config.anon_key = Some("anon".to_string());
        let lens = TruthLens::open_in(config, dir).unwrap();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        App::new(lens, tx)
    }

    #[tokio::test]
    async fn typing_edits_the_active_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());

        handle_key(&mut app, key(KeyCode::Char('i')));
        assert_eq!(app.input_mode, InputMode::Editing);
        for c in "hi".chars() {
            handle_key(&mut app, key(KeyCode::Char(c)));
        }
        // 'q' is text while editing.
        handle_key(&mut app, key(KeyCode::Char('q')));
        assert!(!app.should_quit);
        assert_eq!(app.input.value, "hiq");

        handle_key(&mut app, key(KeyCode::Esc));
        assert_eq!(app.input_mode, InputMode::Normal);
        handle_key(&mut app, key(KeyCode::Char('q')));
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn kind_tabs_wrap_around() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        handle_key(&mut app, key(KeyCode::Left));
        assert_eq!(app.kind, AnalysisKind::Image);
        handle_key(&mut app, key(KeyCode::Right));
        assert_eq!(app.kind, AnalysisKind::Text);
    }

    #[tokio::test]
    async fn sign_in_popup_captures_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());

        handle_key(&mut app, key(KeyCode::Char('L')));
        assert!(app.show_sign_in);
        handle_key(&mut app, key(KeyCode::Char('q')));
        assert!(!app.should_quit);
        assert_eq!(app.sign_in_email.value, "q");

        handle_key(&mut app, key(KeyCode::Tab));
        handle_key(&mut app, key(KeyCode::Char('x')));
        assert_eq!(app.sign_in_password.value, "x");

        handle_key(&mut app, key(KeyCode::Esc));
        assert!(!app.show_sign_in);
        assert!(app.sign_in_password.value.is_empty());
    }

    #[tokio::test]
    async fn chat_finish_returns_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        let chat = app.chat.take().unwrap();
        app.chat_partial = Some("partial".to_string());

        handle_task(
            &mut app,
            TaskEvent::ChatFinished(Box::new(chat), Err(Error::UsageLimitReached)),
        );
        assert!(app.chat.is_some());
        assert!(app.chat_partial.is_none());
        assert!(app.show_sign_in);
        assert_eq!(
            app.toast.as_ref().map(|t| t.message.as_str()),
            Some("Free trial exhausted. Please sign in to continue.")
        );
    }
}
