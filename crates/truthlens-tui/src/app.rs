use ratatui::widgets::ListState;
use tokio::sync::mpsc;
use truthlens_core::{
    AnalysisKind, ChatMessage, ChatSession, DashboardStats, HistoryClient, HistoryFilter,
    HistoryItem, TruthLens, VerificationResult,
};

use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Analyze,
    Chat,
    History,
    Dashboard,
}

impl Screen {
    pub fn all() -> [Screen; 4] {
        [Screen::Analyze, Screen::Chat, Screen::History, Screen::Dashboard]
    }

    pub fn title(&self) -> &'static str {
        match self {
            Screen::Analyze => "Analyze",
            Screen::Chat => "Chat",
            Screen::History => "History",
            Screen::Dashboard => "Dashboard",
        }
    }

    pub fn next(&self) -> Screen {
        match self {
            Screen::Analyze => Screen::Chat,
            Screen::Chat => Screen::History,
            Screen::History => Screen::Dashboard,
            Screen::Dashboard => Screen::Analyze,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInField {
    Email,
    Password,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Error,
}

/// Dismissable notification; expires after a number of ticks.
#[derive(Debug, Clone)]
pub struct Toast {
    pub message: String,
    pub kind: ToastKind,
    pub ticks_left: u16,
}

const TOAST_TICKS: u16 = 20;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line editable text with a character cursor.
#[derive(Debug, Clone, Default)]
pub struct TextInput {
    pub value: String,
    pub cursor: usize,
}

impl TextInput {
    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.value, self.cursor);
        self.value.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.value.chars().count() {
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.value.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.value.chars().count();
    }

    pub fn set(&mut self, value: &str) {
        self.value = value.to_string();
        self.end();
    }

    pub fn clear(&mut self) {
        self.value.clear();
        self.cursor = 0;
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,
    pub lens: TruthLens,
    pub tx: mpsc::UnboundedSender<AppEvent>,

    // Analyze screen
    pub kind: AnalysisKind,
    pub input: TextInput,
    pub analyzing: bool,
    /// What was last submitted, for verification.
    pub last_submitted: Option<(AnalysisKind, String)>,
    pub result_scroll: u16,
    pub verification: Option<VerificationResult>,
    pub verifying: bool,

    // Chat screen. The session is checked out while a reply streams.
    pub chat: Option<ChatSession>,
    pub chat_view: Vec<ChatMessage>,
    pub chat_partial: Option<String>,
    pub chat_input: TextInput,
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,

    // History screen. Same check-out pattern as chat.
    pub history: Option<HistoryClient>,
    pub history_snapshot: Vec<HistoryItem>,
    pub history_state: ListState,
    pub history_filter: HistoryFilter,
    pub history_search: TextInput,
    pub searching: bool,

    // Dashboard
    pub dashboard: Option<DashboardStats>,
    pub dashboard_loading: bool,

    // Sign-in popup
    pub show_sign_in: bool,
    pub sign_in_email: TextInput,
    pub sign_in_password: TextInput,
    pub sign_in_field: SignInField,
    pub signing_in: bool,

    pub toast: Option<Toast>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation
}

impl App {
    pub fn new(lens: TruthLens, tx: mpsc::UnboundedSender<AppEvent>) -> Self {
        let chat = lens.chat();
        let history = lens.history();
        Self {
            should_quit: false,
            screen: Screen::Analyze,
            input_mode: InputMode::Normal,
            lens,
            tx,

            kind: AnalysisKind::Text,
            input: TextInput::default(),
            analyzing: false,
            last_submitted: None,
            result_scroll: 0,
            verification: None,
            verifying: false,

            chat: Some(chat),
            chat_view: Vec::new(),
            chat_partial: None,
            chat_input: TextInput::default(),
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            history: Some(history),
            history_snapshot: Vec::new(),
            history_state: ListState::default(),
            history_filter: HistoryFilter::All,
            history_search: TextInput::default(),
            searching: false,

            dashboard: None,
            dashboard_loading: false,

            show_sign_in: false,
            sign_in_email: TextInput::default(),
            sign_in_password: TextInput::default(),
            sign_in_field: SignInField::Email,
            signing_in: false,

            toast: None,
            animation_frame: 0,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.analyzing
            || self.verifying
            || self.chat.is_none()
            || self.history.is_none()
            || self.dashboard_loading
            || self.signing_in
    }

    pub fn notify(&mut self, message: impl Into<String>) {
        self.toast = Some(Toast {
            message: message.into(),
            kind: ToastKind::Info,
            ticks_left: TOAST_TICKS,
        });
    }

    pub fn notify_error(&mut self, err: &truthlens_core::Error) {
        self.toast = Some(Toast {
            message: err.user_message(),
            kind: ToastKind::Error,
            ticks_left: TOAST_TICKS,
        });
    }

    /// Tick animation frame and toast expiry (called by Tick event)
    pub fn tick(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        if let Some(toast) = &mut self.toast {
            toast.ticks_left = toast.ticks_left.saturating_sub(1);
            if toast.ticks_left == 0 {
                self.toast = None;
            }
        }
    }

    /// One line for the usage banner.
    pub fn usage_banner(&self) -> String {
        match self.lens.user() {
            Some(user) => format!("Signed in as {}", user.display_name()),
            None => match self.lens.remaining() {
                Ok(truthlens_core::Remaining::Limited(0)) => {
                    "Free trial exhausted. Press L to sign in.".to_string()
                }
                Ok(remaining) => format!("{} free analyses left. Press L to sign in.", remaining),
                Err(_) => String::new(),
            },
        }
    }

    pub fn kind_next(&mut self) {
        let kinds = AnalysisKind::all();
        let i = kinds.iter().position(|k| *k == self.kind).unwrap_or(0);
        self.kind = kinds[(i + 1) % kinds.len()];
    }

    pub fn kind_prev(&mut self) {
        let kinds = AnalysisKind::all();
        let i = kinds.iter().position(|k| *k == self.kind).unwrap_or(0);
        self.kind = kinds[(i + kinds.len() - 1) % kinds.len()];
    }

    pub fn sync_chat_view(&mut self) {
        if let Some(chat) = &self.chat {
            self.chat_view = chat.messages().to_vec();
        }
    }

    /// Items shown on the history screen, after the local search.
    pub fn visible_history(&self) -> Vec<HistoryItem> {
        match &self.history {
            Some(client) => client
                .search(&self.history_search.value)
                .into_iter()
                .cloned()
                .collect(),
            None => self.history_snapshot.clone(),
        }
    }

    pub fn selected_history(&self) -> Option<HistoryItem> {
        let items = self.visible_history();
        self.history_state.selected().and_then(|i| items.get(i).cloned())
    }

    pub fn history_nav_down(&mut self) {
        let len = self.visible_history().len();
        if len > 0 {
            let i = self.history_state.selected().unwrap_or(0);
            self.history_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn history_nav_up(&mut self) {
        let i = self.history_state.selected().unwrap_or(0);
        self.history_state.select(Some(i.saturating_sub(1)));
    }

    /// Keep the selection inside the list after it changed size.
    pub fn clamp_history_selection(&mut self) {
        let len = self.visible_history().len();
        match (len, self.history_state.selected()) {
            (0, _) => self.history_state.select(None),
            (_, None) => self.history_state.select(Some(0)),
            (len, Some(i)) if i >= len => self.history_state.select(Some(len - 1)),
            _ => {}
        }
    }

    /// Scroll chat to bottom so the streaming reply is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        let partial = self.chat_partial.iter();
        for content in self.chat_view.iter().map(|m| &m.content).chain(partial) {
            total_lines += 1; // Role line ("You:" or "AI:")
            for line in content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                total_lines += ((char_count / wrap_width) + 1) as u16;
            }
            total_lines += 1; // Blank line after message
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_input_edits_by_character() {
        let mut input = TextInput::default();
        for c in "héllo".chars() {
            input.insert(c);
        }
        input.left();
        input.left();
        input.backspace();
        assert_eq!(input.value, "hélo");
        input.home();
        input.delete();
        assert_eq!(input.value, "élo");
        input.end();
        input.insert('!');
        assert_eq!(input.value, "élo!");
        input.clear();
        assert_eq!(input.cursor, 0);
    }

    #[test]
    fn screens_cycle() {
        let mut screen = Screen::Analyze;
        for _ in 0..Screen::all().len() {
            screen = screen.next();
        }
        assert_eq!(screen, Screen::Analyze);
    }
}
