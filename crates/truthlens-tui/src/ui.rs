use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Bar, BarChart, BarGroup, Block, Borders, Clear, List, ListItem, Paragraph, Tabs, Wrap,
    },
};
use truthlens_core::util::truncate_chars;
use truthlens_core::{
    AnalysisKind, AnalysisResult, AnalysisState, ChatRole, EvidenceKind, HistoryFilter,
    VerificationResult, VerificationStatus, Verdict,
};

use crate::app::{App, InputMode, Screen, SignInField, TextInput, ToastKind};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn verdict_color(verdict: Verdict) -> Color {
    match verdict {
        Verdict::Verified => Color::Green,
        Verdict::Suspicious => Color::Yellow,
        Verdict::Fake => Color::Red,
        Verdict::Unknown => Color::Gray,
    }
}

fn status_color(status: VerificationStatus) -> Color {
    match status {
        VerificationStatus::Verified => Color::Green,
        VerificationStatus::Unverified => Color::Gray,
        VerificationStatus::Misleading => Color::Yellow,
        VerificationStatus::LikelyFake => Color::Red,
    }
}

/// Ten-cell bar for a 0-100 value.
fn meter(value: u8) -> String {
    let filled = (value.min(100) as usize + 5) / 10;
    format!("{}{} {:>3}%", "█".repeat(filled), "░".repeat(10 - filled), value)
}

fn dots(app: &App) -> String {
    // Animated ellipsis: cycles through ".", "..", "..."
    ".".repeat((app.animation_frame as usize) + 1)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Analyze => render_analyze_screen(app, frame, body_area),
        Screen::Chat => render_chat_screen(app, frame, body_area),
        Screen::History => render_history_screen(app, frame, body_area),
        Screen::Dashboard => render_dashboard_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if app.show_sign_in {
        render_sign_in(app, frame, area);
    }
    render_toast(app, frame, body_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![Span::styled(
        " TruthLens AI ",
        Style::default().fg(Color::Cyan).bold(),
    )];
    for (i, screen) in Screen::all().iter().enumerate() {
        let style = if *screen == app.screen {
            Style::default().fg(Color::White).bold()
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(format!(" {} {} ", i + 1, screen.title()), style));
    }
    spans.push(Span::styled(
        format!(" {} ", app.usage_banner()),
        Style::default().fg(Color::Yellow),
    ));
    spans.push(Span::styled(
        format!("v{}", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::Gray),
    ));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => format!(" {} ", app.screen.title().to_uppercase()),
        InputMode::Editing => " EDIT ".to_string(),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let hint = |key: &'static str, label: &'static str| {
        [
            Span::styled(format!(" {} ", key), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    };

    let pairs: Vec<(&'static str, &'static str)> = if app.show_sign_in {
        vec![("Tab", "field"), ("Enter", "sign in"), ("Esc", "cancel")]
    } else {
        match (app.screen, app.input_mode) {
            (_, InputMode::Editing) => vec![("Enter", "submit"), ("Esc", "done")],
            (Screen::Analyze, InputMode::Normal) => vec![
                ("h/l", "type"),
                ("i", "edit"),
                ("Enter", "analyze"),
                ("v", "verify source"),
                ("c", "chat"),
                ("x", "clear"),
            ],
            (Screen::Chat, InputMode::Normal) => vec![
                ("i", "type"),
                ("j/k", "scroll"),
                ("b", "end chat"),
            ],
            (Screen::History, InputMode::Normal) => vec![
                ("j/k", "nav"),
                ("Enter", "re-analyze"),
                ("b", "bookmark"),
                ("d", "delete"),
                ("f", "filter"),
                ("/", "search"),
            ],
            (Screen::Dashboard, InputMode::Normal) => vec![("r", "refresh")],
        }
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in pairs {
        spans.extend(hint(key, label));
    }
    if app.input_mode == InputMode::Normal && !app.show_sign_in {
        spans.extend(hint("Tab", "screen"));
        if app.lens.user().is_some() {
            spans.extend(hint("O", "sign out"));
        } else {
            spans.extend(hint("L", "sign in"));
        }
        spans.extend(hint("q", "quit"));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Bordered one-line input with horizontal scrolling; places the cursor
/// when `editing`.
fn render_input(
    frame: &mut Frame,
    area: Rect,
    input: &TextInput,
    title: &str,
    placeholder: &str,
    editing: bool,
) {
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" {} ", title));

    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 || input.cursor < inner_width {
        0
    } else {
        input.cursor - inner_width + 1
    };

    let paragraph = if input.value.is_empty() && !editing {
        Paragraph::new(Span::styled(
            placeholder.to_string(),
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let visible: String = input
            .value
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();
        Paragraph::new(visible).style(Style::default().fg(Color::Cyan))
    };
    frame.render_widget(paragraph.block(block), area);

    if editing {
        let cursor_x = (input.cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_analyze_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [tabs_area, input_area, result_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .areas(area);

    let kinds = AnalysisKind::all();
    let selected = kinds.iter().position(|k| *k == app.kind).unwrap_or(0);
    let tabs = Tabs::new(kinds.iter().map(|k| k.display_name()))
        .select(selected)
        .block(Block::default().borders(Borders::ALL).title(" Content type "))
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, tabs_area);

    let (title, placeholder) = match app.kind {
        AnalysisKind::Text => ("Message", "Paste the message, post, or claim to check..."),
        AnalysisKind::Link => ("URL", "https://..."),
        AnalysisKind::Image => ("Image file", "Path to a screenshot or photo (max 10 MB)"),
    };
    render_input(
        frame,
        input_area,
        &app.input,
        title,
        placeholder,
        app.input_mode == InputMode::Editing,
    );

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Result ");

    let text = if app.analyzing {
        Text::from(Span::styled(
            format!("Analyzing{}", dots(app)),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ))
    } else {
        match app.lens.analysis_state() {
            AnalysisState::Ready(result) => {
                let mut lines = result_lines(&result);
                if app.verifying {
                    lines.push(Line::from(Span::styled(
                        format!("Checking official sources{}", dots(app)),
                        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                    )));
                } else if let Some(verification) = &app.verification {
                    lines.extend(verification_lines(verification));
                }
                Text::from(lines)
            }
            AnalysisState::Failed(message) => {
                Text::from(Span::styled(message, Style::default().fg(Color::Red)))
            }
            AnalysisState::Idle | AnalysisState::Loading => Text::from(Span::styled(
                "Enter content above and press Enter to check it.",
                Style::default().fg(Color::DarkGray),
            )),
        }
    };

    let paragraph = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.result_scroll, 0));
    frame.render_widget(paragraph, result_area);
}

fn result_lines(result: &AnalysisResult) -> Vec<Line<'static>> {
    let color = verdict_color(result.verdict);
    let mut lines = vec![
        Line::from(vec![
            Span::styled(
                format!(" {} ", result.verdict.label().to_uppercase()),
                Style::default().bg(color).fg(Color::Black).bold(),
            ),
            Span::raw("  confidence "),
            Span::styled(meter(result.confidence), Style::default().fg(color)),
        ]),
        Line::default(),
    ];
    lines.extend(result.explanation.lines().map(parse_markdown_line));

    if !result.indicators.is_empty() {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled("Indicators", Style::default().bold())));
        for indicator in &result.indicators {
            lines.push(Line::from(vec![
                Span::raw(format!("  {:<24}", truncate_chars(&indicator.label, 24))),
                Span::styled(meter(indicator.value), Style::default().fg(Color::Cyan)),
            ]));
        }
    }

    if !result.evidence.is_empty() {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled("Evidence", Style::default().bold())));
        for evidence in &result.evidence {
            let (mark, color) = match evidence.kind {
                EvidenceKind::Info => ("i", Color::Blue),
                EvidenceKind::Warning => ("!", Color::Yellow),
                EvidenceKind::Danger => ("x", Color::Red),
                EvidenceKind::Success => ("+", Color::Green),
            };
            lines.push(Line::from(vec![
                Span::styled(format!("  [{}] ", mark), Style::default().fg(color).bold()),
                Span::raw(evidence.text.clone()),
            ]));
        }
    }

    if !result.suggested_action.is_empty() {
        lines.push(Line::default());
        lines.push(Line::from(vec![
            Span::styled("What to do: ", Style::default().fg(Color::Cyan).bold()),
            Span::raw(result.suggested_action.clone()),
        ]));
    }
    lines.push(Line::default());
    lines
}

fn verification_lines(verification: &VerificationResult) -> Vec<Line<'static>> {
    let color = status_color(verification.status);
    let mut lines = vec![
        Line::from(Span::styled("Source verification", Style::default().bold())),
        Line::from(vec![
            Span::styled(
                format!(" {} ", verification.status.label().to_uppercase()),
                Style::default().bg(color).fg(Color::Black).bold(),
            ),
            Span::raw("  "),
            Span::styled(meter(verification.confidence), Style::default().fg(color)),
        ]),
    ];

    let mut entity = format!("Entity: {}", verification.entity.name);
    if let Some(domain) = &verification.entity.official_domain {
        entity.push_str(&format!(" ({})", domain));
    }
    lines.push(Line::from(entity));
    lines.extend(verification.explanation.lines().map(parse_markdown_line));

    for discrepancy in &verification.verification.discrepancies {
        lines.push(Line::from(Span::styled(
            format!("  - {}", discrepancy),
            Style::default().fg(Color::Yellow),
        )));
    }
    if !verification.suggested_action.is_empty() {
        lines.push(Line::from(vec![
            Span::styled("What to do: ", Style::default().fg(Color::Cyan).bold()),
            Span::raw(verification.suggested_action.clone()),
        ]));
    }
    for source in &verification.sources {
        lines.push(Line::from(Span::styled(
            format!("  {}", source),
            Style::default().fg(Color::Blue).add_modifier(Modifier::UNDERLINED),
        )));
    }
    lines
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Assistant ");

    let chat_text = if app.chat_view.is_empty() && app.chat_partial.is_none() {
        Text::from(Span::styled(
            "Ask how to spot scams, or press c on a result to discuss it...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();
        let you = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
        let ai = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);

        for msg in &app.chat_view {
            match msg.role {
                ChatRole::User => {
                    lines.push(Line::from(Span::styled("You:", you)));
                    lines.push(Line::from(msg.content.clone()));
                }
                ChatRole::Assistant => {
                    lines.push(Line::from(Span::styled("AI:", ai)));
                    lines.extend(msg.content.lines().map(parse_markdown_line));
                }
            }
            lines.push(Line::default());
        }

        match app.chat_partial.as_deref() {
            Some("") => {
                lines.push(Line::from(Span::styled("AI:", ai)));
                lines.push(Line::from(Span::styled(
                    format!("Thinking{}", dots(app)),
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                )));
            }
            Some(partial) => {
                lines.push(Line::from(Span::styled("AI:", ai)));
                lines.extend(partial.lines().map(parse_markdown_line));
            }
            None => {}
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    render_input(
        frame,
        input_area,
        &app.chat_input,
        "Ask",
        "Press i to type a question",
        app.input_mode == InputMode::Editing,
    );
}

fn render_history_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [search_area, body_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).areas(area);
    let [list_area, detail_area] =
        Layout::horizontal([Constraint::Percentage(55), Constraint::Percentage(45)])
            .areas(body_area);

    render_input(
        frame,
        search_area,
        &app.history_search,
        "Search",
        "Press / to search content and explanations",
        app.input_mode == InputMode::Editing && app.searching,
    );

    let items = app.visible_history();
    let filter_label = match app.history_filter {
        HistoryFilter::All => "All",
        HistoryFilter::Bookmarked => "Bookmarked",
    };
    let loading = if app.history.is_none() { " loading" } else { "" };
    let list_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" History: {} ({}){} ", filter_label, items.len(), loading));

    if app.lens.user().is_none() {
        let hint = Paragraph::new("Sign in (L) to keep a history of your analyses.")
            .style(Style::default().fg(Color::DarkGray))
            .block(list_block);
        frame.render_widget(hint, list_area);
    } else {
        let width = list_area.width.saturating_sub(30) as usize;
        let rows: Vec<ListItem> = items
            .iter()
            .map(|item| {
                let verdict = item.verdict();
                let star = if item.is_bookmarked { "★ " } else { "  " };
                let content = item.content.as_deref().unwrap_or("(image)");
                ListItem::new(Line::from(vec![
                    Span::styled(star, Style::default().fg(Color::Yellow)),
                    Span::styled(
                        format!("{:<10}", verdict.label()),
                        Style::default().fg(verdict_color(verdict)),
                    ),
                    Span::styled(
                        format!("{:<6}", item.analysis_type.display_name()),
                        Style::default().fg(Color::DarkGray),
                    ),
                    Span::raw(truncate_chars(&content.replace('\n', " "), width.max(10))),
                ]))
            })
            .collect();

        let list = List::new(rows)
            .block(list_block)
            .highlight_style(
                Style::default()
                    .bg(Color::Cyan)
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, list_area, &mut app.history_state);
    }

    let detail_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Details ");
    let detail = match app.selected_history() {
        Some(item) => {
            let mut lines = vec![
                Line::from(Span::styled(
                    item.created_at.format("%Y-%m-%d %H:%M UTC").to_string(),
                    Style::default().fg(Color::DarkGray),
                )),
                Line::default(),
            ];
            if let Some(content) = &item.content {
                lines.extend(content.lines().map(|l| Line::from(l.to_string())));
                lines.push(Line::default());
            }
            lines.extend(result_lines(&item.to_result()));
            Text::from(lines)
        }
        None => Text::from(Span::styled(
            "Nothing selected",
            Style::default().fg(Color::DarkGray),
        )),
    };
    frame.render_widget(
        Paragraph::new(detail)
            .block(detail_block)
            .wrap(Wrap { trim: false }),
        detail_area,
    );
}

fn render_dashboard_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let Some(stats) = &app.dashboard else {
        let message = if app.dashboard_loading {
            format!("Loading{}", dots(app))
        } else {
            "Press r to load your statistics.".to_string()
        };
        let paragraph = Paragraph::new(Span::styled(message, Style::default().fg(Color::DarkGray)))
            .block(Block::default().borders(Borders::ALL).title(" Dashboard "));
        frame.render_widget(paragraph, area);
        return;
    };

    let [cards_area, chart_area, breakdown_area] = Layout::vertical([
        Constraint::Length(4),
        Constraint::Min(8),
        Constraint::Length(6),
    ])
    .areas(area);

    let cards = Layout::horizontal([Constraint::Ratio(1, 4); 4]).split(cards_area);
    let card_data = [
        ("Total checks", stats.total, Color::Cyan),
        ("Verified", stats.verified, Color::Green),
        ("Suspicious", stats.suspicious, Color::Yellow),
        ("Fake / Scam", stats.fake, Color::Red),
    ];
    for ((label, count, color), card_area) in card_data.into_iter().zip(cards.iter()) {
        let card = Paragraph::new(Line::from(Span::styled(
            count.to_string(),
            Style::default().fg(color).bold(),
        )))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .title(format!(" {} ", label)),
        );
        frame.render_widget(card, *card_area);
    }

    let bars: Vec<Bar> = stats
        .activity
        .iter()
        .map(|day| {
            Bar::default()
                .value(day.count as u64)
                .label(Line::from(day.date.format("%a").to_string()))
        })
        .collect();
    let chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Last 7 days "),
        )
        .data(BarGroup::default().bars(&bars))
        .bar_width(5)
        .bar_gap(2)
        .bar_style(Style::default().fg(Color::Cyan))
        .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));
    frame.render_widget(chart, chart_area);

    let mut lines: Vec<Line> = Vec::new();
    let verdicts = stats.verdict_breakdown();
    if verdicts.is_empty() {
        lines.push(Line::from(Span::styled(
            "No analyses yet.",
            Style::default().fg(Color::DarkGray),
        )));
    } else {
        let spans: Vec<Span> = verdicts
            .iter()
            .map(|(label, n)| Span::raw(format!("{}: {}   ", label, n)))
            .collect();
        lines.push(Line::from(spans));
    }
    let kinds: Vec<Span> = stats
        .kind_breakdown()
        .iter()
        .map(|(kind, n)| Span::raw(format!("{}: {}   ", kind.display_name(), n)))
        .collect();
    lines.push(Line::from(kinds));
    lines.push(Line::from(vec![
        Span::styled("★ ", Style::default().fg(Color::Yellow)),
        Span::raw(format!("{} bookmarked", stats.bookmarked)),
    ]));

    let breakdown = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Breakdown "),
    );
    frame.render_widget(breakdown, breakdown_area);
}

fn render_sign_in(app: &App, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 9;

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Sign in ");
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let status = if app.signing_in {
        format!("Signing in{}", dots(app))
    } else {
        "Sign in for unlimited analyses and saved history.".to_string()
    };
    frame.render_widget(
        Paragraph::new(status).style(Style::default().fg(Color::DarkGray)),
        Rect::new(inner.x, inner.y, inner.width, 1),
    );

    let fields = [
        (SignInField::Email, "Email    ", app.sign_in_email.value.clone(), &app.sign_in_email),
        (
            SignInField::Password,
            "Password ",
            "*".repeat(app.sign_in_password.value.chars().count()),
            &app.sign_in_password,
        ),
    ];
    for (row, (field, label, shown, input)) in fields.iter().enumerate() {
        let y = inner.y + 2 + (row as u16) * 2;
        let active = app.sign_in_field == *field;
        let label_style = if active {
            Style::default().fg(Color::Yellow).bold()
        } else {
            Style::default().fg(Color::Gray)
        };
        let line = Line::from(vec![
            Span::styled(*label, label_style),
            Span::styled(shown.clone(), Style::default().fg(Color::Cyan)),
        ]);
        frame.render_widget(Paragraph::new(line), Rect::new(inner.x, y, inner.width, 1));

        if active {
            let cursor_x = (label.len() + input.cursor).min(inner.width as usize) as u16;
            frame.set_cursor_position((inner.x + cursor_x, y));
        }
    }
}

fn render_toast(app: &App, frame: &mut Frame, area: Rect) {
    let Some(toast) = &app.toast else {
        return;
    };
    let width = (toast.message.chars().count() as u16 + 4)
        .min(area.width.saturating_sub(2))
        .max(10);
    let toast_area = Rect::new(
        area.x + area.width.saturating_sub(width + 1),
        area.y + area.height.saturating_sub(3),
        width,
        3.min(area.height),
    );
    let color = match toast.kind {
        ToastKind::Info => Color::Green,
        ToastKind::Error => Color::Red,
    };

    frame.render_widget(Clear, toast_area);
    let paragraph = Paragraph::new(toast.message.clone())
        .style(Style::default().fg(color))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color)),
        );
    frame.render_widget(paragraph, toast_area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_markdown_becomes_a_styled_span() {
        let line = parse_markdown_line("This is **likely a scam** today");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "likely a scam");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn unclosed_bold_stays_literal() {
        let line = parse_markdown_line("a **b");
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "a **b");
    }

    #[test]
    fn meter_rounds_to_cells() {
        assert_eq!(meter(0), "░░░░░░░░░░   0%");
        assert_eq!(meter(100), "██████████ 100%");
        assert!(meter(75).starts_with("████████░░"));
    }
}
