//! Frame rendering for the login screens and the home view.

use ratatui::layout::Rect;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::Frame;

use crate::app::{App, AppState, LoginFocus};
use crate::auth::{FlowState, LoginMode};

use super::styles;

/// Minimum width of the login dialogs
const MIN_DIALOG_WIDTH: u16 = 46;

pub fn render(frame: &mut Frame, app: &App) {
    match app.state {
        AppState::Home => render_home(frame, app),
        _ => match app.flow.mode() {
            LoginMode::Qr => render_qr_login(frame, app),
            LoginMode::Password => render_password_login(frame, app),
        },
    }
}

fn render_qr_login(frame: &mut Frame, app: &App) {
    let mut lines = vec![
        Line::from(Span::styled("  Sign in to Inkdesk", styles::title_style())),
        Line::from(""),
    ];

    let qr_width = match app.qr_code {
        Some(ref code) => {
            let mut width = 0;
            for row in code.lines() {
                width = width.max(row.chars().count());
                lines.push(Line::from(Span::styled(
                    format!("  {}  ", row),
                    styles::qr_style(),
                )));
            }
            width as u16
        }
        None => {
            lines.push(Line::from(Span::styled(
                "  (no code yet)",
                styles::muted_style(),
            )));
            0
        }
    };

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "  Scan with the Inkdesk app, then confirm on your phone",
        styles::muted_style(),
    )));

    let status = match app.flow.state() {
        FlowState::Polling => Some(Line::from(Span::styled(
            format!(
                "  Waiting for the scan... ({}/{})",
                app.flow.poll_attempts(),
                app.flow.config().max_poll_attempts
            ),
            styles::highlight_style(),
        ))),
        _ => app.status_message.as_ref().map(|msg| {
            Line::from(Span::styled(format!("  {}", msg), styles::highlight_style()))
        }),
    };
    if let Some(status) = status {
        lines.push(status);
    }

    if let Some(ref error) = app.login_error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("  {}", error),
            styles::error_style(),
        )));
    }

    lines.push(Line::from(""));
    lines.push(key_hints(&[
        ("p", "password login"),
        ("r", "new code"),
        ("q", "quit"),
    ]));

    let width = MIN_DIALOG_WIDTH.max(qr_width + 6);
    let height = lines.len() as u16 + 2;
    draw_dialog(frame, lines, width, height);
}

fn render_password_login(frame: &mut Frame, app: &App) {
    let mut lines = vec![
        Line::from(Span::styled("  Sign in with OpenID", styles::title_style())),
        Line::from(""),
    ];

    // OpenID field
    let open_id_focused = app.login_focus == LoginFocus::OpenId;
    let open_id_style = if open_id_focused {
        styles::selected_style()
    } else {
        styles::field_style()
    };
    let cursor = if open_id_focused { "▌" } else { "" };
    lines.push(Line::from(vec![
        Span::raw("  "),
        Span::styled("OpenID:   [", styles::muted_style()),
        Span::styled(
            format!("{:<24}{}", app.open_id_input, cursor),
            open_id_style,
        ),
        Span::styled("]", styles::muted_style()),
    ]));

    // Password field (masked)
    let password_focused = app.login_focus == LoginFocus::Password;
    let password_style = if password_focused {
        styles::selected_style()
    } else {
        styles::field_style()
    };
    let masked: String = "*".repeat(app.password_input.len().min(24));
    let cursor = if password_focused { "▌" } else { "" };
    lines.push(Line::from(vec![
        Span::raw("  "),
        Span::styled("Password: [", styles::muted_style()),
        Span::styled(format!("{:<24}{}", masked, cursor), password_style),
        Span::styled("]", styles::muted_style()),
    ]));

    // Submit button
    let button_focused = app.login_focus == LoginFocus::Button;
    let button_style = if button_focused {
        styles::selected_style()
    } else {
        styles::field_style()
    };
    lines.push(Line::from(""));
    let label = if app.login_busy {
        " Signing in... "
    } else if button_focused {
        " ▶ Sign in ◀ "
    } else {
        "   Sign in   "
    };
    lines.push(Line::from(vec![
        Span::raw("            ["),
        Span::styled(label, button_style),
        Span::raw("]"),
    ]));

    if let Some(ref error) = app.login_error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("  {}", error),
            styles::error_style(),
        )));
    }

    lines.push(Line::from(""));
    lines.push(key_hints(&[
        ("Tab", "next field"),
        ("Enter", "submit"),
        ("Esc", "QR login"),
    ]));

    let height = lines.len() as u16 + 2;
    draw_dialog(frame, lines, MIN_DIALOG_WIDTH, height);
}

fn render_home(frame: &mut Frame, app: &App) {
    let mut lines = vec![
        Line::from(Span::styled("  Inkdesk", styles::title_style())),
        Line::from(""),
    ];

    match app.profile {
        Some(ref profile) => {
            lines.push(Line::from(vec![
                Span::raw("  Welcome, "),
                Span::styled(profile.display_name().to_string(), styles::success_style()),
            ]));
            lines.push(Line::from(Span::styled(
                format!("  {}", profile.membership_display()),
                styles::muted_style(),
            )));
        }
        None => {
            lines.push(Line::from(Span::styled(
                "  Signed in",
                styles::success_style(),
            )));
        }
    }

    if let Some(ref msg) = app.status_message {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("  {}", msg),
            styles::highlight_style(),
        )));
    }

    lines.push(Line::from(""));
    lines.push(key_hints(&[("x", "sign out"), ("q", "quit")]));

    let height = lines.len() as u16 + 2;
    draw_dialog(frame, lines, MIN_DIALOG_WIDTH, height);
}

fn key_hints(hints: &[(&str, &str)]) -> Line<'static> {
    let mut spans = vec![Span::raw("  ")];
    for (i, (key, desc)) in hints.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled("  ·  ", styles::muted_style()));
        }
        spans.push(Span::styled(format!("[{}]", key), styles::help_key_style()));
        spans.push(Span::styled(format!(" {}", desc), styles::help_desc_style()));
    }
    Line::from(spans)
}

fn draw_dialog(frame: &mut Frame, lines: Vec<Line>, width: u16, height: u16) {
    let area = centered_rect_fixed(width, height, frame.area());
    frame.render_widget(Clear, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));
    let paragraph = Paragraph::new(lines).block(block);
    frame.render_widget(paragraph, area);
}

/// Create a centered rectangle with fixed dimensions
fn centered_rect_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let x = r.x + (r.width.saturating_sub(width)) / 2;
    let y = r.y + (r.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(r.width), height.min(r.height))
}
