//! Keyboard input handling for the TUI.
//!
//! This module handles all keyboard events and translates them into
//! application state changes. Returns `true` from `handle_input` when the
//! application should quit.

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};

use crate::app::{can_add_open_id_char, can_add_password_char, App, AppState, LoginFocus};
use crate::auth::LoginMode;

pub fn handle_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match app.state {
        AppState::Quitting => Ok(true),
        AppState::Home => handle_home_input(app, key),
        AppState::Login => match app.flow.mode() {
            LoginMode::Qr => handle_qr_input(app, key),
            LoginMode::Password => handle_password_input(app, key),
        },
    }
}

fn handle_home_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            app.quit();
            Ok(true)
        }
        KeyCode::Char('x') => {
            app.sign_out();
            Ok(false)
        }
        _ => Ok(false),
    }
}

fn handle_qr_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            app.quit();
            Ok(true)
        }
        KeyCode::Char('p') => {
            app.switch_to_password();
            Ok(false)
        }
        KeyCode::Char('r') => {
            app.refresh_code();
            Ok(false)
        }
        _ => Ok(false),
    }
}

fn handle_password_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match key.code {
        KeyCode::Esc => {
            // Back to the scannable code
            app.switch_to_qr();
            Ok(false)
        }
        KeyCode::Tab | KeyCode::Down => {
            app.login_focus = match app.login_focus {
                LoginFocus::OpenId => LoginFocus::Password,
                LoginFocus::Password => LoginFocus::Button,
                LoginFocus::Button => LoginFocus::OpenId,
            };
            Ok(false)
        }
        KeyCode::BackTab | KeyCode::Up => {
            app.login_focus = match app.login_focus {
                LoginFocus::OpenId => LoginFocus::Button,
                LoginFocus::Password => LoginFocus::OpenId,
                LoginFocus::Button => LoginFocus::Password,
            };
            Ok(false)
        }
        KeyCode::Enter => {
            match app.login_focus {
                LoginFocus::OpenId => app.login_focus = LoginFocus::Password,
                LoginFocus::Password => app.login_focus = LoginFocus::Button,
                LoginFocus::Button => app.submit_password_form(),
            }
            Ok(false)
        }
        KeyCode::Backspace => {
            match app.login_focus {
                LoginFocus::OpenId => {
                    app.open_id_input.pop();
                }
                LoginFocus::Password => {
                    app.password_input.pop();
                }
                LoginFocus::Button => {}
            }
            Ok(false)
        }
        KeyCode::Char(c) => {
            match app.login_focus {
                LoginFocus::OpenId => {
                    if can_add_open_id_char(app.open_id_input.len(), c) {
                        app.open_id_input.push(c);
                    }
                }
                LoginFocus::Password => {
                    if can_add_password_char(app.password_input.len(), c) {
                        app.password_input.push(c);
                    }
                }
                LoginFocus::Button => {}
            }
            Ok(false)
        }
        _ => Ok(false),
    }
}
