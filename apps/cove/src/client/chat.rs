use crate::auth::CredentialsStore;
use crate::client::conversation::{Authorship, ConversationLog};
use crate::session::{FailureReason, SessionConfig, SessionManager, SessionOutcome};
use crate::terminal::error::CliError;
use crate::transport::{ChannelEvent, ChatChannel, CloseReason};
use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// The activation flow: probe the stored identity, establish a session
/// (refreshing when no marker exists), open the chat channel, then hand the
/// terminal to the conversation loop. Session denial or failure never
/// reaches the channel; the redirect-to-login is the last observable
/// effect of a failed handshake.
pub async fn run(base_url: &str) -> Result<(), CliError> {
    let store_path = CredentialsStore::path()?;
    run_at(base_url, &store_path).await
}

async fn run_at(base_url: &str, store_path: &Path) -> Result<(), CliError> {
    let store = CredentialsStore::load_from(store_path).unwrap_or_default();
    let identity = store.identity().map(str::to_string);
    match &identity {
        Some(name) => {
            info!(target: "cove::client", identity = %name, "trusting stored identity")
        }
        None => info!(target: "cove::client", "no stored identity; refreshing session"),
    }

    let manager = SessionManager::new(SessionConfig::new(base_url)?)?;
    let outcome = manager
        .establish(identity.as_deref(), store.refresh_token.as_deref())
        .await?;

    let (identity, access_token) = match outcome {
        SessionOutcome::Established { renewed: None } => (identity, store.access_token.clone()),
        SessionOutcome::Established {
            renewed: Some(cookies),
        } => {
            let mut updated = store.clone();
            updated.apply(&cookies);
            updated.save_to(store_path)?;
            (
                updated.identity().map(str::to_string),
                updated.access_token.clone(),
            )
        }
        SessionOutcome::Denied => {
            return Err(CliError::LoginRequired {
                message: "unauthorized, please log in to your account".into(),
            });
        }
        SessionOutcome::Failed(FailureReason::ServerFault) => {
            return Err(CliError::LoginRequired {
                message: "the chat server reported an internal error".into(),
            });
        }
        SessionOutcome::Failed(FailureReason::Transport) => {
            return Err(CliError::LoginRequired {
                message: "could not refresh the chat session".into(),
            });
        }
    };

    let channel_url = manager.config().channel_url()?;
    let channel = match ChatChannel::connect(&channel_url, access_token.as_deref()).await {
        Ok(channel) => channel,
        Err(err) => {
            warn!(target: "cove::channel", error = %err, "chat channel handshake failed");
            CredentialsStore::clear_at(store_path)?;
            return Err(CliError::LoginRequired {
                message: "not authorized on the chat channel".into(),
            });
        }
    };

    let end = run_conversation(channel, identity).await?;
    conclude(end, store_path)
}

#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    UserQuit,
    ChannelClosed(CloseReason),
}

/// A channel error invalidates the stored identity so the next activation
/// re-enters the refresh path; a clean remote close does not.
fn conclude(end: SessionEnd, store_path: &Path) -> Result<(), CliError> {
    match end {
        SessionEnd::UserQuit => Ok(()),
        SessionEnd::ChannelClosed(CloseReason::Remote) => {
            println!("connection closed by the server");
            Ok(())
        }
        SessionEnd::ChannelClosed(CloseReason::Error(reason)) => {
            warn!(target: "cove::channel", error = %reason, "chat channel failed");
            CredentialsStore::clear_at(store_path)?;
            Err(CliError::LoginRequired {
                message: "not authorized on the chat channel".into(),
            })
        }
    }
}

/// The outbound input buffer. Whitespace-only input is a silent no-op that
/// keeps the buffer; only a real send clears it.
#[derive(Debug, Default)]
pub struct Composer {
    buffer: String,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, c: char) {
        self.buffer.push(c);
    }

    pub fn backspace(&mut self) {
        self.buffer.pop();
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn take_message(&mut self) -> Option<String> {
        let trimmed = self.buffer.trim();
        if trimmed.is_empty() {
            return None;
        }
        let text = trimmed.to_string();
        self.buffer.clear();
        Some(text)
    }
}

struct TerminalGuard {
    active: bool,
}

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen)?;
        Ok(Self { active: true })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.active {
            let _ = execute!(io::stdout(), LeaveAlternateScreen);
            let _ = disable_raw_mode();
        }
    }
}

async fn run_conversation(
    mut channel: ChatChannel,
    identity: Option<String>,
) -> Result<SessionEnd, CliError> {
    let _guard = TerminalGuard::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    terminal.clear()?;

    let mut log = ConversationLog::new(identity);
    let mut composer = Composer::new();
    let sender = channel.sender();

    let (event_tx, mut event_rx) = mpsc::channel(100);
    let pump = tokio::spawn(async move {
        loop {
            // Drain every pending event before sleeping so keystrokes are
            // never dropped between polls.
            while event::poll(Duration::from_millis(0)).unwrap_or(false) {
                if let Ok(evt) = event::read() {
                    if event_tx.send(evt).await.is_err() {
                        return;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });

    let end = loop {
        draw(&mut terminal, &log, &composer)?;

        tokio::select! {
            channel_event = channel.next_event() => match channel_event {
                Some(ChannelEvent::Message(message)) => {
                    log.append(message);
                }
                Some(ChannelEvent::Closed(reason)) => break SessionEnd::ChannelClosed(reason),
                None => break SessionEnd::ChannelClosed(CloseReason::Remote),
            },
            input = event_rx.recv() => match input {
                Some(Event::Key(key)) => match key.code {
                    KeyCode::Esc => break SessionEnd::UserQuit,
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        break SessionEnd::UserQuit;
                    }
                    KeyCode::Enter => {
                        if let Some(text) = composer.take_message() {
                            if let Err(err) = sender.send(&text) {
                                break SessionEnd::ChannelClosed(
                                    CloseReason::Error(err.to_string()),
                                );
                            }
                        }
                    }
                    KeyCode::Backspace => composer.backspace(),
                    KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                        composer.push(c)
                    }
                    _ => {}
                },
                Some(_) => {}
                None => break SessionEnd::UserQuit,
            },
        }
    };

    pump.abort();
    Ok(end)
}

fn draw(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    log: &ConversationLog,
    composer: &Composer,
) -> io::Result<()> {
    terminal.draw(|frame| {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(3)])
            .split(frame.area());

        let view_height = chunks[0].height.saturating_sub(2) as usize;
        let lines = conversation_lines(log);
        let scroll = lines.len().saturating_sub(view_height) as u16;
        let title = match log.local_identity() {
            Some(name) => format!(" cove · {name} "),
            None => " cove ".to_string(),
        };
        let messages = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title(title))
            .scroll((scroll, 0));
        frame.render_widget(messages, chunks[0]);

        let input = Paragraph::new(Line::from(vec![
            Span::raw(composer.as_str().to_string()),
            Span::styled("█", Style::default().fg(Color::Cyan)),
        ]))
        .block(Block::default().borders(Borders::ALL).title(" message "));
        frame.render_widget(input, chunks[1]);
    })?;
    Ok(())
}

fn conversation_lines(log: &ConversationLog) -> Vec<Line<'_>> {
    log.entries()
        .iter()
        .map(|entry| {
            let author = Span::styled(
                format!("{} ", entry.author),
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD),
            );
            match entry.authorship {
                Authorship::Local => Line::from(vec![
                    author,
                    Span::styled(entry.text.as_str(), Style::default().fg(Color::Cyan)),
                ])
                .alignment(Alignment::Right),
                Authorship::Remote => {
                    Line::from(vec![author, Span::raw(entry.text.as_str())])
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn composer_sends_trimmed_text() {
        let mut composer = Composer::new();
        for c in "  hello world  ".chars() {
            composer.push(c);
        }
        assert_eq!(composer.take_message().as_deref(), Some("hello world"));
        assert_eq!(composer.as_str(), "");
    }

    #[test]
    fn composer_ignores_whitespace_input() {
        let mut composer = Composer::new();
        for c in "   ".chars() {
            composer.push(c);
        }
        assert_eq!(composer.take_message(), None);
        // The buffer is only cleared by a real send.
        assert_eq!(composer.as_str(), "   ");
    }

    #[test]
    fn composer_keeps_buffer_on_empty() {
        let mut composer = Composer::new();
        assert_eq!(composer.take_message(), None);
        composer.push('a');
        composer.backspace();
        assert_eq!(composer.take_message(), None);
    }

    #[test]
    fn user_quit_concludes_quietly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials");
        CredentialsStore {
            username: Some("alice".into()),
            ..Default::default()
        }
        .save_to(&path)
        .unwrap();

        conclude(SessionEnd::UserQuit, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn remote_close_keeps_credentials() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials");
        CredentialsStore {
            username: Some("alice".into()),
            ..Default::default()
        }
        .save_to(&path)
        .unwrap();

        conclude(SessionEnd::ChannelClosed(CloseReason::Remote), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn channel_close_clears_credentials() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials");
        CredentialsStore {
            username: Some("alice".into()),
            access_token: Some("stale".into()),
            ..Default::default()
        }
        .save_to(&path)
        .unwrap();

        let err = conclude(
            SessionEnd::ChannelClosed(CloseReason::Error("connection reset".into())),
            &path,
        )
        .unwrap_err();

        assert!(matches!(err, CliError::LoginRequired { .. }));
        assert!(!path.exists());
    }
}
