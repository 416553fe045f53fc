use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::telemetry::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "cove",
    about = "💬 Terminal client for the chat-hub realtime chat server",
    author,
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "COVE_SERVER",
        default_value = "http://127.0.0.1:8080",
        help = "Base URL of the chat-hub server"
    )]
    pub server: String,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "COVE_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "COVE_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Join the conversation (default when no subcommand is given)
    Chat,
    /// Create an account on the chat server
    Signup(AccountArgs),
    /// Log in to an existing account
    Login(AccountArgs),
    /// Forget the locally stored identity
    Logout,
    /// Show the locally stored identity
    Status,
}

#[derive(Args, Debug, Clone, Default)]
pub struct AccountArgs {
    #[arg(long, help = "Account username (prompted when omitted)")]
    pub username: Option<String>,

    #[arg(
        long,
        env = "COVE_PASSWORD",
        hide_env_values = true,
        help = "Account password (prompted when omitted)"
    )]
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_the_chat_command() {
        let cli = Cli::try_parse_from(["cove"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.server, "http://127.0.0.1:8080");
        assert_eq!(cli.logging.level, LogLevel::Warn);
    }

    #[test]
    fn parses_account_subcommands() {
        let cli = Cli::try_parse_from(["cove", "login", "--username", "alice"]).unwrap();
        let Some(Command::Login(args)) = cli.command else {
            panic!("expected the login subcommand");
        };
        assert_eq!(args.username.as_deref(), Some("alice"));
        assert_eq!(args.password, None);
    }

    #[test]
    fn server_flag_is_global() {
        let cli = Cli::try_parse_from(["cove", "chat", "--server", "chat.example.com"]).unwrap();
        assert_eq!(cli.server, "chat.example.com");
    }
}
