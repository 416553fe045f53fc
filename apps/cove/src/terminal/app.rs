use crate::client::chat;
use crate::telemetry::logging;
use crate::terminal::account;
use crate::terminal::cli::{Cli, Command};
use crate::terminal::error::CliError;

pub async fn run(cli: Cli) -> Result<(), CliError> {
    logging::init(&cli.logging.to_config())
        .map_err(|err| CliError::Logging(err.to_string()))?;

    let base = cli.server;
    match cli.command {
        Some(Command::Signup(args)) => account::signup(&base, args).await,
        Some(Command::Login(args)) => account::login(&base, args).await,
        Some(Command::Logout) => account::logout(),
        Some(Command::Status) => account::status(),
        Some(Command::Chat) | None => chat::run(&base).await,
    }
}
