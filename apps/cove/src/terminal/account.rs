use crate::auth::{self, CredentialsStore, IdentityCookies};
use crate::session::{SessionConfig, SessionManager};
use crate::terminal::cli::AccountArgs;
use crate::terminal::error::CliError;
use std::io::{self, Write};
use tracing::info;

pub async fn signup(base_url: &str, args: AccountArgs) -> Result<(), CliError> {
    let manager = SessionManager::new(SessionConfig::new(base_url)?)?;
    let username = resolve_username(args.username)?;
    let password = resolve_password(args.password)?;

    let cookies = manager.signup(&username, &password).await?;
    persist(&cookies)?;

    let name = cookies.username.as_deref().unwrap_or(&username);
    info!(target: "cove::auth", username = %name, "account created");
    println!("✅ account created; signed in as '{name}'");
    println!("   run `cove chat` to join the conversation");
    Ok(())
}

pub async fn login(base_url: &str, args: AccountArgs) -> Result<(), CliError> {
    let manager = SessionManager::new(SessionConfig::new(base_url)?)?;
    let username = resolve_username(args.username)?;
    let password = resolve_password(args.password)?;

    let cookies = manager.login(&username, &password).await?;
    persist(&cookies)?;

    let name = cookies.username.as_deref().unwrap_or(&username);
    info!(target: "cove::auth", username = %name, "logged in");
    println!("✅ signed in as '{name}'");
    println!("   run `cove chat` to join the conversation");
    Ok(())
}

pub fn logout() -> Result<(), CliError> {
    CredentialsStore::clear()?;
    println!("👋 signed out; the stored identity was forgotten");
    Ok(())
}

pub fn status() -> Result<(), CliError> {
    match auth::probe() {
        Some(name) => println!("signed in as '{name}'"),
        None => println!("not signed in; run `cove login` or `cove signup`"),
    }
    Ok(())
}

fn persist(cookies: &IdentityCookies) -> Result<(), CliError> {
    let mut store = CredentialsStore::load().unwrap_or_default();
    store.apply(cookies);
    store.save()?;
    Ok(())
}

fn resolve_username(provided: Option<String>) -> Result<String, CliError> {
    if let Some(username) = provided {
        return Ok(username);
    }
    print!("👤 Username: ");
    io::stdout().flush()?;
    let mut buf = String::new();
    io::stdin().read_line(&mut buf)?;
    Ok(buf.trim().to_string())
}

fn resolve_password(provided: Option<String>) -> Result<String, CliError> {
    if let Some(password) = provided {
        return Ok(password);
    }
    Ok(rpassword::prompt_password("🔐 Password: ")?)
}
