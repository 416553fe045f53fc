use clap::Parser;
use cove::terminal::{app, cli::Cli};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    if let Err(err) = app::run(cli).await {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
