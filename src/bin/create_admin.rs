//! Seeds an admin account from the command line.
//!
//! Usage:
//!   cargo run --bin create-admin -- root@example.com 'a-strong-password'

use anyhow::Result;
use clap::Parser;
use user_accounts::{config::AppConfig, state::AppState, users::services};

#[derive(Parser, Debug)]
#[command(name = "create-admin")]
#[command(about = "Create an admin account unless the email is already registered")]
struct Args {
    email: String,
    password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "user_accounts=info".to_string()),
        )
        .init();

    let args = Args::parse();
    let state = AppState::from_config(AppConfig::from_env()?).await?;

    match services::ensure_admin(state.store.as_ref(), &args.email, &args.password).await {
        Ok(Some(user)) => tracing::info!(user_id = user.id, email = %user.email, "admin created"),
        Ok(None) => tracing::info!(email = %args.email, "user already exists; nothing to do"),
        Err(e) => anyhow::bail!("could not create admin: {e}"),
    }
    Ok(())
}
