//! Session token utility for ScaleHub
//!
//! Mints a session for an existing user id, signed with `SESSION_SECRET`, so
//! gated endpoints can be exercised locally with curl.
//!
//! Usage:
//!   cargo run --bin issue-session -- <user-id> [email]

use scalehub_api::{auth::SessionManager, Config};
use scalehub_shared::UserId;
use std::env;
use uuid::Uuid;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let Some(user_id) = env::args().nth(1) else {
        eprintln!("Usage: issue-session <user-id> [email]");
        std::process::exit(1);
    };
    let user_id = UserId(Uuid::parse_str(&user_id)?);
    let email = env::args()
        .nth(2)
        .unwrap_or_else(|| "developer@localhost".to_string());

    let config = Config::from_env()?;
    let sessions = SessionManager::new(&config.session_secret, config.session_expiry_hours);
    let token = sessions.issue(user_id, &email)?;

    println!("{}", token);
    eprintln!();
    eprintln!("Cookie header:");
    eprintln!("  Cookie: {}={}", config.session_cookie_name, token);
    eprintln!("Expires in {} hours", config.session_expiry_hours);

    Ok(())
}
