//! CLI auth command handlers.

use std::io::Write;

use serde_json::{json, Value};

use crate::auth::session::LoginOutcome;
use crate::client::ApiClient;

/// Handle `storedesk auth login`.
pub async fn handle_login(
    client: &ApiClient,
    email: &str,
    password: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let password = match password {
        Some(p) => p.to_string(),
        None => prompt("Password: ")?,
    };
    if password.is_empty() {
        return Err("No password provided.".into());
    }
    let outcome = client
        .session()
        .login(json!({"email": email, "password": password}))
        .await?;
    report(outcome, email);
    Ok(())
}

/// Handle `storedesk auth verify-otp`.
pub async fn handle_verify_otp(
    client: &ApiClient,
    email: &str,
    code: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = client
        .session()
        .verify_otp(json!({"email": email, "otp": code}))
        .await?;
    report(outcome, email);
    Ok(())
}

/// Handle `storedesk auth status`.
pub fn handle_status(client: &ApiClient) -> Result<(), Box<dyn std::error::Error>> {
    println!("API: {}", client.pipeline().executor().config().base_url);
    match client.session().status()? {
        Some(pair) => {
            let access = if pair.access_token.is_empty() {
                "expired"
            } else {
                "present"
            };
            let refresh = if pair.refresh_token.is_some() {
                "present"
            } else {
                "missing"
            };
            println!("Signed in (access token {access}, refresh token {refresh})");
        }
        None => println!("Not signed in"),
    }
    Ok(())
}

/// Handle `storedesk auth logout`.
pub async fn handle_logout(client: &ApiClient, all: bool) -> Result<(), Box<dyn std::error::Error>> {
    if all {
        client.logout_all().await?;
        println!("Logged out of every session");
    } else {
        client.logout()?;
        println!("Logged out");
    }
    Ok(())
}

fn report(outcome: LoginOutcome, email: &str) {
    match outcome {
        LoginOutcome::SignedIn { message } => {
            println!("{}", message.unwrap_or_else(|| format!("Signed in as {email}")));
        }
        LoginOutcome::OtpRequired { message, data } => {
            if let Some(message) = message {
                println!("{message}");
            }
            if let Some(data) = data.filter(has_content) {
                println!("{data}");
            }
            println!("Run `storedesk auth verify-otp --email {email} <code>` to finish signing in.");
        }
    }
}

fn has_content(data: &Value) -> bool {
    match data {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

fn prompt(label: &str) -> std::io::Result<String> {
    print!("{label}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
