//! CLI entry point for storedesk.

pub mod api;
pub mod auth;

use clap::{Parser, Subcommand};

use crate::client::ApiClient;
use crate::config::DeskConfig;

/// Storefront admin API CLI
#[derive(Parser, Debug)]
#[command(name = "storedesk", version, about = "Storefront admin API client")]
pub struct Cli {
    /// API base URL (defaults to STOREDESK_API_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Session management
    Auth(AuthArgs),
    /// List known endpoints
    Endpoints,
    /// Run a query endpoint
    Get(CallArgs),
    /// Run a mutation endpoint
    Call(CallArgs),
}

/// Arguments for the `auth` subcommand group.
#[derive(Parser, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

/// Auth subcommands.
#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Sign in with email and password
    Login(LoginArgs),
    /// Complete a sign-in that asked for a one-time code
    VerifyOtp(VerifyOtpArgs),
    /// Show stored session
    Status,
    /// Forget the stored session
    Logout(LogoutArgs),
}

/// Arguments for `storedesk auth login`.
#[derive(Parser, Debug)]
pub struct LoginArgs {
    #[arg(short, long)]
    pub email: String,

    /// Read from stdin when omitted
    #[arg(short, long)]
    pub password: Option<String>,
}

/// Arguments for `storedesk auth verify-otp`.
#[derive(Parser, Debug)]
pub struct VerifyOtpArgs {
    #[arg(short, long)]
    pub email: String,

    /// The one-time code
    pub code: String,
}

/// Arguments for `storedesk auth logout`.
#[derive(Parser, Debug)]
pub struct LogoutArgs {
    /// Also revoke every session server-side
    #[arg(long)]
    pub all: bool,
}

/// Arguments for `get` and `call`.
#[derive(Parser, Debug)]
pub struct CallArgs {
    /// Endpoint name, e.g. orders.list
    pub endpoint: String,

    /// Call arguments as a JSON object
    #[arg(short, long, default_value = "{}")]
    pub args: String,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Client for the configured API.
    pub fn client(&self) -> crate::error::Result<ApiClient> {
        let config = match &self.base_url {
            Some(url) => DeskConfig::builder().base_url(url.clone()).build(),
            None => DeskConfig::from_env()?,
        };
        ApiClient::new(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_auth_login() {
        let cli =
            Cli::try_parse_from(["storedesk", "auth", "login", "-e", "ops@shop.test"]).unwrap();
        match cli.command {
            Commands::Auth(auth) => match auth.command {
                AuthCommands::Login(args) => {
                    assert_eq!(args.email, "ops@shop.test");
                    assert!(args.password.is_none());
                }
                other => panic!("expected Login, got {other:?}"),
            },
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[test]
    fn parse_verify_otp() {
        let cli = Cli::try_parse_from([
            "storedesk",
            "auth",
            "verify-otp",
            "--email",
            "ops@shop.test",
            "123456",
        ])
        .unwrap();
        match cli.command {
            Commands::Auth(auth) => match auth.command {
                AuthCommands::VerifyOtp(args) => assert_eq!(args.code, "123456"),
                other => panic!("expected VerifyOtp, got {other:?}"),
            },
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[test]
    fn parse_logout_all() {
        let cli = Cli::try_parse_from(["storedesk", "auth", "logout", "--all"]).unwrap();
        match cli.command {
            Commands::Auth(auth) => match auth.command {
                AuthCommands::Logout(args) => assert!(args.all),
                other => panic!("expected Logout, got {other:?}"),
            },
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[test]
    fn parse_get_with_default_args() {
        let cli = Cli::try_parse_from(["storedesk", "get", "orders.list"]).unwrap();
        match cli.command {
            Commands::Get(args) => {
                assert_eq!(args.endpoint, "orders.list");
                assert_eq!(args.args, "{}");
            }
            other => panic!("expected Get, got {other:?}"),
        }
    }

    #[test]
    fn parse_call_with_global_base_url() {
        let cli = Cli::try_parse_from([
            "storedesk",
            "call",
            "orders.cancel",
            "--args",
            r#"{"id":"A"}"#,
            "--base-url",
            "http://localhost:4000",
        ])
        .unwrap();
        assert_eq!(cli.base_url.as_deref(), Some("http://localhost:4000"));
        assert!(matches!(cli.command, Commands::Call(_)));
    }

    #[test]
    fn parse_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["storedesk"]).is_err());
    }

    #[test]
    fn parse_get_missing_endpoint_is_error() {
        assert!(Cli::try_parse_from(["storedesk", "get"]).is_err());
    }
}
