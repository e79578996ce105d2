//! storedesk CLI binary entry point.

use storedesk::cli::{AuthCommands, Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("storedesk=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let client = cli.client()?;
    match cli.command {
        Commands::Auth(auth_args) => match auth_args.command {
            AuthCommands::Login(args) => {
                storedesk::cli::auth::handle_login(&client, &args.email, args.password.as_deref())
                    .await
            }
            AuthCommands::VerifyOtp(args) => {
                storedesk::cli::auth::handle_verify_otp(&client, &args.email, &args.code).await
            }
            AuthCommands::Status => storedesk::cli::auth::handle_status(&client),
            AuthCommands::Logout(args) => storedesk::cli::auth::handle_logout(&client, args.all).await,
        },
        Commands::Endpoints => {
            storedesk::cli::api::handle_endpoints(client.registry());
            Ok(())
        }
        Commands::Get(args) => storedesk::cli::api::handle_get(&client, &args.endpoint, &args.args).await,
        Commands::Call(args) => {
            storedesk::cli::api::handle_call(&client, &args.endpoint, &args.args).await
        }
    }
}
