use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;
use storefront_session::{
    ApiError, ConfigError, Credentials, Location, Session, SessionConfig, SessionContext, SessionEvent,
    SharedLocation, classify,
};
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("missing credentials; pass --email/--password or set STOREFRONT_EMAIL/STOREFRONT_PASSWORD")]
    MissingCredentials,
    #[error("request failed [{code}]: {0}", code = .0.error_code())]
    Api(#[from] ApiError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "storefront-session", about = "Storefront session lifecycle CLI")]
struct Cli {
    /// Overrides STOREFRONT_BASE_URL from the environment.
    #[arg(long)]
    base_url: Option<String>,

    /// Client-side route the session acts on behalf of.
    #[arg(long, env = "STOREFRONT_ROUTE", default_value = "/")]
    route: String,

    #[arg(long, env = "STOREFRONT_EMAIL")]
    email: Option<String>,

    #[arg(long, env = "STOREFRONT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the class of a client-side route.
    Classify { path: String },
    /// Resolve and print the current session.
    Whoami,
    /// Log in and print the identity.
    Login,
    /// GET an API path through the refresh-aware pipeline.
    Fetch { path: String },
    /// Mount, run the periodic verifier, and print session events.
    Watch {
        #[arg(long, help = "Stop after this many seconds")]
        seconds: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if let Command::Classify { path } = &cli.command {
        println!("{path}: {:?}", classify(path));
        return Ok(());
    }

    let base_url = cli.base_url.clone();
    let config = SessionConfig::from_lookup(|key| match (key, &base_url) {
        ("STOREFRONT_BASE_URL", Some(url)) => Some(url.clone()),
        _ => std::env::var(key).ok(),
    })?;
    let location = SharedLocation::new(cli.route.as_str());
    let ctx = SessionContext::from_config(&config, Arc::new(location.clone()))?;

    match cli.command {
        Command::Classify { .. } => Ok(()),
        Command::Whoami => run_whoami(&ctx).await,
        Command::Login => {
            let identity = ctx.login(&credentials(&cli)?).await?;
            print_json(&serde_json::to_value(identity)?)
        }
        Command::Fetch { ref path } => run_fetch(&ctx, &cli, path).await,
        Command::Watch { seconds } => run_watch(&ctx, &location, seconds).await,
    }
}

fn credentials(cli: &Cli) -> Result<Credentials, CliError> {
    match (&cli.email, &cli.password) {
        (Some(email), Some(password)) => Ok(Credentials::new(email.as_str(), password.as_str())),
        _ => Err(CliError::MissingCredentials),
    }
}

async fn run_whoami(ctx: &SessionContext) -> Result<(), CliError> {
    match ctx.mount().await {
        Session::Authenticated(identity) => print_json(&serde_json::to_value(identity)?),
        other => {
            println!("{:?}", other.status());
            Ok(())
        }
    }
}

async fn run_fetch(ctx: &SessionContext, cli: &Cli, path: &str) -> Result<(), CliError> {
    if cli.email.is_some() {
        ctx.login(&credentials(cli)?).await?;
    } else {
        ctx.mount().await;
    }
    let response = ctx.api().send(storefront_session::ApiRequest::get(path)).await?;
    match serde_json::from_str::<Value>(&response.body) {
        Ok(json) => print_json(&json),
        Err(_) => {
            println!("{}", response.body);
            Ok(())
        }
    }
}

async fn run_watch(ctx: &SessionContext, location: &SharedLocation, seconds: Option<u64>) -> Result<(), CliError> {
    let mut events = ctx.events();
    let session = ctx.mount().await;
    println!("mounted: {:?} on {}", session.status(), location.current_path());
    ctx.start_verifier();

    let deadline = async {
        match seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            () = &mut deadline => break,
            event = events.recv() => match event {
                Ok(SessionEvent::Expired { reason, redirect_to }) => {
                    println!("session expired ({reason}); redirecting to {redirect_to}");
                    location.navigate(redirect_to);
                    ctx.store().redirect_settled();
                }
                Ok(event) => println!("{event:?}"),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "session events lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    ctx.teardown();
    Ok(())
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
