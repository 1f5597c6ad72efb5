//! Waypass CLI - drive sessions, authorized calls and deep links from a terminal.
//!
//! Commands:
//! - `login [username]`: authenticate and store the session
//! - `logout`: revoke and discard the session
//! - `status`: show the stored session
//! - `get <path>`: authorized GET, refreshing the token once if needed
//! - `open <url>`: resolve a deep link and navigate, logging in if required

mod deeplink;

use std::io::{self, BufRead, IsTerminal, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use waypass_core::auth::{
    AuthInterceptor, AuthService, ConfiguredStore, Credentials, SessionVault,
};
use waypass_core::navigation::{AccessGuard, Presenter, Route, Router};
use waypass_core::{ApiClient, AuthClient, AuthError, Config};

use deeplink::DeepLinkResolver;

// ============================================================================
// Constants
// ============================================================================

/// Environment variable overriding the configured API base URL
const API_URL_ENV: &str = "WAYPASS_API_URL";

/// Environment variable holding the encrypted session file passphrase
const SESSION_KEY_ENV: &str = "WAYPASS_SESSION_KEY";

/// Log file name prefix inside the data directory
const LOG_FILE_PREFIX: &str = "waypass.log";

const USAGE: &str = "usage: waypass <login [username] | logout | status | get <path> | open <url>>";

/// Initialize the tracing subscriber for logging.
///
/// Returns the file writer guard, which must live until exit.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.data_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir.join("logs"), LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

/// Prints each presented screen.
struct TerminalPresenter;

impl Presenter for TerminalPresenter {
    fn present(&self, route: &Route) {
        println!("-> {} ({})", route.path(), route.name());
    }
}

/// Everything a command needs, wired from configuration.
struct App {
    config: Config,
    vault: Arc<SessionVault<ConfiguredStore>>,
    endpoint: Arc<AuthClient>,
}

impl App {
    fn new(config: Config) -> Result<Self> {
        let passphrase = std::env::var(SESSION_KEY_ENV).ok();
        let store = config.open_session_store(passphrase.as_deref())?;
        let endpoint = AuthClient::new(config.api_base_url.clone(), config.request_timeout())
            .context("Failed to build HTTP client")?;

        Ok(Self {
            config,
            vault: Arc::new(SessionVault::new(store)),
            endpoint: Arc::new(endpoint),
        })
    }

    fn auth(&self) -> AuthService<ConfiguredStore, AuthClient> {
        AuthService::new(Arc::clone(&self.vault), Arc::clone(&self.endpoint))
    }

    fn api(&self) -> Result<ApiClient<ConfiguredStore, AuthClient>> {
        let interceptor = AuthInterceptor::new(Arc::clone(&self.vault), Arc::clone(&self.endpoint))
            .with_refresh_timeout(self.config.refresh_timeout());
        Ok(ApiClient::new(
            self.config.api_base_url.clone(),
            self.config.request_timeout(),
            Arc::new(interceptor),
        )?)
    }

    fn router(&self) -> Router<ConfiguredStore, TerminalPresenter> {
        Router::new(AccessGuard::new(Arc::clone(&self.vault)), TerminalPresenter)
    }
}

/// A parsed command line
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Login(Option<String>),
    Logout,
    Status,
    Get(String),
    Open(String),
}

impl Command {
    fn parse(args: &[String]) -> Option<Self> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        Some(match args.as_slice() {
            ["login"] => Command::Login(None),
            ["login", username] => Command::Login(Some(username.to_string())),
            ["logout"] => Command::Logout,
            ["status"] => Command::Status,
            ["get", path] => Command::Get(path.to_string()),
            ["open", url] => Command::Open(url.to_string()),
            _ => return None,
        })
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = Command::parse(&args) else {
        eprintln!("{}", USAGE);
        return Ok(ExitCode::from(2));
    };

    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = Config::load()?;
    if let Ok(url) = std::env::var(API_URL_ENV) {
        config.api_base_url = url;
    }

    let _log_guard = init_tracing(&config);
    info!(api = %config.api_base_url, backend = ?config.session_backend, "waypass starting");

    let app = App::new(config)?;

    let result = match &command {
        Command::Login(username) => login(&app, username.as_deref()).await,
        Command::Logout => logout(&app).await,
        Command::Status => status(&app).await,
        Command::Get(path) => get(&app, path).await,
        Command::Open(url) => open(&app, url).await,
    };

    if let Err(e) = &result {
        if e.downcast_ref::<AuthError>().is_some_and(AuthError::requires_login) {
            eprintln!("Session is no longer valid. Run `waypass login` to sign in again.");
        }
    }
    result.map(|()| ExitCode::SUCCESS)
}

fn prompt_username(default: Option<&str>) -> Result<String> {
    match default {
        Some(name) => print!("Username [{}]: ", name),
        None => print!("Username: "),
    }
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let line = line.trim();
    Ok(match (line.is_empty(), default) {
        (true, Some(name)) => name.to_string(),
        _ => line.to_string(),
    })
}

async fn login(app: &App, username: Option<&str>) -> Result<()> {
    let username = match username {
        Some(name) => name.to_string(),
        None => prompt_username(app.config.last_username.as_deref())?,
    };
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;

    let credentials = Credentials::new(username, password);
    let session = app.auth().login(&credentials).await?;
    println!(
        "Logged in as {} (token valid for {} minutes)",
        session.user_id(),
        session.minutes_until_expiry()
    );

    let mut config = app.config.clone();
    config.last_username = Some(credentials.username().to_string());
    config.save().context("Failed to save config")?;
    Ok(())
}

async fn logout(app: &App) -> Result<()> {
    app.auth().logout().await?;
    println!("Logged out");
    Ok(())
}

async fn status(app: &App) -> Result<()> {
    match app.vault.current().await? {
        Some(session) if session.is_valid() => println!(
            "Logged in as {} until {} ({} minutes left)",
            session.user_id(),
            session.expires_at().format("%Y-%m-%d %H:%M:%S UTC"),
            session.minutes_until_expiry()
        ),
        Some(session) => println!(
            "Session for {} expired at {}",
            session.user_id(),
            session.expires_at().format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => println!("Not logged in"),
    }
    Ok(())
}

async fn get(app: &App, path: &str) -> Result<()> {
    let body: serde_json::Value = app.api()?.get_json(path).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn open(app: &App, url: &str) -> Result<()> {
    let router = app.router();
    let shown = router.navigate_url(url, &DeepLinkResolver).await;

    if shown == Route::Login && router.pending_route().is_some() {
        if !io::stdin().is_terminal() {
            println!("Login required to continue to {}", url);
            return Ok(());
        }
        login(app, None).await?;
        router.resume_after_login().await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Option<Command> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        Command::parse(&args)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse(&["login"]), Some(Command::Login(None)));
        assert_eq!(
            parse(&["login", "alice"]),
            Some(Command::Login(Some("alice".to_string())))
        );
        assert_eq!(parse(&["status"]), Some(Command::Status));
        assert_eq!(
            parse(&["open", "waypass://app/home"]),
            Some(Command::Open("waypass://app/home".to_string()))
        );
    }

    #[test]
    fn test_unknown_or_incomplete_commands_rejected() {
        assert_eq!(parse(&[]), None);
        assert_eq!(parse(&["get"]), None);
        assert_eq!(parse(&["status", "extra"]), None);
        assert_eq!(parse(&["frobnicate"]), None);
    }
}
