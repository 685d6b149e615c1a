use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use recipebox::app::{App, AppError};
use recipebox::config::{ClientConfig, ConfigError};
use recipebox::router::Navigation;
use recipebox::state::auth::{AuthError, AuthStatus};
use recipebox::state::search::{SearchController, SearchState};
use tokio::io::{AsyncBufReadExt, BufReader};

#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

const PENDING_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    App(#[from] AppError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("search failed: {0}")]
    Search(String),
    #[error("page {page} out of range (1..={total_pages})")]
    PageOutOfRange { page: u32, total_pages: u32 },
    #[error("no route for {0}")]
    NotFound(String),
    #[error("redirect loop while opening {0}")]
    RedirectLoop(String),
    #[error("session expired; log in again")]
    SessionExpired,
    #[error("stdin read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "recipebox", about = "Recipe search client")]
struct Cli {
    #[arg(long, env = "RECIPEBOX_API_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "RECIPEBOX_STORAGE_PATH")]
    storage_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and persist the session token.
    Login {
        username: String,
        #[arg(long, env = "RECIPEBOX_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session token.
    Logout,
    /// Ask the server whether the stored session is still valid.
    Status,
    /// Run one search and print the results as JSON.
    Search {
        query: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        size: Option<u32>,
    },
    /// Resolve a client route, running the auth guard.
    Open { path: String },
    /// Treat each stdin line as an edit of the query; print the settled result.
    Typeahead,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = cli.base_url.as_deref() {
        config = config.with_base_url(url)?;
    }
    if let Some(path) = cli.storage_path {
        config.storage_path = path;
    }
    if let Command::Search { size: Some(size), .. } = &cli.command {
        config.search.page_size = *size;
    }

    let app = App::from_config(&config)?;
    let result = run(&app, cli.command).await;
    let expired = app.process_session_events().await;
    settle(result, expired)
}

/// Combine a command's outcome with any session expiry it triggered. A
/// command error always wins: a 401 on `login` is a credential failure.
fn settle(result: Result<(), CliError>, expired: Option<Navigation>) -> Result<(), CliError> {
    match (result, expired) {
        (Err(e), _) => Err(e),
        (Ok(()), Some(nav)) => {
            eprintln!("session expired; now at {}", describe(&nav));
            Err(CliError::SessionExpired)
        }
        (Ok(()), None) => Ok(()),
    }
}

async fn run(app: &App, command: Command) -> Result<(), CliError> {
    match command {
        Command::Login { username, password } => {
            let user = app.login(&username, &password).await?;
            println!("logged in as {} <{}>", user.name, user.email);
            Ok(())
        }
        Command::Logout => {
            app.logout();
            println!("logged out");
            Ok(())
        }
        Command::Status => {
            if app.api().stored_token().is_some() {
                app.auth().check_auth().await;
                // A rejected token is the answer here, not a failure.
                app.process_session_events().await;
            }
            match app.auth().status() {
                AuthStatus::Authenticated => println!("authenticated"),
                AuthStatus::Anonymous => println!("anonymous"),
            }
            Ok(())
        }
        Command::Search { query, page, .. } => run_search(app, query, page).await,
        Command::Open { path } => run_open(app, &path).await,
        Command::Typeahead => run_typeahead(app).await,
    }
}

async fn run_search(app: &App, query: String, page: u32) -> Result<(), CliError> {
    let search = app.search_controller();
    search.set_query(query);
    search.cancel_pending();
    search.search().await;
    fail_on_error(&search.state())?;

    if page != 1 && !search.handle_page_change(page).await {
        return Err(CliError::PageOutOfRange { page, total_pages: search.total_pages() });
    }
    let state = search.state();
    fail_on_error(&state)?;
    print_state(&state)
}

async fn run_open(app: &App, path: &str) -> Result<(), CliError> {
    let nav = app.navigate(path).await;
    // The guard already redirected; expiry events from its probe are spent.
    app.process_session_events().await;
    match nav {
        Navigation::NotFound { path } => Err(CliError::NotFound(path)),
        Navigation::RedirectLoop { path } => Err(CliError::RedirectLoop(path)),
        nav @ Navigation::Render { .. } => {
            println!("{}", describe(&nav));
            Ok(())
        }
    }
}

async fn run_typeahead(app: &App) -> Result<(), CliError> {
    let search = app.search_controller();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        search.set_query(line);
    }
    wait_for_settled(&search).await;

    let state = search.state();
    fail_on_error(&state)?;
    print_state(&state)
}

async fn wait_for_settled(search: &SearchController) {
    while search.has_pending_search() || search.state().loading {
        tokio::time::sleep(PENDING_POLL).await;
    }
}

fn fail_on_error(state: &SearchState) -> Result<(), CliError> {
    match &state.error {
        Some(message) => Err(CliError::Search(message.clone())),
        None => Ok(()),
    }
}

fn print_state(state: &SearchState) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(&state.results)?);
    eprintln!("page {}/{} ({} total)", state.page, state.total_pages(), state.total);
    if let Some(suggestion) = &state.suggestion {
        eprintln!("did you mean: {}", suggestion.text);
    }
    Ok(())
}

fn describe(nav: &Navigation) -> String {
    match nav {
        Navigation::Render { route, redirected_from } => {
            let mut out = format!("{:?} {}", route.view, route.path);
            for (name, value) in &route.params {
                out.push_str(&format!(" {name}={value}"));
            }
            if let Some(from) = redirected_from {
                out.push_str(&format!(" (from {from})"));
            }
            out
        }
        Navigation::NotFound { path } => format!("not found: {path}"),
        Navigation::RedirectLoop { path } => format!("redirect loop: {path}"),
    }
}
