//! zvikoro - command-line access to the district administration service.
//!
//! Thin presentation layer over `zvikoro-core`: it turns session outcomes
//! into messages on the terminal and never talks to the API directly.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use reqwest::Method;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zvikoro_core::auth::{decode, AuthState, LogoutReason};
use zvikoro_core::{ApiClient, ApiError, Config, LoginFailure, RequestOptions};

const USAGE: &str = "\
Usage: zvikoro [--log-file <path>] <command>

Commands:
  login [username]            Log in and store the session
  logout                      End the session
  whoami                      Show the stored user and token expiry
  profile                     Re-fetch the current user's profile
  announcements               List public announcements
  post <message>              Post an announcement
  balances                    Recompute term balances
  call <METHOD> <path> [json] Send an authenticated request";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr, or to a daily file when `log_file` is set. The returned
/// guard must live until exit so buffered file output is flushed.
fn init_tracing(log_file: Option<&PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let name = path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "zvikoro.log".into());
            let appender = tracing_appender::rolling::daily(dir.unwrap_or(std::path::Path::new(".")), name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let log_file = take_option(&mut args, "--log-file")?.map(PathBuf::from);
    let _guard = init_tracing(log_file.as_ref());

    let Some(command) = args.first().cloned() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };
    let rest = &args[1..];

    let mut config = Config::load().context("Failed to load configuration")?;
    config.apply_env();
    let storage = config.open_storage().context("Failed to open session storage")?;
    let client = ApiClient::new(&config, storage).context("Failed to create API client")?;
    info!(base_url = config.base_url(), "zvikoro starting");

    let result = match command.as_str() {
        "login" => login(&client, &mut config, rest.first().cloned()).await,
        "logout" => {
            client.logout();
            println!("Logged out.");
            Ok(())
        }
        "whoami" => whoami(&client),
        "profile" => profile(&client).await,
        "announcements" => announcements(&client).await,
        "post" => post(&client, rest).await,
        "balances" => balances(&client).await,
        "call" => call(&client, rest).await,
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    };

    report_session_end(&client);
    result
}

/// Remove `--flag <value>` from the argument list
fn take_option(args: &mut Vec<String>, flag: &str) -> Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        bail!("{} requires a value", flag);
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

/// Tell the user when a command ended their session
fn report_session_end(client: &ApiClient) {
    match *client.subscribe().borrow() {
        AuthState::Unauthenticated {
            reason: Some(LogoutReason::RenewalFailed),
        } => eprintln!("Your session has expired. Run `zvikoro login` to sign in again."),
        AuthState::Unauthenticated {
            reason: Some(LogoutReason::Unauthorized),
        } => eprintln!("The server rejected your session. Run `zvikoro login` to sign in again."),
        _ => {}
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn login(client: &ApiClient, config: &mut Config, username: Option<String>) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => prompt("Username: ")?,
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", username))
        .context("Failed to read password")?;
    if username.is_empty() || password.trim().is_empty() {
        bail!("Please enter both username and password.");
    }

    match client.login(&username, &password).await {
        Ok(session) => {
            let name = session
                .user
                .as_ref()
                .and_then(|u| u.username())
                .unwrap_or(&username)
                .to_string();
            println!("Login successful. Welcome, {}.", name);
            config.last_username = Some(username);
            if let Err(e) = config.save() {
                tracing::warn!(error = %e, "Failed to save config");
            }
            Ok(())
        }
        Err(LoginFailure::Rejected(reason)) => bail!("Login failed: {}", reason),
        Err(e) => Err(e).context("Unexpected error during login"),
    }
}

fn whoami(client: &ApiClient) -> Result<()> {
    let session = client.session();
    let (Some(tokens), Some(user)) = (session.tokens, session.user) else {
        println!("Not logged in.");
        return Ok(());
    };

    println!("User:       {}", user.username().unwrap_or("(unknown)"));
    if let Some(email) = user.email() {
        println!("Email:      {}", email);
    }
    if let Some(dept) = user.department() {
        println!("Department: {}", dept);
    }
    match decode(&tokens.access).ok().and_then(|c| c.expires_at()) {
        Some(exp) => println!("Token expires: {}", exp.to_rfc3339()),
        None => println!("Token expires: unknown (will renew on next request)"),
    }
    Ok(())
}

async fn profile(client: &ApiClient) -> Result<()> {
    match client.fetch_user_profile().await? {
        Some(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
        None => println!("Not logged in."),
    }
    Ok(())
}

async fn announcements(client: &ApiClient) -> Result<()> {
    let items = client
        .fetch_public_announcements()
        .await
        .context("Failed to load announcements")?;
    if items.is_empty() {
        println!("No announcements.");
    }
    for item in items {
        println!("[{}] {}", item.author_display(), item.message);
    }
    Ok(())
}

async fn post(client: &ApiClient, rest: &[String]) -> Result<()> {
    let message = rest.join(" ");
    match client.send_message(&message).await {
        Ok(()) => {
            println!("Message sent.");
            Ok(())
        }
        Err(ApiError::Validation(reason)) => bail!("{}", reason),
        Err(e) => Err(e).context("Failed to send message"),
    }
}

async fn balances(client: &ApiClient) -> Result<()> {
    client
        .update_term_balances()
        .await
        .context("Failed to update term balances")?;
    println!("Term balances updated.");
    Ok(())
}

async fn call(client: &ApiClient, rest: &[String]) -> Result<()> {
    let (Some(method), Some(target)) = (rest.first(), rest.get(1)) else {
        bail!("call requires <METHOD> <path>");
    };
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method '{}'", method))?;

    let url = if target.starts_with("http://") || target.starts_with("https://") {
        target.clone()
    } else {
        client.endpoints().url(target)
    };

    let mut options = RequestOptions::new(method);
    if let Some(raw) = rest.get(2) {
        let body: serde_json::Value =
            serde_json::from_str(raw).context("Request body must be valid JSON")?;
        options = options.json(&body)?;
    }

    let response = client.call(&url, options).await?;
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    println!("{}", status);
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if !text.is_empty() => println!("{}", text),
        Err(_) => {}
    }
    Ok(())
}
