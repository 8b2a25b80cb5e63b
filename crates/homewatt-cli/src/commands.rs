//! Command parsing and the handlers behind each command.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::stream::{self, StreamExt};
use homewatt_core::api::client::DEFAULT_STATS_DAYS;
use homewatt_core::models::DEFAULT_DEVICE_TYPE;
use homewatt_core::{Role, Route, SessionEvent, SessionState};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::app::App;
use crate::render::{self, DeviceRow};
use crate::utils::format_duration;

/// Maximum concurrent stats requests when listing devices.
/// Keeps large households from flooding the backend.
const MAX_CONCURRENT_REQUESTS: usize = 8;

/// Default refresh period for `watch`, in seconds
const DEFAULT_WATCH_SECS: u64 = 60;

/// Reply recorded when the assistant can't be reached
const ASSISTANT_ERROR_REPLY: &str = "Sorry, I encountered an error. Please try again.";

pub const USAGE: &str = "\
homewatt - per-device energy usage from the terminal

USAGE:
    homewatt <COMMAND> [ARGS]

COMMANDS:
    login [email]              Log in (password is prompted)
    logout                     End the session and forget the token
    register <email>           Create an account
    status                     Show whether you are logged in
    devices                    List devices with usage totals
    add-device <name> [type]   Add a device (type defaults to APPLIANCE)
    stats <device-id> [days]   Hourly usage chart for a device (default 7 days)
    watch [seconds]            Refresh the device list until the session ends
    ask <question...>          Ask the assistant about your energy usage
    history                    Show the conversation so far
    help                       Show this message

Set HOMEWATT_API_URL (or api_base_url in the config file) to point at your server.
RUST_LOG controls log verbosity.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { email: Option<String> },
    Logout,
    Register { email: String },
    Status,
    Devices,
    AddDevice { name: String, kind: String },
    Stats { device_id: String, days: u32 },
    Watch { interval: Duration },
    Ask { question: String },
    History,
    Help,
}

impl Command {
    /// Parse arguments after the program name
    pub fn parse(args: &[String]) -> Result<Self> {
        let Some(name) = args.first() else {
            return Ok(Command::Help);
        };
        let rest = &args[1..];

        let command = match name.as_str() {
            "login" => Command::Login {
                email: rest.first().cloned(),
            },
            "logout" => Command::Logout,
            "register" => Command::Register {
                email: rest
                    .first()
                    .cloned()
                    .context("Usage: homewatt register <email>")?,
            },
            "status" => Command::Status,
            "devices" => Command::Devices,
            "add-device" => Command::AddDevice {
                name: rest
                    .first()
                    .cloned()
                    .context("Usage: homewatt add-device <name> [type]")?,
                kind: rest
                    .get(1)
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_DEVICE_TYPE.to_string()),
            },
            "stats" => Command::Stats {
                device_id: rest
                    .first()
                    .cloned()
                    .context("Usage: homewatt stats <device-id> [days]")?,
                days: match rest.get(1) {
                    Some(days) => days
                        .parse()
                        .with_context(|| format!("Invalid number of days: {}", days))?,
                    None => DEFAULT_STATS_DAYS,
                },
            },
            "watch" => Command::Watch {
                interval: Duration::from_secs(match rest.first() {
                    Some(secs) => secs
                        .parse::<u64>()
                        .ok()
                        .filter(|s| *s > 0)
                        .with_context(|| format!("Invalid refresh interval: {}", secs))?,
                    None => DEFAULT_WATCH_SECS,
                }),
            },
            "ask" => {
                let question = rest.join(" ");
                if question.trim().is_empty() {
                    bail!("Usage: homewatt ask <question...>");
                }
                Command::Ask { question }
            }
            "history" => Command::History,
            "help" | "--help" | "-h" => Command::Help,
            other => bail!("Unknown command: {}\n\n{}", other, USAGE),
        };
        Ok(command)
    }
}

pub async fn run(app: &App, command: Command) -> Result<()> {
    match command {
        Command::Login { email } => login(app, email).await,
        Command::Logout => {
            app.session.logout();
            println!("Logged out.");
            Ok(())
        }
        Command::Register { email } => register(app, &email).await,
        Command::Status => {
            status(app);
            Ok(())
        }
        Command::Devices => app.guarded(Route::Dashboard, || devices(app)).await,
        Command::AddDevice { name, kind } => {
            app.guarded(Route::Dashboard, || add_device(app, &name, &kind))
                .await
        }
        Command::Stats { device_id, days } => {
            app.guarded(Route::DeviceDetails, || stats(app, &device_id, days))
                .await
        }
        Command::Watch { interval } => app.guarded(Route::Dashboard, || watch(app, interval)).await,
        Command::Ask { question } => {
            app.guarded(Route::Conversation, || ask(app, &question))
                .await
        }
        Command::History => {
            app.guarded(Route::Conversation, || async {
                println!("{}", render::transcript(app.chat_history().messages()));
                Ok(())
            })
            .await
        }
        Command::Help => {
            println!("{}", USAGE);
            Ok(())
        }
    }
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn login(app: &App, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| app.config.last_email.clone()) {
        Some(email) => email,
        None => prompt_line("Email: ")?,
    };
    if email.is_empty() {
        bail!("Email is required");
    }
    let password = rpassword::prompt_password(format!("Password for {}: ", email))?;

    match app.session.login(&email, &password).await {
        Ok(()) => {
            app.remember_email(&email);
            info!("Login succeeded");
            match app.session.expires_in() {
                Some(remaining) => println!(
                    "Logged in as {} (token expires in {}).",
                    email,
                    format_duration(remaining)
                ),
                None => println!("Logged in as {}.", email),
            }
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Login failed");
            bail!("{}", e.user_message())
        }
    }
}

async fn register(app: &App, email: &str) -> Result<()> {
    let password = rpassword::prompt_password("Choose a password: ")?;
    let confirm = rpassword::prompt_password("Repeat password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }
    let user = app
        .api
        .register(email, &password)
        .await
        .context("Registration failed")?;
    println!(
        "Account created for {}. Run `homewatt login {}` to sign in.",
        user.email, user.email
    );
    Ok(())
}

fn status(app: &App) {
    match app.session.state() {
        SessionState::Authenticated { .. } => {
            let remaining = app.session.expires_in().unwrap_or(0);
            let who = app.config.last_email.as_deref().unwrap_or("unknown user");
            println!(
                "Logged in as {} (token expires in {}).",
                who,
                format_duration(remaining)
            );
        }
        SessionState::Unauthenticated => println!("Not logged in."),
    }
}

async fn load_device_rows(app: &App) -> Result<Vec<DeviceRow>> {
    let devices = app.api.devices().await.context("Could not fetch devices")?;

    let rows = stream::iter(devices)
        .map(|device| async move {
            let stats = match app.api.device_stats(&device.id, DEFAULT_STATS_DAYS).await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!(device = %device.id, error = %e, "Could not fetch device stats");
                    None
                }
            };
            DeviceRow { device, stats }
        })
        .buffered(MAX_CONCURRENT_REQUESTS)
        .collect::<Vec<_>>()
        .await;
    Ok(rows)
}

async fn devices(app: &App) -> Result<()> {
    let rows = load_device_rows(app).await?;
    println!("{}", render::devices_table(&rows));
    Ok(())
}

async fn add_device(app: &App, name: &str, kind: &str) -> Result<()> {
    let device = app
        .api
        .create_device(name, kind)
        .await
        .context("Failed to create device")?;
    println!("Device created successfully: {} ({})", device.name, device.id);
    Ok(())
}

async fn stats(app: &App, device_id: &str, days: u32) -> Result<()> {
    let stats = app.api.device_stats(device_id, days).await?;
    println!("{}", render::stats_chart(&stats));
    Ok(())
}

async fn watch(app: &App, interval: Duration) -> Result<()> {
    let mut events = app.session.subscribe();
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Re-check on every refresh; the sweep alone may be minutes away.
                if !app.guard.allow() {
                    break;
                }
                match load_device_rows(app).await {
                    Ok(rows) => println!("{}\n", render::devices_table(&rows)),
                    Err(e) => eprintln!("Refresh failed: {:#}", e),
                }
            }
            event = events.recv() => match event {
                Ok(SessionEvent::LoggedIn) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Ok(SessionEvent::LoggedOut | SessionEvent::Expired)
                | Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    println!("Session ended, stopped watching.");
    Ok(())
}

async fn ask(app: &App, question: &str) -> Result<()> {
    let mut history = app.chat_history();
    history.add_message(Role::User, question);

    let reply = match app.api.query(question).await {
        Ok(answer) => answer.summary,
        Err(e) => {
            warn!(error = %e, "Query failed");
            ASSISTANT_ERROR_REPLY.to_string()
        }
    };
    let message = history.add_message(Role::Assistant, reply);
    println!("{}: {}", message.role, message.content);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_no_args_is_help() {
        assert_eq!(Command::parse(&[]).unwrap(), Command::Help);
    }

    #[test]
    fn test_parse_login() {
        assert_eq!(
            Command::parse(&args(&["login"])).unwrap(),
            Command::Login { email: None }
        );
        assert_eq!(
            Command::parse(&args(&["login", "a@b.com"])).unwrap(),
            Command::Login {
                email: Some("a@b.com".to_string())
            }
        );
    }

    #[test]
    fn test_parse_add_device_default_type() {
        assert_eq!(
            Command::parse(&args(&["add-device", "Fridge"])).unwrap(),
            Command::AddDevice {
                name: "Fridge".to_string(),
                kind: DEFAULT_DEVICE_TYPE.to_string()
            }
        );
        assert!(Command::parse(&args(&["add-device"])).is_err());
    }

    #[test]
    fn test_parse_stats_days() {
        assert_eq!(
            Command::parse(&args(&["stats", "d1"])).unwrap(),
            Command::Stats {
                device_id: "d1".to_string(),
                days: DEFAULT_STATS_DAYS
            }
        );
        assert_eq!(
            Command::parse(&args(&["stats", "d1", "3"])).unwrap(),
            Command::Stats {
                device_id: "d1".to_string(),
                days: 3
            }
        );
        assert!(Command::parse(&args(&["stats", "d1", "week"])).is_err());
    }

    #[test]
    fn test_parse_watch_interval() {
        assert_eq!(
            Command::parse(&args(&["watch"])).unwrap(),
            Command::Watch {
                interval: Duration::from_secs(DEFAULT_WATCH_SECS)
            }
        );
        assert!(Command::parse(&args(&["watch", "0"])).is_err());
    }

    #[test]
    fn test_parse_ask_joins_words() {
        assert_eq!(
            Command::parse(&args(&["ask", "how", "much", "energy?"])).unwrap(),
            Command::Ask {
                question: "how much energy?".to_string()
            }
        );
        assert!(Command::parse(&args(&["ask"])).is_err());
    }

    #[test]
    fn test_parse_unknown_command() {
        let err = Command::parse(&args(&["dance"])).unwrap_err();
        assert!(err.to_string().contains("Unknown command: dance"));
    }
}
