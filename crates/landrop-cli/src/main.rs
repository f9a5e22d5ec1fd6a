//! LanDrop terminal application entry point.
//!
//! Startup sequence:
//!
//! ```text
//! main()
//!  └─ load AppConfig          -- TOML in the data dir, defaults if absent
//!  └─ register or log in      -- single-user credentials record
//!  └─ NetworkOrchestrator     -- control server, broadcaster, discovery
//!  └─ Repl::run()             -- operator command loop until `exit`
//! ```
//!
//! All long-lived state lives in two explicitly shared objects: the
//! [`session::Session`] (login + contacts, handed to the network as its
//! context) and the orchestrator itself.

mod config;
mod repl;
mod session;
mod store;

use std::sync::Arc;

use anyhow::{bail, Context};
use landrop_core::Credentials;
use landrop_net::{NetworkOrchestrator, NodeContext};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::repl::{is_valid_email, prompt_line, Repl};
use crate::session::{LoginOutcome, Session};

fn main() -> anyhow::Result<()> {
    let data_dir = config::data_dir()?;
    let app_config = config::load_config(&data_dir)
        .with_context(|| format!("loading config from {}", data_dir.display()))?;

    // Structured logging; RUST_LOG overrides the configured default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&app_config.log_level)),
        )
        .init();

    info!("LanDrop starting, data dir {}", data_dir.display());

    if !store::user_registered(&data_dir) {
        register(&data_dir)?;
        return Ok(());
    }

    let registered = store::load_credentials(&data_dir)?
        .context("user file exists but holds no credentials")?;
    let session = Arc::new(Session::load(data_dir.clone())?);
    log_in(&session, &registered)?;
    println!("Welcome to LanDrop!");

    // Inbound files land inside the data dir unless configured absolute.
    let mut net_config = app_config.network;
    if net_config.received_files_dir.is_relative() {
        net_config.received_files_dir = data_dir.join(&net_config.received_files_dir);
    }

    let context: Arc<dyn NodeContext> = Arc::clone(&session) as Arc<dyn NodeContext>;
    let mut network = NetworkOrchestrator::new(net_config, context);
    network.start().context("starting the network subsystem")?;

    let mut repl = Repl::new(session, network);
    repl.run();

    println!("Exiting LanDrop.");
    Ok(())
}

/// First-run flow: create the single credentials record.
fn register(data_dir: &std::path::Path) -> anyhow::Result<()> {
    println!("No users are registered with this client.");
    loop {
        match prompt_line("Do you want to register a new user? (y/n)? ").as_deref() {
            Some("y") => break,
            Some("n") | None => return Ok(()),
            _ => continue,
        }
    }

    let name = loop {
        match prompt_line("Enter full name: ") {
            Some(name) if name.len() >= 3 => break name,
            Some(_) => println!("Please enter at least 3 characters."),
            None => return Ok(()),
        }
    };
    let email = loop {
        match prompt_line("Enter email address: ") {
            Some(email) if is_valid_email(&email) => break email,
            Some(_) => println!("Please enter a valid email address."),
            None => return Ok(()),
        }
    };
    let password = loop {
        let Some(password) = prompt_line("Enter password: ") else {
            return Ok(());
        };
        if password.len() < 8 {
            println!("Please use at least 8 characters.");
            continue;
        }
        match prompt_line("Re-enter password: ") {
            Some(confirmation) if confirmation == password => break password,
            Some(_) => println!("Passwords do not match."),
            None => return Ok(()),
        }
    };

    store::save_credentials(data_dir, &Credentials::new(name, email, &password))?;
    println!("User registered. Start LanDrop again to log in.");
    Ok(())
}

/// Prompts for credentials until login succeeds or the attempts run out.
fn log_in(session: &Session, registered: &Credentials) -> anyhow::Result<()> {
    loop {
        let Some(email) = prompt_line("Enter email address: ") else {
            bail!("login aborted");
        };
        let Some(password) = prompt_line("Enter password: ") else {
            bail!("login aborted");
        };

        match session.login(registered, &email, &password) {
            LoginOutcome::Success => {
                println!("Email and password combination valid.");
                return Ok(());
            }
            LoginOutcome::Invalid { attempts_left } => {
                println!("Email and password combination invalid. ({attempts_left} attempt(s) left)");
            }
            LoginOutcome::LockedOut => {
                bail!("Maximum number of login attempts exceeded.");
            }
        }
    }
}
