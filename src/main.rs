use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use dynamo_session_core::config::{self, SessionConfig};
use dynamo_session_core::sid::generate_secret;
use dynamo_session_core::{DynamoSessionStore, Session, SessionManager};

#[derive(Parser)]
#[command(
    name = "dynsess",
    about = "Manage DynamoDB-backed server-side sessions",
    version = dynamo_session_core::VERSION,
)]
struct Cli {
    /// Path to the config file (default: ~/.dynamo-session/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file with a freshly generated signing key
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
    /// Create the session table with TTL on the `expires` attribute
    CreateTable,
    /// Create and save a new session, printing its id
    Create {
        /// Idle timeout in seconds
        #[arg(long)]
        idle: Option<u64>,
        /// Absolute timeout in seconds
        #[arg(long)]
        absolute: Option<u64>,
        /// Payload entry as key=value; values are parsed as JSON when possible
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
    /// Load a session and print its payload (refreshes its idle timer)
    Show {
        sid: String,
    },
    /// Report a session's state without touching it
    Inspect {
        sid: String,
    },
    /// Delete a session
    Clear {
        sid: String,
    },
    /// Print a new random signing key
    Keygen,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dynamo_session=info".parse()?)
                .add_directive("dynsess=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init { force } => cmd_init(config_path, force)?,
        Commands::Keygen => println!("{}", generate_secret()),
        command => {
            let cfg = match config_path {
                Some(path) => {
                    let mut cfg = config::load_config(Some(path));
                    config::apply_env_overrides(&mut cfg);
                    cfg
                }
                None => config::load_config_from_env(),
            };
            run(cfg, command)?;
        }
    }

    Ok(())
}

fn run(cfg: SessionConfig, command: Commands) -> Result<()> {
    let store = DynamoSessionStore::from_config(&cfg).context("Failed to set up DynamoDB")?;

    if let Commands::CreateTable = command {
        store.create_table()?;
        println!("Table {} is ready", store.table_name());
        return Ok(());
    }

    let manager: SessionManager =
        SessionManager::new(cfg, store).context("Invalid session configuration")?;

    match command {
        Commands::Create {
            idle,
            absolute,
            set,
        } => cmd_create(&manager, idle, absolute, set),
        Commands::Show { sid } => cmd_show(&manager, &sid),
        Commands::Inspect { sid } => cmd_inspect(&manager, &sid),
        Commands::Clear { sid } => {
            manager.clear(&sid)?;
            println!("Cleared");
            Ok(())
        }
        Commands::Init { .. } | Commands::Keygen | Commands::CreateTable => Ok(()),
    }
}

// ====== Commands ======

fn cmd_init(config_path: Option<&std::path::Path>, force: bool) -> Result<()> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(config::get_config_path);

    if path.exists() && !force {
        println!("Config already exists at {}", path.display());
        println!("Pass --force to overwrite it.");
        return Ok(());
    }

    let cfg = SessionConfig::with_key(generate_secret());
    config::save_config(&cfg, Some(path.as_path()))?;
    println!("Created config at {}", path.display());
    println!("  Table: {}", cfg.table_name);
    println!(
        "  Timeouts: idle {}s, absolute {}s",
        cfg.idle_timeout_secs, cfg.absolute_timeout_secs
    );
    Ok(())
}

fn cmd_create(
    manager: &SessionManager,
    idle: Option<u64>,
    absolute: Option<u64>,
    set: Vec<String>,
) -> Result<()> {
    let entries = set
        .iter()
        .map(|pair| parse_entry(pair))
        .collect::<Result<Vec<_>>>()?;

    let mut session = manager.create_with_timeouts(idle, absolute)?;
    for (key, value) in entries {
        session.data_mut().insert(key, value);
    }
    manager.save(&mut session)?;

    info!("Created session {}", session.loggable_session_id());
    println!("{}", session.session_id());
    Ok(())
}

fn cmd_show(manager: &SessionManager, sid: &str) -> Result<()> {
    match manager.load(sid)? {
        Session::Live(session) => {
            let payload: serde_json::Map<String, serde_json::Value> = session
                .data()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
        Session::Null(_) => bail!("No usable session for that id"),
    }
}

fn cmd_inspect(manager: &SessionManager, sid: &str) -> Result<()> {
    let inspection = manager.inspect(sid)?;

    println!("Loggable id: {}", inspection.loggable);
    println!("State: {}", inspection.state);

    match inspection.record {
        Some(record) => {
            println!("Created: {}", record.created.to_rfc3339());
            println!("Accessed: {}", record.accessed.to_rfc3339());
            println!(
                "Timeouts: idle {}s, absolute {}s",
                record.idle_timeout, record.absolute_timeout
            );
            println!("Expires: {}", record.expires);
        }
        None => println!("Record: none"),
    }
    Ok(())
}

/// Split `key=value`, reading the value as JSON and falling back to a string.
fn parse_entry(pair: &str) -> Result<(String, serde_json::Value)> {
    let Some((key, raw)) = pair.split_once('=') else {
        bail!("Expected KEY=VALUE, got '{}'", pair);
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Empty key in '{}'", pair);
    }
    let value = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
