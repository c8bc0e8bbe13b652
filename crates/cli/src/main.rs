use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hookrelay")]
#[command(about = "Relay chat messages to a workflow webhook", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file (never overwrites).
    Init {
        /// Config file path (default: HOOKRELAY_CONFIG_PATH or ~/.hookrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Load and validate the config, then print the effective trigger settings.
    Check {
        /// Config file path (default: HOOKRELAY_CONFIG_PATH or ~/.hookrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Connect to Matrix and relay triggering messages to the webhook. SIGHUP reloads the relay settings.
    Run {
        /// Config file path (default: HOOKRELAY_CONFIG_PATH or ~/.hookrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("hookrelay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Check { config }) => {
            if let Err(e) = run_check(config) {
                log::error!("check failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config }) => {
            if let Err(e) = run_relay(config).await {
                log::error!("run failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

fn run_check(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    let s = lib::config::relay_settings(&config)?;
    let mut whitelist: Vec<&String> = s.whitelist_members.iter().collect();
    whitelist.sort();
    let summary = serde_json::json!({
        "config": path.display().to_string(),
        "webhookUrl": s.webhook_url.as_str(),
        "webhookMethod": s.webhook_method,
        "whitelist": if s.whitelist_enabled { serde_json::json!(whitelist) } else { serde_json::Value::Null },
        "triggerPrefix": s.trigger_prefix,
        "triggerOnDm": s.trigger_on_direct_message,
        "triggerOnMention": s.trigger_on_mention,
        "sendTyping": s.signal_typing,
        "statusCommand": s.status_command,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(not(feature = "matrix"))]
async fn run_relay(_config_path: Option<PathBuf>) -> anyhow::Result<()> {
    anyhow::bail!("hookrelay was built without Matrix support; rebuild with `--features matrix`")
}

#[cfg(feature = "matrix")]
async fn run_relay(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    use anyhow::Context;
    use lib::channels::{ChatClient, MatrixChatClient, MatrixLogin};
    use lib::relay::{self, Relay};
    use lib::webhook::WebhookClient;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    let (config, path) = lib::config::load_config(config_path)?;
    let settings = match lib::config::relay_settings(&config) {
        Ok(s) => {
            log::info!("hookrelay starting, webhook URL: {}", s.webhook_url);
            Some(s)
        }
        Err(e) => {
            log::error!("relay config invalid ({}); every message will get a config error reply", e);
            None
        }
    };

    let matrix = &config.channels.matrix;
    let non_empty = |v: &Option<String>| v.as_ref().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    let login = MatrixLogin {
        homeserver: non_empty(&matrix.homeserver).context("channels.matrix.homeserver is not set")?,
        user_id: non_empty(&matrix.user_id).context("channels.matrix.userId is not set")?,
        password: lib::config::resolve_matrix_password(&config),
        device_name: non_empty(&matrix.device_name),
        store_dir: lib::config::resolve_matrix_store_dir(&config, &path),
    };
    let client = Arc::new(MatrixChatClient::connect(login).await.map_err(anyhow::Error::msg)?);
    log::info!("matrix connected as {}", client.user_id());

    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let channel_tasks = client
        .start_inbound(inbound_tx)
        .await
        .map_err(anyhow::Error::msg)?;
    let chat: Arc<dyn ChatClient> = client;
    let relay = Arc::new(Relay::new(chat, WebhookClient::new()?, settings));
    let relay_task = relay::run(relay.clone(), inbound_rx);

    wait_for_shutdown(&relay, &path).await;
    log::info!("shutting down");
    for t in channel_tasks {
        t.abort();
    }
    relay_task.abort();
    Ok(())
}

/// Wait for Ctrl+C; on unix, SIGHUP re-reads the config file and reloads the relay settings.
#[cfg(feature = "matrix")]
async fn wait_for_shutdown(relay: &lib::relay::Relay, config_path: &std::path::Path) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::hangup()) {
            Ok(mut hup) => loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => return,
                    _ = hup.recv() => {
                        if let Err(e) = lib::relay::reload_from_file(relay, config_path).await {
                            log::error!("reload failed, keeping previous settings: {:#}", e);
                        }
                    }
                }
            },
            Err(e) => log::warn!("cannot listen for SIGHUP, reload disabled: {}", e),
        }
    }
    #[cfg(not(unix))]
    let _ = (relay, config_path);
    let _ = tokio::signal::ctrl_c().await;
}
