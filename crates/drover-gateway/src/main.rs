#![allow(clippy::print_stdout, clippy::print_stderr)] // CLI binary — stdout/stderr is the UI

mod actions;
mod channel;
mod checkpoint_store;
mod cli;
mod config;
mod inbound;
mod tracing_setup;

use anyhow::{Context, Result};
use clap::Parser;
use drover_agent::{AnthropicProvider, Controller, SystemPrompt};
use drover_core::traits::{ActionExecutor, CheckpointStore, Provider};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::channel::ChannelClient;
use crate::checkpoint_store::DiskCheckpointStore;
use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::inbound::Envelope;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let trace_file = cli
        .trace_file
        .or_else(|| std::env::var("DROVER_TRACE_FILE").ok().map(PathBuf::from));
    let _tracing_guard = tracing_setup::init(trace_file.as_deref())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "drover starting"
    );

    match cli.command {
        Commands::Start => cmd_start(cli.config.as_deref()).await,
        Commands::Check { format } => cmd_check(cli.config.as_deref(), &format),
        Commands::Send { thread, text } => cmd_send(cli.config.as_deref(), &thread, &text).await,
        Commands::Threads => cmd_threads(cli.config.as_deref()).await,
        Commands::Version => {
            println!("drover {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(config_path: Option<&str>) -> Result<(Config, PathBuf)> {
    let config_file = Config::find_config_path(config_path);
    let config = Config::load(&config_file)
        .with_context(|| format!("loading config from {}", config_file.display()))?;
    let config_dir = config_file
        .parent()
        .unwrap_or(Path::new("."))
        .to_path_buf();
    Ok((config, config_dir))
}

fn build_controller(
    config: &Config,
    config_dir: &Path,
    channel: Arc<ChannelClient>,
) -> Result<Controller> {
    let retention = config.retention_policy()?;

    let provider: Arc<dyn Provider> = Arc::new(
        AnthropicProvider::from_env(&config.agent.model, config.agent.max_tokens)
            .context("failed to initialize Anthropic provider")?,
    );

    let ops = Arc::new(actions::OpsClient::new(&config.operations)?);
    let router: Arc<dyn ActionExecutor> = Arc::new(actions::build_router(ops, channel));

    let checkpoint_dir = Config::resolve_path(config_dir, &config.checkpoints.dir);
    let store: Arc<dyn CheckpointStore> = Arc::new(DiskCheckpointStore::new(&checkpoint_dir)?);

    let system_prompt = match &config.agent.system_prompt_file {
        Some(file) => SystemPrompt::from_file(
            Config::resolve_path(config_dir, file),
            config.agent.system_prompt.clone(),
        ),
        None => SystemPrompt::inline(config.agent.system_prompt.clone()),
    };

    Ok(Controller::new(
        provider,
        router,
        store,
        retention,
        system_prompt,
        config.agent.max_decide_act_rounds,
    ))
}

// ---------------------------------------------------------------------------
// cmd_start — gateway daemon
// ---------------------------------------------------------------------------

async fn cmd_start(config_path: Option<&str>) -> Result<()> {
    let (config, config_dir) = load_config(config_path)?;

    let channel = Arc::new(ChannelClient::new(&config.channel)?);
    let controller = build_controller(&config, &config_dir, Arc::clone(&channel))?;

    info!(
        agent = %config.agent.id,
        model = %config.agent.model,
        relay = %config.channel.relay_url,
        "gateway started"
    );

    let poll_interval = Duration::from_secs(config.channel.poll_seconds);

    loop {
        tokio::select! {
            batch = channel.poll() => {
                match batch {
                    Ok(envelopes) if envelopes.is_empty() => {
                        tokio::time::sleep(poll_interval).await;
                    }
                    Ok(envelopes) => {
                        // Envelopes for one thread arrive in order; processing
                        // the batch sequentially keeps each thread's cycle
                        // single-writer. Re-poll immediately while there is
                        // traffic.
                        for envelope in envelopes {
                            process_envelope(&controller, &channel, &envelope).await;
                        }
                    }
                    Err(error) => {
                        warn!(error = %error, "relay poll failed, backing off");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn process_envelope(controller: &Controller, channel: &ChannelClient, envelope: &Envelope) {
    if envelope.is_status_update() {
        debug!("ignoring delivery status update");
        return;
    }
    let Some(thread_id) = envelope.thread_id() else {
        warn!("envelope without a sender, skipping");
        return;
    };
    let Some(text) = envelope.text() else {
        debug!(thread = %thread_id, "envelope without text content, skipping");
        return;
    };

    info!(thread = %thread_id, "inbound message");
    let content = format!("message from {thread_id}: {text}");

    match controller.handle_inbound(&thread_id, &content).await {
        Ok(reply) => {
            if let Err(error) = channel.send_text(&thread_id, &reply).await {
                warn!(thread = %thread_id, error = %error, "failed to deliver reply");
            }
        }
        Err(error) => {
            // Checkpoint is untouched; the relay will redeliver.
            warn!(thread = %thread_id, error = format!("{error:#}"), "message processing failed");
        }
    }
}

// ---------------------------------------------------------------------------
// cmd_check — validate config without starting
// ---------------------------------------------------------------------------

#[allow(clippy::unnecessary_wraps)] // must return Result to match main's match arms
fn cmd_check(config_path: Option<&str>, format: &str) -> Result<()> {
    let mut findings: Vec<(String, bool)> = Vec::new();

    let config_file = Config::find_config_path(config_path);
    let result = Config::load(&config_file);
    match &result {
        Ok(config) => {
            findings.push((format!("config parsed: {}", config_file.display()), true));
            match config.retention_policy() {
                Ok(policy) => findings.push((
                    format!(
                        "retention: keep >= {}, prune past {}",
                        policy.min_to_keep(),
                        policy.max_before_trigger()
                    ),
                    true,
                )),
                Err(error) => findings.push((format!("retention: {error}"), false)),
            }
            if std::env::var("ANTHROPIC_API_KEY").is_err() {
                findings.push(("ANTHROPIC_API_KEY is not set".to_owned(), false));
            }
            if std::env::var("DROVER_CHANNEL_TOKEN").is_err() {
                findings.push(("DROVER_CHANNEL_TOKEN is not set".to_owned(), false));
            }
        }
        Err(error) => findings.push((format!("{error:#}"), false)),
    }

    let has_errors = findings.iter().any(|(_, ok)| !ok);

    if format == "json" {
        let report: Vec<_> = findings
            .iter()
            .map(|(message, ok)| serde_json::json!({"ok": ok, "message": message}))
            .collect();
        println!("{}", serde_json::json!({"findings": report, "ok": !has_errors}));
    } else {
        for (message, ok) in &findings {
            let mark = if *ok { "ok" } else { "error" };
            println!("[{mark}] {message}");
        }
    }

    if has_errors {
        std::process::exit(1);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// cmd_threads — list saved conversation threads
// ---------------------------------------------------------------------------

async fn cmd_threads(config_path: Option<&str>) -> Result<()> {
    let (config, config_dir) = load_config(config_path)?;
    let checkpoint_dir = Config::resolve_path(&config_dir, &config.checkpoints.dir);
    let store = DiskCheckpointStore::new(&checkpoint_dir)?;

    let mut threads = store.list().await?;
    threads.sort();
    if threads.is_empty() {
        println!("no saved threads");
    } else {
        for thread in threads {
            println!("{thread}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// cmd_send — run one message locally
// ---------------------------------------------------------------------------

async fn cmd_send(config_path: Option<&str>, thread: &str, text: &str) -> Result<()> {
    let (config, config_dir) = load_config(config_path)?;

    let channel = Arc::new(ChannelClient::new(&config.channel)?);
    let controller = build_controller(&config, &config_dir, channel)?;

    let reply = controller.handle_inbound(thread, text).await?;
    println!("{reply}");
    Ok(())
}
