//! Binary entrypoint for the 20-questions command dispatcher.
//!
//! Commands:
//! - `serve --config <path>` - load config, wire the dispatcher, and run it
//!   against an in-process demo inbound source (stdin lines as chat
//!   messages), since no concrete wire transport is in scope for this crate.
//! - `init --config <path>` - write a default config file.
//! - `check-store --config <path>` - verify connectivity to the configured
//!   shared store.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info};

use riddlebot_dispatch::chain::ChainHandler;
use riddlebot_dispatch::collaborators::mock::{AllowAllAccessControl, MockRiddleService, MockStatsService};
use riddlebot_dispatch::collaborators::templates::DefaultMessageProvider;
use riddlebot_dispatch::command::parser::CommandParser;
use riddlebot_dispatch::command::InboundMessage;
use riddlebot_dispatch::config::Config;
use riddlebot_dispatch::lock::LockManager;
use riddlebot_dispatch::orchestrator::GameMessageService;
use riddlebot_dispatch::outbound::{OutboundSender, Publisher};
use riddlebot_dispatch::queue::PendingQueue;
use riddlebot_dispatch::store::redis_store::RedisStore;
use riddlebot_dispatch::store::SharedStore;
use riddlebot_dispatch::workers::{player_pool, stats_pool, OverflowPolicy, PlayerRegistrar, StatsRecorder};

#[derive(Parser)]
#[command(name = "riddlebot-dispatch")]
#[command(about = "Per-chat serialized command dispatcher for a 20-questions chat bot")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatcher against a demo stdin-driven inbound source
    Serve,
    /// Write a default configuration file
    Init,
    /// Verify connectivity to the configured shared store
    CheckStore,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Init) {
        init_logging(None, cli.verbose);
        Config::create_default(&cli.config).await?;
        println!("wrote default config to {}", cli.config);
        return Ok(());
    }

    let config = Config::load(&cli.config).await?;
    init_logging(Some(&config), cli.verbose);

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::CheckStore => check_store(&config).await,
        Commands::Serve => serve(&config).await,
    }
}

async fn check_store(config: &Config) -> Result<()> {
    info!("connecting to shared store at {}", config.store.url);
    let store = RedisStore::connect(&config.store.url).await?;
    let probe_chat = "check-store-probe";
    let token = "check-store";
    let acquired = store.try_acquire_write_lock(probe_chat, token, 1000).await?;
    if acquired {
        store.release_write_lock(probe_chat, token).await?;
    }
    println!("store reachable, probe lock acquired: {acquired}");
    Ok(())
}

/// Trivial fire-and-forget player registrar for the demo entrypoint: logs
/// and discards. A real deployment would implement this against the riddle
/// service's own player bookkeeping.
struct LoggingPlayerRegistrar;

#[async_trait::async_trait]
impl PlayerRegistrar for LoggingPlayerRegistrar {
    async fn register(&self, chat_id: &str, user_id: &str) {
        info!("player {} registered in chat {}", user_id, chat_id);
    }
}

/// Trivial fire-and-forget stats recorder for the demo entrypoint: logs and
/// discards. A real deployment would implement this against whatever store
/// backs `UserStats`/`RoomStats`.
struct LoggingStatsRecorder;

#[async_trait::async_trait]
impl StatsRecorder for LoggingStatsRecorder {
    async fn record(&self, chat_id: &str, user_id: &str, event: &str) {
        info!("stats event '{event}' for user {user_id} in chat {chat_id}");
    }
}

/// Publishes replies to stdout, prefixed by outbound kind, so `serve` is
/// runnable and observable without a live chat transport.
struct StdoutPublisher;

#[async_trait::async_trait]
impl Publisher for StdoutPublisher {
    async fn publish(&self, message: riddlebot_dispatch::command::OutboundMessage) -> Result<()> {
        println!("[{:?}] {}", message.kind, message.text);
        Ok(())
    }
}

async fn serve(config: &Config) -> Result<()> {
    info!("starting dispatcher v{}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn SharedStore> = Arc::new(RedisStore::connect(&config.store.url).await?);

    let lock_manager = Arc::new(LockManager::new(
        store.clone(),
        config.store.write_lock_ttl_ms,
        config.store.read_lock_ttl_ms,
        config.store.processing_flag_ttl_ms,
        config.store.lock_acquire_timeout_ms,
    ));
    let queue = Arc::new(PendingQueue::new(
        store,
        config.dispatcher.queue_max,
        config.store.pending_ttl_ms,
        config.store.chain_skip_ttl_ms,
    ));

    let riddle = Arc::new(MockRiddleService::new());
    let access = Arc::new(AllowAllAccessControl);
    let stats = Arc::new(MockStatsService);
    let templates = Arc::new(DefaultMessageProvider);
    let chain = Arc::new(ChainHandler::new(riddle.clone(), queue.clone()));
    let outbound = Arc::new(OutboundSender::new(StdoutPublisher, config.dispatcher.max_chunk_len as i64));
    let parser = CommandParser::new(config.dispatcher.effective_prefix().to_string());
    let registrar = player_pool(Arc::new(LoggingPlayerRegistrar), 64, OverflowPolicy::Drop);
    let recorder = stats_pool(Arc::new(LoggingStatsRecorder), 64, OverflowPolicy::Drop);

    let service = GameMessageService::new(
        parser,
        access,
        riddle,
        stats,
        templates,
        lock_manager,
        queue,
        outbound,
        chain,
        registrar,
        recorder,
        config.dispatcher.delayed_waiting_ms,
        config.dispatcher.batch_size,
        config.dispatcher.mq_max_queue_iterations,
        config.categories.clone(),
    );
    service.log_startup(config.dispatcher.effective_prefix()).await;

    println!("dispatcher ready. type chat lines (e.g. `/20q start`); Ctrl-D to exit.");
    use tokio::io::AsyncBufReadExt;
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let inbound = InboundMessage {
            chat_id: "demo-chat".to_string(),
            user_id: "demo-user".to_string(),
            sender: None,
            thread_id: None,
            content: line,
        };
        service.dispatch(inbound).await;
    }

    Ok(())
}

fn init_logging(config: Option<&Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    let base_level = match verbosity {
        0 => config
            .map(|c| c.logging.level.parse().unwrap_or(log::LevelFilter::Info))
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let file = config.and_then(|c| c.logging.file.clone());
    if let Some(file) = file {
        if let Ok(f) = std::fs::OpenOptions::new().create(true).append(true).open(&file) {
            let mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                writeln!(fmt, "{}", line)
            });
        } else {
            error!("failed to open log file {file}, falling back to console-only logging");
            default_format(&mut builder);
        }
    } else {
        default_format(&mut builder);
    }

    let _ = builder.try_init();
}

fn default_format(builder: &mut env_logger::Builder) {
    use std::io::Write;
    builder.format(|fmt, record| {
        writeln!(
            fmt,
            "{} [{}] {}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
            record.level(),
            record.args()
        )
    });
}
