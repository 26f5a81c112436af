//! # riddlebot-dispatch
//!
//! A per-chat serialized command dispatcher for a 20-questions chat bot:
//! parses inbound chat messages into typed commands, guarantees FIFO
//! per-chat command ordering through a distributed lock plus a bounded
//! pending queue, and chunks outbound replies for the transport's message
//! size limit.
//!
//! Game-rules evaluation, access-control policy, statistics persistence, and
//! message copy are all out of scope for this crate (non-goals) — they're
//! represented by the pluggable collaborator traits in [`collaborators`],
//! implemented against whatever those concerns actually need in a real
//! deployment.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use riddlebot_dispatch::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("listening with prefix {}", config.dispatcher.effective_prefix());
//!     Ok(())
//! }
//! ```
//!
//! ## Module organization
//!
//! - [`command`] - the parser (component A) and the typed `Command`/`InboundMessage`/`PendingMessage` model
//! - [`lock`] - the distributed lock manager (component B)
//! - [`queue`] - the pending queue store (component C)
//! - [`outbound`] - the chunker and sender (component D)
//! - [`notifier`] - queue-state notifications (component E)
//! - [`processor`] - the queue processor (component F)
//! - [`chain`] - the chained-question handler (component G)
//! - [`orchestrator`] - the game message service (component H), the top-level dispatch
//! - [`errors`] - the shared error taxonomy
//! - [`collaborators`] - the pluggable traits this crate depends on but does not implement
//! - [`store`] - the shared key-value store abstraction plus Redis/in-memory implementations
//! - [`workers`] - background worker pools for player registration and stats recording
//! - [`config`] - configuration loading
//! - [`metrics`] - lightweight dispatcher counters
//! - [`logutil`] - log-line sanitization helpers

pub mod chain;
pub mod collaborators;
pub mod command;
pub mod config;
pub mod errors;
pub mod logutil;
pub mod lock;
pub mod metrics;
pub mod notifier;
pub mod orchestrator;
pub mod outbound;
pub mod processor;
pub mod queue;
pub mod store;
pub mod workers;
