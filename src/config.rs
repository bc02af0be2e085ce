//! CLI configuration for the rebalancer.

use clap::Parser;
use std::time::Duration;

use crate::engine::EngineConfig;

/// Slab page rebalancer sidecar for memcache-style cache servers.
#[derive(Parser, Debug)]
#[command(name = "slabmover")]
#[command(about = "Moves memory pages between slab classes to follow demand")]
#[command(version)]
pub struct Cli {
    /// Server admin address to manage ("host:port")
    #[arg(short, long, default_value = "127.0.0.1:11211")]
    pub server: String,

    /// Decision cycles of history to smooth over
    #[arg(long, default_value = "30")]
    pub window: usize,

    /// Youngest/oldest average-age ratio that triggers a rebalance
    #[arg(long, default_value = "0.8")]
    pub ratio: f64,

    /// Chunk size in bytes below which a class only donates pages
    #[arg(long, default_value = "512")]
    pub size_cutoff: u64,

    /// Fraction of chunks to hold free per class (and of pages globally)
    #[arg(long, default_value = "0.01")]
    pub free_ratio: f64,

    /// Seconds between free-budget refreshes
    #[arg(long, default_value = "60")]
    pub budget_interval: u64,

    /// Seconds between decision cycles
    #[arg(long, default_value = "1")]
    pub interval: u64,

    /// Seconds to wait before reconnecting after a failure
    #[arg(long, default_value = "5")]
    pub retry: u64,

    /// Connect timeout in seconds
    #[arg(long, default_value = "5")]
    pub connect_timeout: u64,

    /// Issue page moves instead of only reporting them
    #[arg(long)]
    pub automove: bool,
}

impl Cli {
    /// Assemble the controller configuration.
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            server: self.server.clone(),
            engine: EngineConfig {
                window: self.window,
                age_ratio: self.ratio,
                small_class_cutoff: self.size_cutoff,
            },
            free_ratio: self.free_ratio,
            budget_interval: Duration::from_secs(self.budget_interval),
            cycle_pause: Duration::from_secs(self.interval),
            retry_pause: Duration::from_secs(self.retry),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            automove: self.automove,
        }
    }
}

/// Assembled configuration consumed by the control loop.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub server: String,
    pub engine: EngineConfig,
    pub free_ratio: f64,
    pub budget_interval: Duration,
    pub cycle_pause: Duration,
    pub retry_pause: Duration,
    pub connect_timeout: Duration,
    pub automove: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:11211".to_string(),
            engine: EngineConfig::default(),
            free_ratio: 0.01,
            budget_interval: Duration::from_secs(60),
            cycle_pause: Duration::from_secs(1),
            retry_pause: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            automove: false,
        }
    }
}
