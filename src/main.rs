//! slabmover - slab page rebalancer sidecar.
//!
//! Watches a cache server's per-class memory accounting and moves
//! pages between slab classes to follow the workload.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use slabmover::config::Cli;
use slabmover::control::Controller;

fn main() {
    // RUST_LOG takes precedence; default to info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    let mut controller = Controller::new(cli.controller_config());
    controller.run(&running);
}
