//! Logging prelude module for convenient access to tracing macros.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("Sync done");
//! warn!("Failed to sync {}", name);
//! debug!("Accepted {} at version {}", name, version);
//! ```

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// `default_level` applies when `RUST_LOG` is unset or invalid:
///
/// ```bash
/// RUST_LOG=debug blocksync sync ./dir 127.0.0.1:8081
/// RUST_LOG=blocksync::sync=debug,blocksync::protocol=warn blocksync serve
/// ```
pub fn init_tracing(default_level: &str) {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
		)
		.with_writer(std::io::stderr)
		.init();
}

// vim: ts=4
