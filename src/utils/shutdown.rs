//! Signal handlers for graceful termination
//!
//! The first SIGINT/SIGTERM raises a [`ShutdownFlag`]; a sync run checks it
//! between files and stops without rewriting the index. A second signal
//! exits immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared "please stop" marker
#[derive(Clone, Debug, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
	pub fn new() -> Self {
		ShutdownFlag::default()
	}

	pub fn raise(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_raised(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

/// Install SIGINT/SIGTERM handlers that raise `flag`
pub fn setup_signal_handlers(flag: ShutdownFlag) {
	tokio::spawn(async move {
		use tokio::signal;

		let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(stream) => stream,
			Err(e) => {
				warn!("Failed to setup SIGTERM handler: {}. Process will not handle SIGTERM gracefully.", e);
				return;
			}
		};

		let mut sigint = match signal::unix::signal(signal::unix::SignalKind::interrupt()) {
			Ok(stream) => stream,
			Err(e) => {
				warn!("Failed to setup SIGINT handler: {}. Process will not handle SIGINT gracefully.", e);
				return;
			}
		};

		loop {
			let code = tokio::select! {
				_ = sigterm.recv() => 143, // 128 + SIGTERM(15)
				_ = sigint.recv() => 130,  // 128 + SIGINT(2)
			};
			if flag.is_raised() {
				debug!("Second signal, exiting now");
				std::process::exit(code);
			}
			warn!("Interrupted, stopping after the current file (signal again to exit now)");
			flag.raise();
		}
	});
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_flag_shared_between_clones() {
		let flag = ShutdownFlag::new();
		let other = flag.clone();
		assert!(!other.is_raised());
		flag.raise();
		assert!(other.is_raised());
	}
}

// vim: ts=4
