//! In-process connector
//!
//! Hands out the same block store regardless of the advertised address, so a
//! client can run against stores living in its own process (tests, embedding).

use async_trait::async_trait;
use std::sync::Arc;

use super::traits::*;

pub struct LocalConnector {
	store: Arc<dyn BlockService>,
}

impl LocalConnector {
	pub fn new(store: Arc<dyn BlockService>) -> Self {
		LocalConnector { store }
	}
}

#[async_trait]
impl BlockConnector for LocalConnector {
	async fn connect(&self, _addr: &str) -> ProtocolResult<Arc<dyn BlockService>> {
		Ok(self.store.clone())
	}
}

// vim: ts=4
