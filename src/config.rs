//! Client and server configuration
//!
//! Settings follow a priority chain:
//! 1. Built-in defaults (`Default` impls)
//! 2. Config file (`.toml`, or `.json`/`.json5`)
//! 3. Environment variables (`BLOCKSYNC_*` prefix)
//! 4. CLI flags (applied by the caller, highest priority)

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chunking::{DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE};
use crate::error::ConfigError;
use crate::types::DEFAULT_INDEX_FILENAME;

/// Default server listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8081";

// ============================================================================
// CLIENT
// ============================================================================

/// Everything a sync run needs, passed explicitly into the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
	/// Directory being synchronized
	pub base_dir: PathBuf,

	/// Block size in bytes used to chunk files
	pub block_size: usize,

	/// Metadata servers, tried in order on transport failure
	pub meta_store_addrs: Vec<String>,

	/// Deadline for each remote call
	pub rpc_timeout_secs: u64,

	/// How many times a run failing with a retryable error is repeated
	pub retry_count: u32,

	/// Delay between retries in milliseconds
	pub retry_delay_ms: u64,

	/// Name of the index file inside `base_dir`
	pub index_filename: String,
}

impl Default for ClientConfig {
	fn default() -> Self {
		ClientConfig {
			base_dir: PathBuf::from("."),
			block_size: DEFAULT_BLOCK_SIZE,
			meta_store_addrs: vec![],
			rpc_timeout_secs: 60,
			retry_count: 3,
			retry_delay_ms: 1000,
			index_filename: DEFAULT_INDEX_FILENAME.to_string(),
		}
	}
}

impl ClientConfig {
	/// Defaults overlaid with `path` (if any) and the environment
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		let mut config: ClientConfig = match path {
			Some(p) => read_config_file(p)?,
			None => ClientConfig::default(),
		};
		config.apply_env(|key| std::env::var(key).ok())?;
		Ok(config)
	}

	/// Apply `BLOCKSYNC_*` overrides read through `var`
	pub fn apply_env<F>(&mut self, var: F) -> Result<(), ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(v) = var("BLOCKSYNC_BASE_DIR") {
			self.base_dir = PathBuf::from(v);
		}
		if let Some(v) = var("BLOCKSYNC_BLOCK_SIZE") {
			self.block_size = parse_env("BLOCKSYNC_BLOCK_SIZE", &v)?;
		}
		if let Some(v) = var("BLOCKSYNC_META_ADDRS") {
			self.meta_store_addrs =
				v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
		}
		if let Some(v) = var("BLOCKSYNC_RPC_TIMEOUT_SECS") {
			self.rpc_timeout_secs = parse_env("BLOCKSYNC_RPC_TIMEOUT_SECS", &v)?;
		}
		if let Some(v) = var("BLOCKSYNC_RETRY_COUNT") {
			self.retry_count = parse_env("BLOCKSYNC_RETRY_COUNT", &v)?;
		}
		Ok(())
	}

	pub fn rpc_timeout(&self) -> Duration {
		Duration::from_secs(self.rpc_timeout_secs)
	}

	pub fn retry_delay(&self) -> Duration {
		Duration::from_millis(self.retry_delay_ms)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
			return Err(invalid(format!(
				"blockSize must be between 1 and {}, got {}",
				MAX_BLOCK_SIZE, self.block_size
			)));
		}
		if self.rpc_timeout_secs == 0 || self.rpc_timeout_secs > 3600 {
			return Err(invalid(format!(
				"rpcTimeoutSecs must be between 1 and 3600, got {}",
				self.rpc_timeout_secs
			)));
		}
		if self.retry_count > 100 {
			return Err(invalid(format!("retryCount too high: {}", self.retry_count)));
		}
		if self.index_filename.is_empty() || self.index_filename.contains('/') {
			return Err(invalid(format!("invalid indexFilename: {:?}", self.index_filename)));
		}
		Ok(())
	}
}

// ============================================================================
// SERVER
// ============================================================================

/// Which services a server process hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceMode {
	Meta,
	Block,
	#[default]
	Both,
}

impl ServiceMode {
	pub fn hosts_meta(self) -> bool {
		matches!(self, ServiceMode::Meta | ServiceMode::Both)
	}

	pub fn hosts_blocks(self) -> bool {
		matches!(self, ServiceMode::Block | ServiceMode::Both)
	}
}

impl std::str::FromStr for ServiceMode {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"meta" => Ok(ServiceMode::Meta),
			"block" => Ok(ServiceMode::Block),
			"both" => Ok(ServiceMode::Both),
			other => Err(invalid(format!("unknown service mode {:?}", other))),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
	/// Address the server binds to
	pub listen_addr: String,

	/// Block store address advertised to clients (defaults to the bound address)
	pub block_store_addr: Option<String>,

	/// Services hosted by this process
	pub mode: ServiceMode,

	/// Persist blocks in a redb database at this path instead of memory
	pub block_db: Option<PathBuf>,

	/// Reject blocks larger than this many bytes
	pub max_block_size: Option<usize>,
}

impl Default for ServerConfig {
	fn default() -> Self {
		ServerConfig {
			listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
			block_store_addr: None,
			mode: ServiceMode::Both,
			block_db: None,
			max_block_size: None,
		}
	}
}

impl ServerConfig {
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		let mut config: ServerConfig = match path {
			Some(p) => read_config_file(p)?,
			None => ServerConfig::default(),
		};
		config.apply_env(|key| std::env::var(key).ok())?;
		Ok(config)
	}

	pub fn apply_env<F>(&mut self, var: F) -> Result<(), ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(v) = var("BLOCKSYNC_LISTEN_ADDR") {
			self.listen_addr = v;
		}
		if let Some(v) = var("BLOCKSYNC_BLOCK_STORE_ADDR") {
			self.block_store_addr = Some(v);
		}
		if let Some(v) = var("BLOCKSYNC_MODE") {
			self.mode = v.parse()?;
		}
		if let Some(v) = var("BLOCKSYNC_BLOCK_DB") {
			self.block_db = Some(PathBuf::from(v));
		}
		Ok(())
	}

	/// Address handed out by `GetBlockStoreAddr`, given the address actually bound
	pub fn advertised_block_addr(&self, bound: SocketAddr) -> String {
		self.block_store_addr.clone().unwrap_or_else(|| bound.to_string())
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.listen_addr.is_empty() {
			return Err(invalid("listenAddr must not be empty".to_string()));
		}
		if self.mode == ServiceMode::Meta && self.block_store_addr.is_none() {
			return Err(invalid(
				"a metadata-only server needs blockStoreAddr pointing at a block server".to_string(),
			));
		}
		if self.block_db.is_some() && !self.mode.hosts_blocks() {
			return Err(invalid("blockDb is set but this server hosts no block service".to_string()));
		}
		if self.max_block_size == Some(0) {
			return Err(invalid("maxBlockSize must be greater than 0".to_string()));
		}
		Ok(())
	}
}

// ============================================================================
// LOADING
// ============================================================================

fn invalid(message: String) -> ConfigError {
	ConfigError::Invalid { message }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
	T::Err: std::fmt::Display,
{
	value.trim().parse().map_err(|e| invalid(format!("{}={:?}: {}", key, value, e)))
}

/// Read a TOML or JSON5 config file, chosen by extension
pub fn read_config_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
	let display = path.display().to_string();
	let contents = std::fs::read_to_string(path)
		.map_err(|e| ConfigError::ReadFailed { path: display.clone(), source: e })?;

	let is_json = matches!(path.extension().and_then(|e| e.to_str()), Some("json") | Some("json5"));
	if is_json {
		json5::from_str(&contents)
			.map_err(|e| ConfigError::ParseFailed { path: display, message: e.to_string() })
	} else {
		toml::from_str(&contents)
			.map_err(|e| ConfigError::ParseFailed { path: display, message: e.to_string() })
	}
}


// vim: ts=4
