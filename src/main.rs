use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use blocksync::config::{ClientConfig, ServerConfig, ServiceMode};
use blocksync::logging::*;
use blocksync::protocol::{MetaClient, MetaService, RemoteConnector};
use blocksync::sync::SyncEngine;
use blocksync::utils::{setup_signal_handlers, ShutdownFlag};

fn config_arg() -> Arg {
	Arg::new("config")
		.short('c')
		.long("config")
		.value_name("FILE")
		.value_parser(value_parser!(PathBuf))
		.help("Config file (.toml, .json or .json5)")
}

fn meta_addrs_arg() -> Arg {
	Arg::new("meta-addr")
		.action(ArgAction::Append)
		.num_args(0..)
		.help("Metadata server address(es), tried in order")
}

fn cli() -> Command {
	Command::new("blocksync")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Block-level file synchronization client and server")
		.subcommand_required(true)
		.arg(
			Arg::new("verbose")
				.short('v')
				.long("verbose")
				.global(true)
				.action(ArgAction::SetTrue)
				.help("Debug logging (overridden by RUST_LOG)"),
		)
		.subcommand(
			Command::new("serve")
				.about("Run a metadata and/or block server")
				.arg(config_arg())
				.arg(Arg::new("listen").short('l').long("listen").value_name("ADDR"))
				.arg(
					Arg::new("block-addr")
						.long("block-addr")
						.value_name("ADDR")
						.help("Block store address handed to clients"),
				)
				.arg(
					Arg::new("mode")
						.long("mode")
						.value_parser(["meta", "block", "both"])
						.help("Services to host"),
				)
				.arg(
					Arg::new("block-db")
						.long("block-db")
						.value_name("PATH")
						.value_parser(value_parser!(PathBuf))
						.help("Persist blocks in a database file"),
				),
		)
		.subcommand(
			Command::new("sync")
				.about("Synchronize a directory with the servers")
				.arg(config_arg())
				.arg(
					Arg::new("block-size")
						.short('b')
						.long("block-size")
						.value_parser(value_parser!(usize)),
				)
				.arg(Arg::new("base-dir").required(true).value_parser(value_parser!(PathBuf)))
				.arg(meta_addrs_arg()),
		)
		.subcommand(
			Command::new("ls")
				.about("List the files known to the metadata server")
				.arg(config_arg())
				.arg(meta_addrs_arg()),
		)
}

fn meta_addrs(matches: &ArgMatches) -> Option<Vec<String>> {
	matches.get_many::<String>("meta-addr").map(|addrs| addrs.cloned().collect())
}

fn client_config(matches: &ArgMatches) -> Result<ClientConfig, Box<dyn Error>> {
	let mut config = ClientConfig::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
	if let Some(addrs) = meta_addrs(matches) {
		if !addrs.is_empty() {
			config.meta_store_addrs = addrs;
		}
	}
	Ok(config)
}

async fn cmd_serve(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
	let mut config = ServerConfig::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
	if let Some(listen) = matches.get_one::<String>("listen") {
		config.listen_addr = listen.clone();
	}
	if let Some(addr) = matches.get_one::<String>("block-addr") {
		config.block_store_addr = Some(addr.clone());
	}
	if let Some(mode) = matches.get_one::<String>("mode") {
		config.mode = mode.parse::<ServiceMode>()?;
	}
	if let Some(path) = matches.get_one::<PathBuf>("block-db") {
		config.block_db = Some(path.clone());
	}
	blocksync::serve::serve(config).await
}

async fn cmd_sync(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
	let mut config = client_config(matches)?;
	if let Some(dir) = matches.get_one::<PathBuf>("base-dir") {
		config.base_dir = dir.clone();
	}
	if let Some(size) = matches.get_one::<usize>("block-size") {
		config.block_size = *size;
	}
	config.validate()?;

	let shutdown = ShutdownFlag::new();
	setup_signal_handlers(shutdown.clone());

	let meta = Arc::new(MetaClient::new(&config.meta_store_addrs, config.rpc_timeout())?);
	let connector = Arc::new(RemoteConnector::new(config.rpc_timeout()));
	let engine = SyncEngine::new(config, meta, connector).with_shutdown(shutdown);

	match engine.run_with_retries().await {
		Ok(report) => {
			for (name, reason) in &report.failures {
				warn!("{}: {}", name, reason);
			}
			println!("{}", report);
			if report.is_clean() {
				Ok(())
			} else {
				Err(format!("{} file(s) failed to sync", report.failures.len()).into())
			}
		}
		Err(e) => {
			error!("Sync aborted: {}", e);
			Err(e.into())
		}
	}
}

async fn cmd_ls(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
	let config = client_config(matches)?;
	let meta = MetaClient::new(&config.meta_store_addrs, config.rpc_timeout())?;
	for record in meta.get_file_info_map().await?.values() {
		println!("{}", record);
	}
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let matches = cli().get_matches();
	init_tracing(if matches.get_flag("verbose") { "debug" } else { "info" });

	match matches.subcommand() {
		Some(("serve", sub)) => cmd_serve(sub).await,
		Some(("sync", sub)) => cmd_sync(sub).await,
		Some(("ls", sub)) => cmd_ls(sub).await,
		_ => Err("unknown subcommand".into()),
	}
}

// vim: ts=4
