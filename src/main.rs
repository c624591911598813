// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! The progressive database server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use progressive_db::config::{ServerConfig, DEFAULT_CONFIG_FILE};
use progressive_db::server::run_server;
use progressive_db::Database;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter;
use tracing_subscriber::prelude::*;

/// A database that answers aggregate queries progressively.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Configuration file.
    #[clap(default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Keep every store in memory and ignore the configuration file.
    #[clap(long)]
    memory: bool,

    /// Override the listening host.
    #[clap(long)]
    host: Option<String>,

    /// Override the listening port.
    #[clap(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let fmt_layer = tracing_subscriber::fmt::layer().compact();
    let filter_layer =
        filter::EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into());

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let mut config = if args.memory {
        info!("using memory stores");
        ServerConfig::default()
    } else {
        ServerConfig::load(&args.config)
            .with_context(|| format!("failed to load {}", args.config.display()))?
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.log();

    let db = Database::open(&config).await?;
    run_server(&config.host, config.port, db).await?;
    Ok(())
}
