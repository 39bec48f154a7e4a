//! ChainPortal CLI: inspect a portal dataset and stream blocks from the terminal.
//!
//! # Commands
//! ```text
//! chainportal metadata --url <dataset-url>
//! chainportal head     --url <dataset-url> [--finalized]
//! chainportal stream   --url <dataset-url> --from <n> [--to <n>] [--address <a>] [--topic0 <t>]
//! chainportal stream   --config portal.json
//! ```
//!
//! Stream output is one JSON object per line on stdout; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;

use chainportal_core::decoder::{BatchContext, Decoder, FnDecoder};
use chainportal_core::error::PortalError;
use chainportal_core::types::Batch;
use chainportal_evm::{evm_query, EvmRequest, LogDecoder, LogRequest};
use chainportal_source::{
    ErrorAction, HttpTransport, PipeEvent, Pipeline, PortalClient, PortalSourceBuilder,
    PortalSourceConfig, RetryPolicy,
};

mod logging;

#[derive(Parser)]
#[command(
    name = "chainportal",
    about = "Stream block data from an SQD-style portal",
    version
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit JSON structured logs
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Target {
    /// Dataset URL, e.g. https://portal.sqd.dev/datasets/ethereum-mainnet
    #[arg(long, env = "CHAINPORTAL_URL")]
    url: Option<String>,
    /// JSON file with a source configuration; flags override it
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the dataset descriptor
    Metadata {
        #[command(flatten)]
        target: Target,
    },

    /// Print the current (or finalized) head
    Head {
        #[command(flatten)]
        target: Target,
        /// Report the finalized head instead of the tip
        #[arg(long)]
        finalized: bool,
    },

    /// Stream blocks (or matching logs) as JSON lines
    Stream {
        #[command(flatten)]
        target: Target,
        /// First block
        #[arg(long)]
        from: Option<u64>,
        /// Last block (default: follow the chain)
        #[arg(long)]
        to: Option<u64>,
        /// Only logs from these contract addresses
        #[arg(long)]
        address: Vec<String>,
        /// Only logs with these topic0 values
        #[arg(long)]
        topic0: Vec<String>,
        /// Stream finalized blocks only
        #[arg(long)]
        finalized: bool,
        /// Skip batches that fail to decode instead of stopping
        #[arg(long)]
        skip_errors: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(&logging::LogConfig::from_verbosity(cli.verbose, cli.json_logs));

    match cli.command {
        Commands::Metadata { target } => cmd_metadata(&target).await,
        Commands::Head { target, finalized } => cmd_head(&target, finalized).await,
        Commands::Stream {
            target,
            from,
            to,
            address,
            topic0,
            finalized,
            skip_errors,
        } => {
            let mut config = load_config(&target)?;
            if let Some(from) = from {
                config.from_block = from;
            }
            if to.is_some() {
                config.to_block = to;
            }
            config.finalized_only |= finalized;
            cmd_stream(config, &address, &topic0, skip_errors).await
        }
    }
}

// ─── Configuration ───────────────────────────────────────────────────────────

fn load_config(target: &Target) -> Result<PortalSourceConfig> {
    let mut config = match &target.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => PortalSourceConfig::default(),
    };
    if let Some(url) = &target.url {
        config.url = url.clone();
    }
    if config.url.is_empty() {
        anyhow::bail!("no portal url: pass --url, set CHAINPORTAL_URL or use --config");
    }
    Ok(config)
}

fn client(config: &PortalSourceConfig) -> Result<PortalClient> {
    let url = config.validate()?;
    let transport = HttpTransport::new(config.request_timeout())?;
    Ok(PortalClient::new(
        url,
        Arc::new(transport),
        RetryPolicy::new(config.retry.clone()),
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

// ─── Commands ────────────────────────────────────────────────────────────────

async fn cmd_metadata(target: &Target) -> Result<()> {
    let client = client(&load_config(target)?)?;
    let meta = client.metadata().await.context("fetching dataset metadata")?;
    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}

async fn cmd_head(target: &Target, finalized: bool) -> Result<()> {
    let client = client(&load_config(target)?)?;
    let head = if finalized {
        client.finalized_head().await
    } else {
        client.head().await
    }
    .context("fetching head")?;
    match head {
        Some(cursor) => print_json(&cursor),
        None => {
            println!("null");
            Ok(())
        }
    }
}

async fn cmd_stream(
    config: PortalSourceConfig,
    addresses: &[String],
    topic0: &[String],
    skip_errors: bool,
) -> Result<()> {
    let source = PortalSourceBuilder::from_config(config, evm_query()).build()?;

    if addresses.is_empty() && topic0.is_empty() {
        let headers = FnDecoder::new("headers", |batch: &Batch, _: &BatchContext| {
            Ok::<_, PortalError>(
                batch
                    .blocks
                    .iter()
                    .map(|b| b.header.clone())
                    .collect::<Vec<_>>(),
            )
        });
        run(Pipeline::new(source, headers)?, skip_errors).await
    } else {
        let mut filter = LogRequest::default();
        filter.address = addresses.iter().map(|a| a.to_ascii_lowercase()).collect();
        filter.topic0 = topic0.iter().map(|t| t.to_ascii_lowercase()).collect();
        run(Pipeline::new(source, LogDecoder::new(filter))?, skip_errors).await
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Line<'a, T> {
    Data {
        block: u64,
        hash: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        time: Option<String>,
        data: &'a T,
    },
    Fork {
        block: u64,
        hash: &'a str,
        depth: usize,
    },
}

async fn run<D>(pipeline: Pipeline<EvmRequest, D>, skip_errors: bool) -> Result<()>
where
    D: Decoder<EvmRequest> + 'static,
    D::Output: Serialize,
{
    let pipeline = if skip_errors {
        pipeline.on_error(|_, _| ErrorAction::Skip)
    } else {
        pipeline
    };

    let stop = pipeline.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            stop.stop();
        }
    });

    let mut events = Box::pin(pipeline.into_stream());
    while let Some(event) = events.next().await {
        match event.context("portal stream failed")? {
            PipeEvent::Data(item) => print_json(&Line::Data {
                block: item.ctx.cursor.number,
                hash: &item.ctx.cursor.hash,
                time: item.ctx.cursor.datetime().map(|t| t.to_rfc3339()),
                data: &item.data,
            })?,
            PipeEvent::Fork(fork) => print_json(&Line::Fork::<()> {
                block: fork.cursor.number,
                hash: &fork.cursor.hash,
                depth: fork.depth(),
            })?,
        }
    }
    Ok(())
}
