//! rosetta-fetcher CLI: initialize against a Rosetta server, fetch blocks
//! and block ranges, print them as JSON.

use clap::{Parser, Subcommand};
use rosetta_fetcher::{
    Block, CancellationToken, Fetcher, FetcherConfig, NetworkIdentifier, PartialBlockIdentifier,
};
use std::path::PathBuf;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();
    let cli = Cli::parse();
    let fetcher = Fetcher::new(build_config(&cli.options)?)?;
    let rt = tokio::runtime::Runtime::new()?;
    let cancel = CancellationToken::new();
    rt.spawn(cancel_on_ctrl_c(cancel.clone()));
    rt.block_on(async {
        match cli.command {
            Command::Network => run_network(&fetcher, &cancel).await,
            Command::Block(args) => run_block(&fetcher, &cancel, args).await,
            Command::Range(args) => run_range(&fetcher, &cancel, args).await,
        }
    })
}

#[derive(Parser)]
#[command(name = "rosetta-fetcher")]
#[command(author = "gorusys <goru.connector@outlook.com>")]
#[command(about = "Fetch asserted blocks from a Rosetta data API")]
struct Cli {
    #[command(flatten)]
    options: GlobalOptions,
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
struct GlobalOptions {
    /// JSON config file; flags below override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    server_url: Option<String>,
    /// Blocks fetched at once during a range fetch.
    #[arg(long, global = true)]
    concurrency: Option<usize>,
    #[arg(long, global = true)]
    max_attempts: Option<u32>,
    /// Minimum milliseconds between requests.
    #[arg(long, global = true)]
    rate_limit_ms: Option<u64>,
    /// Blockchain of the primary network (requires --network).
    #[arg(long, global = true, requires = "network")]
    blockchain: Option<String>,
    #[arg(long, global = true, requires = "blockchain")]
    network: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize and print the primary network and its status.
    Network,
    /// Fetch one block (the current block by default).
    Block(BlockArgs),
    /// Fetch a contiguous range of blocks.
    Range(RangeArgs),
}

#[derive(Parser)]
struct BlockArgs {
    #[arg(long, conflicts_with = "hash")]
    index: Option<i64>,
    #[arg(long)]
    hash: Option<String>,
}

#[derive(Parser)]
struct RangeArgs {
    /// First index; defaults to the genesis block.
    #[arg(long)]
    low: Option<i64>,
    /// Number of blocks, `low` included.
    #[arg(long, default_value_t = 11)]
    count: i64,
}

fn build_config(opts: &GlobalOptions) -> Result<FetcherConfig, Box<dyn std::error::Error>> {
    let mut config = match &opts.config {
        Some(path) => FetcherConfig::load_from_path(path)?,
        None => FetcherConfig::load()?,
    };
    if let Some(url) = &opts.server_url {
        config = config.with_base_url(url);
    }
    if let Some(n) = opts.concurrency {
        config.max_concurrency = n;
    }
    if let Some(n) = opts.max_attempts {
        config.retry.max_attempts = Some(n);
    }
    if let Some(ms) = opts.rate_limit_ms {
        config.rate_limit_ms = Some(ms);
    }
    if let (Some(blockchain), Some(network)) = (&opts.blockchain, &opts.network) {
        config.primary_network = Some(NetworkIdentifier::new(blockchain, network));
    }
    Ok(config)
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupted; cancelling");
        cancel.cancel();
    }
}

fn log_block(block: &Block) {
    let time = block
        .timestamp_utc()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_default();
    info!(
        index = block.block_identifier.index,
        hash = %block.block_identifier.hash,
        %time,
        transactions = block.transactions.len(),
        "block"
    );
}

async fn run_network(
    fetcher: &Fetcher,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let (network, status) = fetcher.initialize_asserter(cancel).await?;
    println!("{}", serde_json::to_string_pretty(&network)?);
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn run_block(
    fetcher: &Fetcher,
    cancel: &CancellationToken,
    args: BlockArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let (network, status) = fetcher.initialize_asserter(cancel).await?;
    let target = match (args.index, args.hash) {
        (Some(index), _) => PartialBlockIdentifier::at_index(index),
        (None, Some(hash)) => PartialBlockIdentifier::with_hash(hash),
        (None, None) => PartialBlockIdentifier::from(&status.current_block_identifier),
    };
    let block = fetcher.fetch_block(cancel, &network, &target).await?;
    log_block(&block);
    println!("{}", serde_json::to_string_pretty(&block)?);
    Ok(())
}

async fn run_range(
    fetcher: &Fetcher,
    cancel: &CancellationToken,
    args: RangeArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let (network, status) = fetcher.initialize_asserter(cancel).await?;
    let low = args.low.unwrap_or(status.genesis_block_identifier.index);
    let high = low.saturating_add(args.count.max(1) - 1);
    let blocks = fetcher.fetch_block_range(cancel, &network, low, high).await?;
    for block in blocks.values() {
        log_block(block);
    }
    info!(low, high, requests = fetcher.request_count(), "range complete");
    println!("{}", serde_json::to_string_pretty(&blocks)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_defaults_to_genesis_plus_ten() {
        let cli = Cli::try_parse_from(["rosetta-fetcher", "range"]).unwrap();
        let Command::Range(args) = cli.command else {
            panic!("expected range");
        };
        assert_eq!(args.low, None);
        assert_eq!(args.count, 11);
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "rosetta-fetcher",
            "--server-url",
            "http://node:9000",
            "--concurrency",
            "3",
            "--blockchain",
            "bitcoin",
            "--network",
            "testnet3",
            "network",
        ])
        .unwrap();
        let config = build_config(&cli.options).unwrap();
        assert_eq!(config.base_url, "http://node:9000");
        assert_eq!(config.max_concurrency, 3);
        assert_eq!(
            config.primary_network,
            Some(NetworkIdentifier::new("bitcoin", "testnet3"))
        );
    }
}
