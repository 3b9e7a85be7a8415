use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hashchain_core::{Block, Blockchain, CancelToken, ChainConfig, ProofOfWork, SearchStrategy};
use hashchain_storage::SledStore;
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "hashchain")]
#[command(about = "Append to and inspect a proof-of-work hash chain")]
struct Cli {
    /// Directory holding the sled database
    #[arg(long, env = "HASHCHAIN_DATA_DIR", default_value = "./chain-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mine a block carrying DATA and append it to the chain
    Add {
        data: String,
        /// Give up mining after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Search nonces on all cores
        #[arg(long)]
        parallel: bool,
    },
    /// Print every block, newest first
    Print {
        /// Emit a JSON array instead of text
        #[arg(long)]
        json: bool,
    },
    /// Walk the whole chain and check every block
    Verify,
}

#[derive(Serialize, Debug)]
struct BlockView {
    prev_hash: String,
    data: String,
    hash: String,
    nonce: u64,
    timestamp: u64,
    pow: bool,
}

impl BlockView {
    fn new(block: &Block, pow: &ProofOfWork) -> Self {
        Self {
            prev_hash: block.prev_hash_hex(),
            data: String::from_utf8_lossy(block.payload()).into_owned(),
            hash: block.hash_hex(),
            nonce: block.nonce(),
            timestamp: block.timestamp(),
            pow: pow.validate(block),
        }
    }
}

fn render_block(view: &BlockView) -> String {
    format!(
        "Prev. hash: {}\nData: {}\nHash: {}\nNonce: {}\nPoW: {}\n",
        view.prev_hash, view.data, view.hash, view.nonce, view.pow
    )
}

fn open(data_dir: &Path, config: ChainConfig, cancel: &CancelToken) -> Result<Blockchain<SledStore>> {
    let store = SledStore::open(data_dir)
        .with_context(|| format!("failed to open data dir {}", data_dir.display()))?;
    Blockchain::open_with(Arc::new(store), config, cancel).context("failed to load chain")
}

/// Cancel `token` on Ctrl-C so an interrupted search writes nothing.
fn cancel_on_interrupt(token: &CancelToken) -> tokio::task::JoinHandle<()> {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, abandoning search");
            token.cancel();
        }
    })
}

async fn run(cli: Cli) -> Result<()> {
    let data_dir = cli.data_dir;
    match cli.cmd {
        Command::Add {
            data,
            timeout_secs,
            parallel,
        } => {
            let cancel = match timeout_secs {
                Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
                None => CancelToken::new(),
            };
            let config = ChainConfig {
                strategy: if parallel {
                    SearchStrategy::Parallel
                } else {
                    SearchStrategy::Sequential
                },
                ..ChainConfig::default()
            };
            let interrupt = cancel_on_interrupt(&cancel);
            let mined = tokio::task::spawn_blocking(move || -> Result<Block> {
                let mut chain = open(&data_dir, config, &cancel)?;
                chain
                    .append_with(data, &cancel)
                    .context("failed to append block")
            })
            .await
            .context("mining task panicked");
            interrupt.abort();

            let block = mined??;
            info!(hash = %block.hash_hex(), nonce = block.nonce(), "block appended");
            println!("Success! {}", block.hash_hex());
        }
        Command::Print { json } => {
            let chain = open(&data_dir, ChainConfig::default(), &CancelToken::new())?;
            let pow = chain.proof_of_work();
            let mut views = Vec::new();
            for block in chain.iter() {
                let block = block.context("failed to read chain")?;
                let view = BlockView::new(&block, pow);
                if json {
                    views.push(view);
                } else {
                    println!("{}", render_block(&view));
                }
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&views)?);
            }
        }
        Command::Verify => {
            let chain = open(&data_dir, ChainConfig::default(), &CancelToken::new())?;
            let summary = chain.verify().context("chain failed verification")?;
            println!(
                "chain ok: {} blocks, tip {}, genesis {}",
                summary.length,
                hex::encode(summary.tip),
                hex::encode(summary.genesis)
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse()).await
}
