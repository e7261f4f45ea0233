//! Command-line interface for marketdesk
//!
//! Defines the clap grammar shared by one-shot invocations and the `serve`
//! session, and runs parsed commands against a [`PriceService`].

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::admin;
use crate::prices::PriceService;

/// Error types for commands read during a session
#[derive(Debug, Error)]
pub enum CliError {
    /// The line does not match the command grammar
    #[error("{0}")]
    Parse(#[from] clap::Error),

    /// `serve` was requested from inside a session
    #[error("Already serving; 'serve' is only valid on the command line")]
    NestedServe,
}

/// marketdesk - Market prices with technical indicators, cached
#[derive(Parser, Debug)]
#[command(name = "marketdesk")]
#[command(about = "Market prices with technical indicators, backed by a two-tier cache")]
#[command(version)]
pub struct Cli {
    /// Directory for persisted cache records
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Base URL of the OKX API
    #[arg(long, global = true, value_name = "URL")]
    pub okx_base_url: Option<String>,

    /// Log filter used when RUST_LOG is not set, e.g. `info` or `marketdesk=debug`
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Candle history of an OKX instrument with MACD, KDJ, RSI and BOLL columns
    Prices {
        /// Instrument ID, e.g. BTC-USDT
        inst_id: String,

        /// Candle granularity: 1m/3m/5m/15m/30m/1H/2H/4H/6H/12H/1D/1W/1M
        #[arg(long, default_value = "1H")]
        bar: String,

        /// Number of rows to return
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// Inspect or clear the cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Read commands from stdin, one per line, until `quit` or end of input
    Serve,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CacheAction {
    /// List cached keys
    Status,

    /// Remove one key, or everything when no key is given
    Clear {
        /// Cache key to remove
        key: Option<String>,
    },
}

/// Grammar of a session line: a command without the program name
#[derive(Parser, Debug)]
#[command(name = "marketdesk", no_binary_name = true)]
struct SessionLine {
    #[command(subcommand)]
    command: Command,
}

/// What a single session line asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    Run(Command),
    Quit,
    Blank,
}

/// Parses one line typed into a `serve` session.
///
/// # Arguments
/// * `line` - Raw input line; words are separated by whitespace
///
/// # Returns
/// * `Ok(SessionInput)` for a command, a quit request or a blank line
/// * `Err(CliError)` if the line is not a valid command
pub fn parse_session_line(line: &str) -> Result<SessionInput, CliError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        [] => Ok(SessionInput::Blank),
        ["quit"] | ["exit"] => Ok(SessionInput::Quit),
        _ => match SessionLine::try_parse_from(words)?.command {
            Command::Serve => Err(CliError::NestedServe),
            command => Ok(SessionInput::Run(command)),
        },
    }
}

/// Runs a data or cache command and returns its text result
///
/// `serve` has no result of its own and yields an empty string.
pub async fn run_command(command: &Command, prices: &PriceService) -> String {
    match command {
        Command::Prices { inst_id, bar, limit } => prices.okx_prices(inst_id, bar, *limit).await,
        Command::Cache { action: CacheAction::Status } => admin::cache_status(prices.cache()),
        Command::Cache {
            action: CacheAction::Clear { key },
        } => admin::cache_clear(prices.cache(), key.as_deref()),
        Command::Serve => String::new(),
    }
}

/// Serves commands read line by line from `reader`
///
/// Each result, or parse error, is written to `writer` followed by a newline.
/// The session ends on `quit`, `exit` or end of input. Every command shares
/// the cache held by `prices`.
pub async fn serve<R, W>(reader: R, writer: &mut W, prices: &PriceService) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("session started");
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let output = match parse_session_line(&line) {
            Ok(SessionInput::Blank) => continue,
            Ok(SessionInput::Quit) => break,
            Ok(SessionInput::Run(command)) => {
                debug!(?command, "running session command");
                run_command(&command, prices).await
            }
            Err(e) => e.to_string().trim_end().to_string(),
        };
        writer.write_all(output.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    info!("session ended");
    Ok(())
}
