//! marketdesk - Market prices with technical indicators from the command line
//!
//! Runs a single command, or a `serve` session reading commands from stdin.
//! Either way one cache manager is built at startup and closed on exit.

use std::sync::Arc;

use clap::Parser;
use tokio::io::{self, BufReader};
use tracing::{debug, info};

use marketdesk::cache::{default_cache_dir, CacheManager};
use marketdesk::cli::{self, Cli, Command};
use marketdesk::config::Config;
use marketdesk::data::OkxClient;
use marketdesk::logging;
use marketdesk::prices::PriceService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Config::from_env()?.with_overrides(
        cli.cache_dir.clone(),
        cli.okx_base_url.as_deref(),
        cli.log_level.as_deref(),
    )?;
    logging::init(&config.log_level);

    let cache_dir = config
        .cache_dir
        .clone()
        .or_else(default_cache_dir)
        .ok_or("could not determine a cache directory; set MARKETDESK_CACHE_DIR")?;
    debug!(cache_dir = %cache_dir.display(), "using cache directory");

    let cache = Arc::new(CacheManager::with_dir(cache_dir));
    let okx = OkxClient::with_timeout(config.okx_base_url.clone(), config.request_timeout)?;
    let prices = PriceService::new(Arc::clone(&cache), okx);

    let result = match &cli.command {
        Command::Serve => {
            let mut stdout = io::stdout();
            cli::serve(BufReader::new(io::stdin()), &mut stdout, &prices).await
        }
        command => {
            println!("{}", cli::run_command(command, &prices).await);
            Ok(())
        }
    };

    cache.close_all();
    info!("cache closed");
    result?;
    Ok(())
}
