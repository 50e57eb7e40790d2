//! Lance un M-SEARCH et affiche les devices qui répondent.
//!
//! ```text
//! cargo run -p pmossdp --example ssdp_search -- [ST] [MX]
//! ```
//!
//! Sans argument, ST et MX viennent de la configuration (`PMOSSDP_CONFIG__...`).

use futures::StreamExt;
use pmossdp::{HttpuClient, SearchOptions, SsdpConfig, TracingSink, ssdp_search};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = SsdpConfig::load(None)?;
    let mut options = SearchOptions::from_config(&config);

    let mut args = std::env::args().skip(1);
    if let Some(st) = args.next() {
        options.search_target = st;
    }
    if let Some(mx) = args.next() {
        options.max_wait_seconds = mx.parse()?;
    }

    tracing::info!(
        "Starting SSDP search for {} (MX={}, sends={})",
        options.search_target,
        options.max_wait_seconds,
        options.num_sends
    );

    let client = HttpuClient::with_config(&config)?;
    let mut results = ssdp_search(
        &client,
        &options,
        Arc::new(TracingSink),
        CancellationToken::new(),
    )
    .await?;

    let mut count = 0;
    while let Some(adv) = results.next().await {
        count += 1;
        println!(
            "[{}] from={} usn={} location={} server={}",
            count,
            adv.sender(),
            adv.usn().unwrap_or("-"),
            adv.location(),
            adv.header("SERVER").unwrap_or("Unknown")
        );
    }

    println!("{} device(s) found", count);
    Ok(())
}
