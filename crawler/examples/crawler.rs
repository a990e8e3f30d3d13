//! Example of using the bitcoin-seeder crawler.
//!
//! Seeds the address queue from DNS, crawls until interrupted, and logs every
//! discovered address and handshake.

use bitcoin::Network;
use bitcoin_seeder_crawler::{
    seed_queue, spawn_flusher, AddressQueue, BufferedReporter, CrawlerBuilder, LogSink,
    ReportSink, DEFAULT_FLUSH_INTERVAL, DNS_SEEDS,
};
use clap::Parser;
use log::LevelFilter;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Network to crawl: bitcoin, testnet, testnet4, signet or regtest.
    #[arg(short, long, default_value = "bitcoin")]
    network: Network,

    /// Seed host or IP address. Repeatable, defaults to the mainnet DNS seeds.
    #[arg(short, long)]
    seed: Vec<String>,

    /// Port of the seed hosts. Defaults to the network's p2p port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Custom user agent (optional).
    #[arg(short, long)]
    user_agent: Option<String>,

    /// Maximum number of concurrent connections, derived from the file descriptor limit if unset.
    #[arg(short, long)]
    max_connections: Option<usize>,

    /// Addresses dialed per engine turn.
    #[arg(short, long, default_value = "128")]
    batch_size: usize,

    /// Seconds between status lines.
    #[arg(long, default_value = "60")]
    status_interval: u64,

    /// Accept frames whose checksum does not match their payload.
    #[arg(long)]
    skip_checksum: bool,

    /// Log level.
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    // Configure fern logger
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] {} - {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log_level)
        .chain(std::io::stderr())
        .apply()?;

    log::info!("CRAWLING THE BITCOIN NETWORK");

    let mut builder = CrawlerBuilder::new(args.network)
        .with_batch_size(args.batch_size)
        .with_status_interval(Duration::from_secs(args.status_interval))
        .with_checksum_verification(!args.skip_checksum);
    if let Some(user_agent) = args.user_agent.clone() {
        log::debug!("Using custom user agent: {user_agent}");
        builder = builder.with_user_agent(user_agent)?;
    }
    if let Some(max_connections) = args.max_connections {
        builder = builder.with_max_connections(max_connections);
    }

    let reporter = Arc::new(BufferedReporter::new());
    let queue = Arc::new(AddressQueue::with_reporter(reporter.clone()));
    let flusher = spawn_flusher(&reporter, LogSink, DEFAULT_FLUSH_INTERVAL);

    let hosts: Vec<&str> = if args.seed.is_empty() {
        if args.network != Network::Bitcoin {
            log::warn!("Default DNS seeds serve mainnet only, pass --seed for {}", args.network);
        }
        DNS_SEEDS.to_vec()
    } else {
        args.seed.iter().map(String::as_str).collect()
    };
    let port = args.port.unwrap_or_else(|| builder.default_port());
    let seeded = seed_queue(&queue, &hosts, port).await;
    if seeded == 0 {
        return Err("No seed addresses resolved".into());
    }

    let mut crawler = builder.build(queue, reporter.clone())?;
    log::debug!("Admitting up to {} connections", crawler.max_connections());

    let shutdown = crawler.shutdown_handle();
    let mut engine = tokio::task::spawn_blocking(move || crawler.run());

    tokio::select! {
        result = &mut engine => result??,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            log::info!("Interrupted, stopping crawl");
            shutdown.store(true, Ordering::Relaxed);
            engine.await??;
        }
    }

    // Deliver what the flusher has not picked up yet.
    LogSink.deliver(reporter.take()).await?;
    drop(reporter);
    flusher.await?;

    Ok(())
}
