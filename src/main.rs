use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;

use tokio::runtime::Builder;
use tracing::{debug, info};

use epcdns::cli::{Cli, Commands};
use epcdns::resolver::{FilterMode, PeerResolver, ResolverOptions};
use epcdns::transport::UdpTransport;

fn main() -> Result<()> {
    // Lookups are IO-bound; a few threads more than the core count helps,
    // but cap the pool so large machines don't spawn dozens of idle workers.
    let num_cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    let worker_threads = std::cmp::min(num_cpus + 2, 16);

    debug!("configuring Tokio runtime with {} worker threads", worker_threads);

    let runtime = Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .expect("failed to create Tokio runtime");

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut transport = match cli.nameserver {
        Some(server) => UdpTransport::new(server),
        None => UdpTransport::from_system_conf()
            .context("no --nameserver given and system resolver configuration unusable")?,
    };
    if let Some(ms) = cli.timeout_ms {
        transport = transport.with_timeout(Duration::from_millis(ms));
    }
    if let Some(attempts) = cli.attempts {
        transport = transport.with_attempts(attempts);
    }

    let options = ResolverOptions {
        filter_mode: if cli.rfc2915_filter {
            FilterMode::Rfc2915
        } else {
            FilterMode::Legacy
        },
        drop_invalid_records: cli.drop_invalid,
    };

    match &cli.command {
        Commands::Resolve { identity, apn } => {
            let ctx = identity.to_context(apn);
            info!(
                "resolving {} peer for mcc={} mnc={} apn='{}'",
                ctx.target, ctx.mcc, ctx.mnc, ctx.apn
            );
            let resolver = PeerResolver::new(transport).with_options(options);
            let result = resolver.resolve_peer(&ctx).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Batch {
            identity,
            input_file,
            output_file,
            chunk_size,
            rate_limit,
            concurrent_queries,
        } => {
            let base = identity.to_context("");
            info!("resolving APN batch from {:?}", input_file);
            let resolver = PeerResolver::new(transport)
                .with_options(options)
                .with_concurrency(*concurrent_queries);
            resolver
                .process_batch(
                    &base,
                    input_file,
                    output_file.as_ref(),
                    *chunk_size,
                    *rate_limit,
                )
                .await?;
        }
    }

    Ok(())
}
