use clap::Parser;
use ocsp_cache::config::Config;
use ocsp_cache::fetch::FetchOptions;
use ocsp_cache::scheduler::RefreshScheduler;
use ocsp_cache::trust::load_signer;
use ocsp_cache::{
    DiagnosticsRegistry, DiskCache, FreshnessPolicy, HttpTransport, OcspFetcher,
    RefreshCoordinator, RevocationCache, StaticInventory, StaticTrustConfiguration,
    TrustConfiguration,
};
use std::process;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// OCSP status cache - keeps validated revocation proofs fresh
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "ocsp-cache")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "ocsp-cache.json")]
    config_path: String,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Run a single refresh sweep, print diagnostics and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing_subscriber::registry()
                .with(EnvFilter::new("info"))
                .with(tracing_subscriber::fmt::layer())
                .init();

            if cli.validate {
                eprintln!("Configuration validation failed: {}", e);
                process::exit(1);
            }

            warn!("Could not load config file from {}: {}", cli.config_path, e);
            if std::path::Path::new(&cli.config_path).exists() {
                process::exit(1);
            }

            info!("Creating example configuration at: {}", cli.config_path);
            if let Err(e) = Config::example().to_file(&cli.config_path) {
                error!("Error creating example config: {}", e);
                process::exit(1);
            }
            info!("Please edit {} and restart", cli.config_path);
            process::exit(0);
        }
    };

    let log_level = config.log_level.as_deref().unwrap_or("info");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let trust = match StaticTrustConfiguration::from_config(&config) {
        Ok(trust) => Arc::new(trust),
        Err(e) => {
            error!("Failed to load certificate authorities: {}", e);
            process::exit(1);
        }
    };
    let inventory = match StaticInventory::from_config(&config) {
        Ok(inventory) => Arc::new(inventory),
        Err(e) => {
            error!("Failed to load certificate inventory: {}", e);
            process::exit(1);
        }
    };
    let signer = match config.signer.as_ref().map(load_signer).transpose() {
        Ok(signer) => signer.map(Arc::new),
        Err(e) => {
            error!("Failed to load request signer: {}", e);
            process::exit(1);
        }
    };

    if cli.validate {
        println!("✓ Configuration validated successfully!");
        println!();
        println!("  Cache directory: {}", config.cache_dir.display());
        println!("  Freshness window: {}s", config.freshness.freshness_secs);
        println!("  Enforce nextUpdate: {}", config.freshness.verify_next_update);
        println!("  Fetch interval: {}s", config.fetch.fetch_interval().as_secs());
        println!("  Signed requests: {}", signer.is_some());
        println!("  Certificates: {}", config.certificates.len());
        println!();
        println!("Authorities:");
        for authority in trust.authorities() {
            if authority.responders.is_empty() {
                println!("  {} (no responders)", authority.authority);
            } else {
                println!("  {} -> {}", authority.authority, authority.responders.join(", "));
            }
        }
        process::exit(0);
    }

    info!("OCSP cache v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config_path);

    let transport = match HttpTransport::new(
        config.fetch.connect_timeout(),
        config.fetch.max_response_size_bytes,
    ) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!("Failed to create HTTP transport: {}", e);
            process::exit(1);
        }
    };

    let policy = FreshnessPolicy::new(trust.freshness_window(), trust.verify_next_update())
        .with_refresh_margin_ratio(config.freshness.refresh_margin_ratio);
    let diagnostics = Arc::new(DiagnosticsRegistry::new());

    let mut fetcher = OcspFetcher::new(transport, trust.clone(), diagnostics.clone(), policy)
        .with_options(FetchOptions::from_config(&config.fetch));
    if let Some(signer) = signer {
        fetcher = fetcher.with_signer(signer);
    }

    let disk = match DiskCache::open(&config.cache_dir).await {
        Ok(disk) => disk,
        Err(e) => {
            error!("Failed to open cache directory {}: {}", config.cache_dir.display(), e);
            process::exit(1);
        }
    };
    let cache = match RevocationCache::open(disk, policy, Arc::new(fetcher)).await {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            error!("Failed to load revocation cache: {}", e);
            process::exit(1);
        }
    };

    let coordinator = Arc::new(
        RefreshCoordinator::new(cache, inventory).with_concurrency(config.fetch.sweep_concurrency),
    );
    let scheduler = RefreshScheduler::from_config(coordinator, &config.fetch);

    if cli.once {
        let report = scheduler.run_once().await;
        for failure in &report.failures {
            error!(subject = %failure.subject, "{}", failure.error);
        }
        match diagnostics.snapshot().to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to render diagnostics: {}", e),
        }
        process::exit(if report.succeeded() { 0 } else { 2 });
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // Keep the sender alive so the scheduler keeps running
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    info!("Press Ctrl+C to stop");
    scheduler.run(shutdown_rx).await;
}
