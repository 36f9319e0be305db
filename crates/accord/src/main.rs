use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use accord::http::{build_router, AppState};
use accord::{
    build_dispatcher, build_handler, load_templates, open_store, AccordConfig, ServerError,
    ServerResult,
};
use accord_core::ConsentError;
use accord_notify::CancelToken;

/// Accord: policy-consent service.
///
/// Serves signed consent links, records acceptances, and dispatches
/// notices to users on an outdated policy version.
#[derive(Parser, Debug)]
#[command(name = "accord", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = "accord.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the consent HTTP server
    Serve {
        /// Override the bind address
        #[arg(long)]
        bind: Option<String>,

        /// Override the port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run one notice dispatch pass over the outdated set
    Notify,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("accord=debug,accord_notify=debug,accord_store=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("accord=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> ServerResult<()> {
    let config = AccordConfig::load(&cli.config)?;
    config.validate()?;

    match cli.command {
        Commands::Serve { bind, port } => cmd_serve(config, bind, port).await,
        Commands::Notify => cmd_notify(config).await,
    }
}

async fn cmd_serve(
    mut config: AccordConfig,
    bind: Option<String>,
    port: Option<u16>,
) -> ServerResult<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let store = open_store(&config)?;
    let templater = load_templates(&config)?;
    let handler = build_handler(&config, store.clone(), templater.clone());
    let state = Arc::new(AppState {
        handler,
        policy_version: config.consent.version.clone(),
    });

    if let Some(interval_secs) = config.consent.notices.interval_secs {
        let dispatcher = Arc::new(build_dispatcher(&config, store, templater)?);
        info!(interval_secs, "notice dispatcher scheduled");
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let dispatcher = dispatcher.clone();
                let result =
                    tokio::task::spawn_blocking(move || dispatcher.dispatch(&CancelToken::new()))
                        .await;
                match result {
                    Ok(Ok(report)) => {
                        if report.outdated > 0 {
                            info!(
                                outdated = report.outdated,
                                notified = report.notified,
                                failures = report.failures.len(),
                                "notice dispatch pass complete"
                            );
                        }
                    }
                    Ok(Err(e)) => error!("notice dispatch pass failed: {e}"),
                    Err(e) => error!("notice dispatch task failed: {e}"),
                }
            }
        });
    }

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(ServerError::Io)?;
    info!(addr = %addr, policy_version = %config.consent.version, "consent server listening");
    axum::serve(listener, build_router(state))
        .await
        .map_err(ServerError::Io)?;
    Ok(())
}

async fn cmd_notify(config: AccordConfig) -> ServerResult<()> {
    let store = open_store(&config)?;
    let templater = load_templates(&config)?;
    let dispatcher = build_dispatcher(&config, store, templater)?;

    // Ctrl-C stops issuing new per-user work; the partial report still
    // comes back.
    let cancel = CancelToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    let report = tokio::task::spawn_blocking(move || dispatcher.dispatch(&cancel))
        .await
        .map_err(|e| ConsentError::Dispatch(format!("dispatch task failed: {e}")))??;

    println!("Outdated users:         {}", report.outdated);
    println!("Notified and recorded:  {}", report.notified);
    if !report.failures.is_empty() {
        println!("Per-user failures:      {}", report.failures.len());
        for failure in &report.failures {
            println!("  {} ({:?}): {}", failure.user, failure.stage, failure.error);
        }
    }
    if report.cancelled {
        println!("Dispatch cancelled before completion; counts are partial.");
    }
    Ok(())
}
