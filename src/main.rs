//! MSU Link command line
//!
//! Hosts the notification receiver, inspects MSU packs against the type
//! catalog, and sends test notifications.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use msu_link::channel::{
    DiscoveryFile, EndpointResolver, NotificationReceiver, NotificationSender, ReceiverEvent,
    TrackPlayed,
};
use msu_link::connectors::{available_games, connector_for};
use msu_link::msu::{scan_pack, FileMap, MsuType, MsuTypeCatalog, PcmLoopOracle};
use msu_link::{AppConfig, AppPaths};

/// MSU Link - MSU pack tooling and track notifications
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the detected app location)
    #[arg(short, long, env = "MSU_LINK_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Host the notification receiver and print inbound events
    Listen,
    /// List the MSU types in the catalog
    Types,
    /// List the games with a memory connector
    Games,
    /// Report which MSU types a pack directory satisfies
    Classify {
        /// Pack directory containing `<name>-<n>.pcm` files
        dir: PathBuf,
        /// Also check loop requirements against PCM headers
        #[arg(long)]
        loops: bool,
    },
    /// Show how a pack's tracks map onto another MSU type
    Convert {
        dir: PathBuf,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// Send a TrackPlayed notification to the running receiver
    NotifyTrack {
        number: i32,
        #[arg(long, default_value = "Test Pack")]
        pack: String,
        #[arg(long, default_value = "Test Song")]
        song: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let paths = AppPaths::detect();
    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());
    let config = AppConfig::load_or_default(&config_path).await?;

    let level = args
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    let _guard = init_logging(&level, &paths)?;

    info!("Starting MSU Link v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", config_path.display());

    let discovery_file = config
        .discovery_file
        .clone()
        .unwrap_or_else(|| paths.discovery_file.clone());

    match args.command {
        Command::Listen => listen(&config, discovery_file).await,
        Command::Types => list_types(&config),
        Command::Games => {
            list_games();
            Ok(())
        }
        Command::Classify { dir, loops } => classify(&config, &dir, loops),
        Command::Convert { dir, from, to } => convert(&config, &dir, &from, &to),
        Command::NotifyTrack { number, pack, song } => {
            notify_track(&config, discovery_file, number, pack, song).await
        }
    }
}

async fn listen(config: &AppConfig, discovery_file: PathBuf) -> Result<()> {
    let resolver: Arc<dyn EndpointResolver> = Arc::new(DiscoveryFile::new(discovery_file));
    let receiver = NotificationReceiver::new(resolver, config.receiver.shutdown_timeout());

    receiver.subscribe(Arc::new(|event: &ReceiverEvent| {
        let time = Local::now().format("%H:%M:%S%.3f");
        match event {
            ReceiverEvent::TrackChanged(track) => println!(
                "{} {} #{} {} - {} ({})",
                time.to_string().dimmed(),
                "TRACK".green().bold(),
                track.track_number,
                track.track_name.bright_white(),
                track.song_name,
                track.pack_name.cyan()
            ),
            ReceiverEvent::MsuGenerated(pack) => println!(
                "{} {} {} [{}] → {}",
                time.to_string().dimmed(),
                "PACK".yellow().bold(),
                pack.pack_name.bright_white(),
                pack.pack_type_name.cyan(),
                pack.pack_path
            ),
        }
        Ok(())
    }));

    let addr = receiver.initialize().await?;
    println!("{} http://{}", "Listening on".bold(), addr);

    shutdown_signal().await;
    receiver.dispose();
    // Give the background teardown its window before the runtime exits
    let drain = config.receiver.shutdown_timeout();
    tokio::time::sleep(drain.min(std::time::Duration::from_millis(500))).await;

    info!("MSU Link shutdown complete");
    Ok(())
}

fn load_catalog(config: &AppConfig) -> Result<MsuTypeCatalog> {
    MsuTypeCatalog::load(&config.msu_types)
        .with_context(|| format!("Failed to load MSU types from {}", config.msu_types.display()))
}

fn list_types(config: &AppConfig) -> Result<()> {
    let catalog = load_catalog(config)?;

    println!("\n{}", "=== MSU Types ===".bold().cyan());
    println!("  Total types: {}", catalog.len().to_string().green());
    for msu_type in catalog.iter() {
        println!();
        for line in describe_type(msu_type) {
            println!("{}", line);
        }
    }
    Ok(())
}

/// Report lines for one catalog entry
fn describe_type(msu_type: &MsuType) -> Vec<String> {
    let mut lines = vec![format!(
        "  {} ({}-{} tracks)",
        msu_type.name.bright_white(),
        msu_type.min_track_count,
        msu_type.max_track_count
    )];
    if !msu_type.required_tracks.is_empty() {
        lines.push(format!("    Required: {:?}", msu_type.required_tracks));
    }
    for conversion in msu_type.conversions() {
        lines.push(format!("    Converts to: {}", conversion.target_type_name.yellow()));
    }
    lines
}

fn list_games() {
    println!("\n{}", "=== Games ===".bold().cyan());
    for game in available_games() {
        let Some(connector) = connector_for(game) else {
            continue;
        };
        println!("\n  {}", game.bright_white());
        for request in connector.memory_requests() {
            let frequency = request
                .frequency
                .map(|f| format!("{:?}", f))
                .unwrap_or_else(|| "fastest".to_string());
            println!(
                "    0x{:06X} {:?} every {} ({:?})",
                request.read.address, request.read.domain, frequency, request.condition
            );
        }
    }
}

fn classify(config: &AppConfig, dir: &Path, loops: bool) -> Result<()> {
    let catalog = load_catalog(config)?;
    let files = scan_pack(dir)?;
    println!(
        "\n{} {} ({} tracks)",
        "Pack:".bold(),
        dir.display(),
        files.len().to_string().green()
    );

    let matches = catalog.matching(&files);
    if matches.is_empty() {
        println!("  {}", "No matching MSU types".red());
        return Ok(());
    }

    for msu_type in matches {
        if loops && !msu_type.matches_on_pcm_loops(&files, &PcmLoopOracle) {
            println!("  {} {}", "~".yellow(), msu_type.name);
            continue;
        }
        println!("  {} {}", "✓".green(), msu_type.name.bright_white());
    }
    Ok(())
}

fn convert(config: &AppConfig, dir: &Path, from: &str, to: &str) -> Result<()> {
    let catalog = load_catalog(config)?;
    let files = scan_pack(dir)?;

    let Some(converted) = catalog.convert(&files, from, to) else {
        anyhow::bail!("No conversion from '{}' to '{}'", from, to);
    };

    print_file_map(&converted);
    if let Some(target) = catalog.get(to) {
        if !target.matches(&converted) {
            warn!("Converted pack does not satisfy '{}'", to);
        }
    }
    Ok(())
}

fn print_file_map(files: &FileMap) {
    for (track, path) in files {
        println!("  {:>4} ← {}", track.to_string().green(), path.display());
    }
}

async fn notify_track(
    config: &AppConfig,
    discovery_file: PathBuf,
    number: i32,
    pack: String,
    song: String,
) -> Result<()> {
    let resolver: Arc<dyn EndpointResolver> = Arc::new(DiscoveryFile::new(discovery_file));
    if resolver.resolve().await.is_none() {
        println!("{}", "No receiver is running".yellow());
        return Ok(());
    }

    let sender = NotificationSender::with_timeout(resolver, config.sender.request_timeout());
    sender
        .track_played(&TrackPlayed {
            track_name: format!("Track {}", number),
            track_number: number,
            song_name: song,
            album_name: None,
            artist_name: None,
            url: None,
            pack_name: pack,
            pack_creator: None,
        })
        .await;
    println!("{} #{}", "Sent".green(), number);
    Ok(())
}

/// Console plus daily rolling file output. The returned guard flushes the
/// file writer on drop.
fn init_logging(level: &str, paths: &AppPaths) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match paths.ensure_directories() {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&paths.logs_dir, "msu-link.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("[logging] File logging disabled: {}", e);
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
