//! LegalEase CLI
//!
//! Development host for the scanning engine. It reads UI tree snapshots
//! from JSON files instead of a live accessibility API.
//!
//! Usage from workspace root:
//!   cargo run --bin legalease -- scan screen.json            # One-shot scan
//!   cargo run --bin legalease -- watch screen.json           # Re-scan on every save

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use legalease::{
    spawn_ui_context, HandoffCoordinator, HeadlessSurface, KeywordCorpus, KeywordMatcher,
    Notification, OverlayWindowController, ScanResult, ScanSession, ScannerConfig,
    SnapshotEngine, TextTreeWalker, UINode, WalkConfig,
};
use notify::{RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "legalease")]
#[command(about = "Scan UI tree snapshots for terms of service and privacy policies")]
struct Cli {
    /// JSON config file; defaults plus LEGALEASE_* variables when omitted
    #[clap(long, env = "LEGALEASE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a snapshot once and print the result as JSON
    Scan(ScanArgs),
    /// Watch a snapshot file and run the full detection pipeline on changes
    Watch(WatchArgs),
}

#[derive(Parser, Debug)]
struct ScanArgs {
    /// Snapshot file (a UI node tree, optionally wrapped with a source label)
    snapshot: PathBuf,

    /// Maximum traversal depth
    #[clap(long)]
    max_depth: Option<usize>,
}

#[derive(Parser, Debug)]
struct WatchArgs {
    snapshot: PathBuf,

    /// Minimum time between two detections in milliseconds
    #[clap(long)]
    cooldown_ms: Option<u64>,

    /// Also poll the system clipboard
    #[clap(long)]
    clipboard: bool,
}

/// On-disk snapshot, either labelled or a bare tree
#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    Labelled {
        #[serde(rename = "sourceLabel")]
        source_label: String,
        root: UINode,
    },
    Bare(UINode),
}

fn load_snapshot(path: &Path) -> Result<(String, UINode)> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let snapshot: SnapshotFile = serde_json::from_str(&json)
        .with_context(|| format!("Invalid snapshot {}", path.display()))?;
    Ok(match snapshot {
        SnapshotFile::Labelled { source_label, root } => (source_label, root),
        SnapshotFile::Bare(root) => {
            let label = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "snapshot".to_string());
            (label, root)
        }
    })
}

fn load_config(path: Option<&Path>) -> Result<ScannerConfig> {
    match path {
        Some(path) => Ok(ScannerConfig::from_file(path)?),
        None => Ok(ScannerConfig::from_env()),
    }
}

fn scan(args: ScanArgs, mut config: ScannerConfig) -> Result<()> {
    if let Some(depth) = args.max_depth {
        config.max_depth = depth;
    }
    let (label, root) = load_snapshot(&args.snapshot)?;
    let matcher = KeywordMatcher::new(KeywordCorpus::default())?;
    let walker = TextTreeWalker::new(WalkConfig {
        max_depth: config.max_depth,
    });

    let (fragments, stats) = walker.walk(root.into_element());
    info!(
        elements = stats.elements_visited,
        truncated = stats.truncated,
        "Scanned {}",
        args.snapshot.display()
    );
    let result = ScanResult::build(fragments, &matcher, label, Instant::now());
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn watch(args: WatchArgs, mut config: ScannerConfig) -> Result<()> {
    if let Some(cooldown) = args.cooldown_ms {
        config.cooldown_ms = cooldown;
    }
    config.clipboard_enabled = args.clipboard;

    let engine = Arc::new(SnapshotEngine::new());
    let mut session = ScanSession::new(engine.clone(), config.clone())?;
    if args.clipboard {
        session = session.with_system_clipboard()?;
    }

    let controller = OverlayWindowController::new(
        Box::new(HeadlessSurface::new()),
        session.dispatcher().clone(),
        &config.overlay,
        config.preview_chars,
    );
    let handoff = HandoffCoordinator::from_config(&config, session.dispatcher().clone());
    let (overlay, ui_task) = spawn_ui_context(controller, Some(handoff));
    let (_subscription, mut events) = session.attach_overlay(overlay.clone());

    if !session.start_monitoring() {
        bail!("Scanning permission is not granted");
    }

    let (fs_tx, mut fs_rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let _ = fs_tx.send(res);
    })?;
    watcher
        .watch(&args.snapshot, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", args.snapshot.display()))?;

    let (label, root) = load_snapshot(&args.snapshot)?;
    engine.set_snapshot(label, root);
    info!("Watching {} (Ctrl+C to stop)", args.snapshot.display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            Some(res) = fs_rx.recv() => match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match load_snapshot(&args.snapshot) {
                        Ok((label, root)) => engine.set_snapshot(label, root),
                        Err(e) => warn!("Skipping reload: {:#}", e),
                    }
                }
                Ok(event) => debug!(kind = ?event.kind, "Ignoring file event"),
                Err(e) => warn!("File watch error: {}", e),
            },
            Some(notification) = events.recv() => {
                println!("{}", notification.to_json()?);
                if let Notification::Detection(_) = notification {
                    info!(mode = %overlay.mode().await?, "Overlay updated");
                }
            }
        }
    }

    session.stop_monitoring();
    overlay.shutdown();
    ui_task.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    legalease::utils::init_logging()?;
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan(args) => scan(args, config),
        Commands::Watch(args) => watch(args, config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_snapshot_is_labelled_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signup.json");
        std::fs::write(
            &path,
            r#"{"attributes":{"role":"window","title":"Privacy Policy"}}"#,
        )
        .unwrap();

        let (label, root) = load_snapshot(&path).unwrap();
        assert_eq!(label, "signup");
        assert_eq!(root.attributes.title.as_deref(), Some("Privacy Policy"));
    }

    #[test]
    fn labelled_snapshot_keeps_its_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screen.json");
        std::fs::write(
            &path,
            r#"{"sourceLabel":"com.example.app","root":{"attributes":{"role":"text","text":"EULA"}}}"#,
        )
        .unwrap();

        let (label, root) = load_snapshot(&path).unwrap();
        assert_eq!(label, "com.example.app");
        assert_eq!(root.attributes.value.as_deref(), Some("EULA"));
    }

    #[test]
    fn cli_parses_watch_flags() {
        let cli = Cli::parse_from(["legalease", "watch", "screen.json", "--cooldown-ms", "250"]);
        match cli.command {
            Commands::Watch(args) => {
                assert_eq!(args.cooldown_ms, Some(250));
                assert!(!args.clipboard);
            }
            Commands::Scan(_) => panic!("expected watch"),
        }
    }
}
