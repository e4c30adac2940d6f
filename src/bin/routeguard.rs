//! Operator CLI for routeguard fleet snapshots.
//!
//! Binary name: `routeguard`
//!
//! Reads a snapshot exported by a running process, prints breaker and health
//! state, and edits breaker state in place. Unknown backend ids exit non-zero.

use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use routeguard::circuit_breaker::{BreakerSnapshot, BreakerStatus};
use routeguard::ops::FleetSnapshot;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Inspect and operate on a routeguard fleet snapshot.
#[derive(Debug, Parser)]
#[command(name = "routeguard", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Snapshot file to operate on.
    #[arg(long, env = "ROUTEGUARD_SNAPSHOT", global = true, default_value = "routeguard-snapshot.json")]
    snapshot: PathBuf,

    /// Output machine-readable JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    /// Detailed output (-v for verbose, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Circuit breaker operations.
    Breaker {
        #[command(subcommand)]
        action: BreakerAction,
    },

    /// Backend listings.
    Backends {
        #[command(subcommand)]
        action: BackendsAction,
    },
}

#[derive(Debug, Subcommand)]
enum BreakerAction {
    /// Show one backend's breaker.
    Show {
        /// Backend id.
        id: String,
    },

    /// Force a breaker open.
    Open {
        /// Backend id.
        id: String,

        /// How long the breaker stays open.
        #[arg(long, default_value_t = 30_000)]
        cool_down_ms: u64,
    },

    /// Force a breaker closed.
    Close {
        /// Backend id.
        id: String,
    },
}

#[derive(Debug, Subcommand)]
enum BackendsAction {
    /// List every backend with health and breaker status.
    #[command(alias = "ls")]
    List,

    /// List backends outside their health window.
    Unhealthy,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info,routeguard=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output = run(&cli).await?;
    println!("{output}");
    Ok(())
}

async fn run(cli: &Cli) -> anyhow::Result<String> {
    let mut snapshot = FleetSnapshot::load(&cli.snapshot)
        .await
        .with_context(|| format!("cannot open snapshot {}", cli.snapshot.display()))?;

    match &cli.command {
        Commands::Breaker { action } => match action {
            BreakerAction::Show { id } => {
                let breaker = snapshot.breaker(id)?;
                render_breaker(breaker, cli.json)
            }
            BreakerAction::Open { id, cool_down_ms } => {
                let breaker = snapshot
                    .force_open(id, Duration::from_millis(*cool_down_ms))?
                    .clone();
                snapshot.save(&cli.snapshot).await?;
                render_breaker(&breaker, cli.json)
            }
            BreakerAction::Close { id } => {
                let breaker = snapshot.force_close(id)?.clone();
                snapshot.save(&cli.snapshot).await?;
                render_breaker(&breaker, cli.json)
            }
        },

        Commands::Backends { action } => match action {
            BackendsAction::List => render_backends(&snapshot, cli.json),
            BackendsAction::Unhealthy => {
                let ids = snapshot.unhealthy();
                if cli.json {
                    Ok(serde_json::to_string_pretty(&ids)?)
                } else if ids.is_empty() {
                    Ok("All backends healthy".to_string())
                } else {
                    Ok(ids.join("\n"))
                }
            }
        },
    }
}

fn render_breaker(breaker: &BreakerSnapshot, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(breaker)?);
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Field").fg(Color::White),
        Cell::new("Value").fg(Color::White),
    ]);

    let remaining = breaker
        .open_remaining_ms
        .map(|ms| format!("{ms} ms"))
        .unwrap_or_else(|| "-".to_string());

    table.add_row(vec![Cell::new("backend"), Cell::new(&breaker.backend_id).fg(Color::Cyan)]);
    table.add_row(vec![Cell::new("status"), status_cell(breaker.status)]);
    table.add_row(vec![
        Cell::new("consecutive failures"),
        Cell::new(breaker.consecutive_failures),
    ]);
    table.add_row(vec![Cell::new("open for"), Cell::new(remaining)]);
    table.add_row(vec![Cell::new("times opened"), Cell::new(breaker.metrics.times_opened)]);
    table.add_row(vec![Cell::new("rejected"), Cell::new(breaker.metrics.rejected_requests)]);

    Ok(table.to_string())
}

fn render_backends(snapshot: &FleetSnapshot, json: bool) -> anyhow::Result<String> {
    if json {
        let rows: Vec<_> = snapshot
            .backends
            .iter()
            .map(|backend| {
                serde_json::json!({
                    "backend": backend,
                    "health": snapshot.health_of(&backend.id),
                    "breaker": snapshot.breaker(&backend.id).ok(),
                })
            })
            .collect();
        return Ok(serde_json::to_string_pretty(&rows)?);
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Backend").fg(Color::White),
        Cell::new("Capabilities").fg(Color::White),
        Cell::new("Priority").fg(Color::White),
        Cell::new("Enabled").fg(Color::White),
        Cell::new("Healthy").fg(Color::White),
        Cell::new("Breaker").fg(Color::White),
    ]);

    for backend in &snapshot.backends {
        let healthy = snapshot
            .health_of(&backend.id)
            .is_some_and(|h| h.healthy);
        let status = snapshot
            .breaker(&backend.id)
            .map(|b| b.status)
            .unwrap_or(BreakerStatus::Closed);

        table.add_row(vec![
            Cell::new(&backend.id).fg(Color::Cyan),
            Cell::new(backend.capabilities.iter().cloned().collect::<Vec<_>>().join(", ")),
            Cell::new(backend.priority),
            Cell::new(if backend.enabled { "yes" } else { "no" }),
            Cell::new(if healthy { "yes" } else { "no" }).fg(if healthy { Color::Green } else { Color::Red }),
            status_cell(status),
        ]);
    }

    Ok(table.to_string())
}

fn status_cell(status: BreakerStatus) -> Cell {
    let color = match status {
        BreakerStatus::Closed => Color::Green,
        BreakerStatus::HalfOpen => Color::Yellow,
        BreakerStatus::Open => Color::Red,
    };
    Cell::new(status.name()).fg(color)
}

#[cfg(test)]
mod tests {
    use super::*;
    use routeguard::circuit_breaker::CircuitBreaker;
    use routeguard::registry::{Backend, BackendRegistry};
    use tempfile::TempDir;

    async fn write_snapshot(dir: &TempDir) -> PathBuf {
        let registry = BackendRegistry::new();
        registry.register(Backend::new("search-a").with_capability("search"));
        registry.register(Backend::new("search-b").with_capability("search"));
        registry.heartbeat("search-a").unwrap();

        let path = dir.path().join("fleet.json");
        FleetSnapshot::capture(&registry, &CircuitBreaker::with_defaults())
            .save(&path)
            .await
            .unwrap();
        path
    }

    fn cli(path: &std::path::Path, json: bool, args: &[&str]) -> Cli {
        let mut argv = vec!["routeguard", "--snapshot", path.to_str().unwrap()];
        if json {
            argv.push("--json");
        }
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[tokio::test]
    async fn test_open_persists_to_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = write_snapshot(&dir).await;

        let output = run(&cli(&path, true, &["breaker", "open", "search-a", "--cool-down-ms", "5000"]))
            .await
            .unwrap();
        let shown: BreakerSnapshot = serde_json::from_str(&output).unwrap();
        assert_eq!(shown.status, BreakerStatus::Open);

        let reloaded = FleetSnapshot::load(&path).await.unwrap();
        assert_eq!(reloaded.breaker("search-a").unwrap().open_remaining_ms, Some(5000));

        run(&cli(&path, false, &["breaker", "close", "search-a"])).await.unwrap();
        let reloaded = FleetSnapshot::load(&path).await.unwrap();
        assert_eq!(reloaded.breaker("search-a").unwrap().status, BreakerStatus::Closed);
    }

    #[tokio::test]
    async fn test_unknown_backend_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = write_snapshot(&dir).await;

        assert!(run(&cli(&path, false, &["breaker", "show", "nope"])).await.is_err());
        assert!(run(&cli(&path, false, &["breaker", "open", "nope"])).await.is_err());
    }

    #[tokio::test]
    async fn test_backend_listings() {
        let dir = TempDir::new().unwrap();
        let path = write_snapshot(&dir).await;

        let unhealthy = run(&cli(&path, true, &["backends", "unhealthy"])).await.unwrap();
        let ids: Vec<String> = serde_json::from_str(&unhealthy).unwrap();
        assert_eq!(ids, vec!["search-b"]);

        let table = run(&cli(&path, false, &["backends", "list"])).await.unwrap();
        assert!(table.contains("search-a"));
        assert!(table.contains("search-b"));
    }

    #[tokio::test]
    async fn test_missing_snapshot_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.json");
        assert!(run(&cli(&path, false, &["backends", "list"])).await.is_err());
    }
}
