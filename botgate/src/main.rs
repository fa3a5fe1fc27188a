// botgate/src/main.rs
//
// Botgate — wave-scheduled bot detection engine
//
// Two operational modes over captured fingerprint JSONL:
//   tail    — follow a live fingerprint log (staging behind a proxy tap)
//   replay  — replay a captured log at a fixed cadence (testing/research)
//
// Usage:
//   botgate --mode tail --path /var/log/edge/fingerprints.jsonl
//   botgate --mode replay --path captured.jsonl --interval-ms 20

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use botgate::{AggregatedEvidence, Engine, EngineConfig, RequestFingerprint, RiskBand};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "botgate",
    about   = "Wave-scheduled bot detection engine",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[arg(long, value_enum, default_value = "tail")]
    mode: Mode,

    #[arg(long, default_value = "/tmp/botgate_fingerprints.jsonl",
          help = "Fingerprint JSONL path")]
    path: PathBuf,

    #[arg(long, default_value = "50", help = "Replay cadence in milliseconds")]
    interval_ms: u64,

    #[arg(long, help = "Configuration file (botgate.{toml,yaml,json})")]
    config: Option<String>,
}

#[derive(Clone, ValueEnum)]
enum Mode {
    Tail,   // follow a live JSONL log
    Replay, // replay a static JSONL file at fixed cadence
}

// ── Terminal output ───────────────────────────────────────────────────────────

fn print_banner() {
    println!("\x1b[1m");
    println!("  ██████╗  ██████╗ ████████╗ ██████╗  █████╗ ████████╗███████╗");
    println!("  ██╔══██╗██╔═══██╗╚══██╔══╝██╔════╝ ██╔══██╗╚══██╔══╝██╔════╝");
    println!("  ██████╔╝██║   ██║   ██║   ██║  ███╗███████║   ██║   █████╗  ");
    println!("  ██╔══██╗██║   ██║   ██║   ██║   ██║██╔══██║   ██║   ██╔══╝  ");
    println!("  ██████╔╝╚██████╔╝   ██║   ╚██████╔╝██║  ██║   ██║   ███████╗");
    println!("  ╚═════╝  ╚═════╝    ╚═╝    ╚═════╝ ╚═╝  ╚═╝   ╚═╝   ╚══════╝");
    println!("\x1b[0m");
    println!("  \x1b[90mWave-scheduled bot detection | per-request verdicts in <150ms\x1b[0m\n");
}

fn print_verdict(evidence: &AggregatedEvidence) {
    let (color, icon) = match evidence.risk_band {
        RiskBand::VeryHigh => ("\x1b[91;1m", "🔴"),
        RiskBand::High => ("\x1b[93;1m", "🟡"),
        RiskBand::Medium | RiskBand::Elevated => ("\x1b[96m", "🔵"),
        RiskBand::Low | RiskBand::VeryLow => ("\x1b[92m", "🟢"),
    };
    let reset = "\x1b[0m";
    let kind = evidence
        .bot_type
        .map(|t| t.to_string())
        .unwrap_or_else(|| "-".into());
    let top: Vec<String> = evidence
        .contributions
        .iter()
        .filter(|c| c.weighted_score.abs() > 0.1)
        .take(3)
        .map(|c| format!("{}:{:+.2}", c.detector, c.weighted_score))
        .collect();

    println!(
        "{}{} {} p={:.2} conf={:.2} band={} type={} → {}{}",
        color,
        icon,
        &evidence.primary_signature[..12],
        evidence.bot_probability,
        evidence.confidence,
        evidence.risk_band,
        kind,
        evidence.recommended_action,
        reset,
    );
    if !top.is_empty() {
        println!("    \x1b[90m{}\x1b[0m", top.join("  "));
    }
}

async fn print_stats_loop(engine: Arc<Engine>, processed: Arc<AtomicU64>, start: Instant) {
    loop {
        tokio::time::sleep(tokio::time::Duration::from_secs(30)).await;
        let elapsed = start.elapsed().as_secs_f64();
        let n = processed.load(Ordering::Relaxed);
        println!(
            "\n\x1b[1m── stats  uptime={:.0}s  requests={}  rps={:.1}  signatures={}  clusters={} ──\x1b[0m",
            elapsed,
            n,
            n as f64 / elapsed,
            engine.shared().windows.n_signatures(),
            engine.shared().clusters.n_clusters(),
        );
    }
}

// ── Fingerprint sources ───────────────────────────────────────────────────────

async fn tail_jsonl(path: PathBuf, tx: mpsc::Sender<RequestFingerprint>, seek_end: bool) -> Result<()> {
    let file = tokio::fs::File::open(&path).await?;
    let mut lines = BufReader::new(file).lines();

    if seek_end {
        while lines.next_line().await?.is_some() {} // consume existing
    }

    info!("tailing {}", path.display());
    loop {
        match lines.next_line().await? {
            Some(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<RequestFingerprint>(line) {
                    Ok(fp) => {
                        if tx.send(fp).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("parse error: {e}"),
                }
            }
            None => tokio::time::sleep(tokio::time::Duration::from_millis(50)).await,
        }
    }
    Ok(())
}

async fn replay_jsonl(path: PathBuf, tx: mpsc::Sender<RequestFingerprint>, interval_ms: u64) -> Result<()> {
    let content = tokio::fs::read_to_string(&path).await?;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RequestFingerprint>(line) {
            Ok(fp) => {
                if tx.send(fp).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!("parse error: {e}"),
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(interval_ms)).await;
    }
    Ok(())
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("botgate=info".parse()?))
        .compact()
        .init();

    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => EngineConfig::load_from(Some(path))?,
        None => EngineConfig::load()?,
    };
    let engine = Arc::new(Engine::new(config)?);
    engine.initialise().await;

    let start = Instant::now();
    let processed = Arc::new(AtomicU64::new(0));
    let (tx, mut rx) = mpsc::channel::<RequestFingerprint>(16384);

    print_banner();

    tokio::spawn(print_stats_loop(Arc::clone(&engine), Arc::clone(&processed), start));
    tokio::spawn(Arc::clone(&engine.shared().windows).housekeeping_loop());

    match cli.mode {
        Mode::Tail => {
            println!("  Mode: \x1b[96mTAIL\x1b[0m  |  {}\n", cli.path.display());
            let path = cli.path.clone();
            tokio::spawn(async move {
                tail_jsonl(path, tx, true).await.ok();
            });
        }
        Mode::Replay => {
            println!(
                "  Mode: \x1b[93mREPLAY\x1b[0m  |  {}  every {}ms\n",
                cli.path.display(),
                cli.interval_ms
            );
            let path = cli.path.clone();
            let interval = cli.interval_ms;
            tokio::spawn(async move {
                replay_jsonl(path, tx, interval).await.ok();
            });
        }
    }

    println!("  Press Ctrl+C to stop.\n");

    // One task per request, mirroring the host's dispatch concurrency.
    while let Some(fingerprint) = rx.recv().await {
        let engine = Arc::clone(&engine);
        let processed = Arc::clone(&processed);
        tokio::spawn(async move {
            let evidence = engine.evaluate(fingerprint).await;
            processed.fetch_add(1, Ordering::Relaxed);
            print_verdict(&evidence);
        });
    }

    Ok(())
}
