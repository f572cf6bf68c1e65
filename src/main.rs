// src/main.rs
//
// Thin harness around the dronepilot library.
// Connects to an already-running simulator, runs one or more sequential
// sessions and optionally writes the crash log summary.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use dronepilot::{
    build_policy, connect_and_run, Config, CrashLogSummary, EventSink, JsonlSink, NoopSink,
    PolicyKind, SessionOutcome, SessionReport,
};

/// Command-line arguments for the dronepilot binary.
#[derive(Parser, Debug)]
#[command(name = "dronepilot")]
struct Cli {
    /// Decision policy: rule | rl.
    #[arg(long)]
    policy: Option<String>,

    /// Simulator websocket URL.
    #[arg(long)]
    url: Option<String>,

    /// Number of sequential sessions.
    #[arg(long, default_value_t = 1)]
    runs: u32,

    /// Write the crash log summary (JSON) here after all runs.
    #[arg(long)]
    crash_log: Option<PathBuf>,

    /// Q-table file (rl policy).
    #[arg(long)]
    qtable: Option<PathBuf>,

    /// Exploration RNG seed (rl policy).
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    epsilon: Option<f64>,

    /// Pause after each command, in milliseconds.
    #[arg(long)]
    step_delay_ms: Option<u64>,

    /// Per-session deadline in milliseconds (0 disables).
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Optional JSONL path for the per-step log (overrides env).
    #[arg(long)]
    log_jsonl: Option<PathBuf>,
}

/// Defaults, then env overrides, then CLI overrides.
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut cfg = Config::from_env();

    if let Some(raw) = cli.policy.as_deref() {
        cfg.policy = PolicyKind::parse(raw)
            .ok_or_else(|| anyhow::anyhow!("unknown --policy {raw:?} (expected rule | rl)"))?;
    }
    if let Some(url) = cli.url.as_ref() {
        cfg.ws_url = url.clone();
    }
    if let Some(path) = cli.qtable.as_ref() {
        cfg.rl.qtable_path = path.clone();
    }
    if let Some(seed) = cli.seed {
        cfg.rl.seed = Some(seed);
    }
    if let Some(eps) = cli.epsilon {
        cfg.rl.epsilon = eps.clamp(0.0, 1.0);
    }
    if let Some(ms) = cli.step_delay_ms {
        cfg.step_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = cli.timeout_ms {
        cfg.session_timeout = (ms > 0).then(|| Duration::from_millis(ms));
    }

    Ok(cfg)
}

fn build_sink(log_jsonl: Option<&PathBuf>) -> Box<dyn EventSink> {
    let sink = match log_jsonl {
        Some(path) => JsonlSink::from_config(dronepilot::logging::StepLogConfig::jsonl(path)),
        None => JsonlSink::from_env(),
    };
    if sink.is_enabled() {
        Box::new(sink)
    } else {
        Box::new(NoopSink)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = build_config(&cli)?;
    eprintln!("{}", cfg.summary());

    let mut sink = build_sink(cli.log_jsonl.as_ref());
    let runs = cli.runs.max(1);
    let mut reports: Vec<SessionReport> = Vec::with_capacity(runs as usize);

    for run in 0..runs {
        if runs > 1 {
            eprintln!("--- Run {} ---", run + 1);
        }
        let mut policy = build_policy(&cfg);
        let report = connect_and_run(&cfg, policy.as_mut(), sink.as_mut()).await;
        eprintln!(
            "Iterations: {}, Distance: {:.2}, Reason: {}, Outcome: {}",
            report.local_iterations,
            report.final_distance,
            report.crash_reason,
            report.outcome.as_str()
        );
        reports.push(report);

        // Seeded exploration should differ between runs but stay reproducible.
        if let Some(seed) = cfg.rl.seed.as_mut() {
            *seed = seed.wrapping_add(1);
        }
    }

    let summary = CrashLogSummary::from_reports(&reports);
    if runs > 1 {
        eprintln!("{}", summary.render_averages());
    }
    if let Some(path) = cli.crash_log.as_ref() {
        summary.write_json(path)?;
        eprintln!(
            "INFO: crash log written path={} runs={}",
            path.display(),
            summary.runs()
        );
    }

    if reports
        .iter()
        .all(|r| matches!(r.outcome, SessionOutcome::Faulted(_)))
    {
        anyhow::bail!("every session faulted");
    }
    Ok(())
}
