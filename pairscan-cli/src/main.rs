//! PairScan CLI — scan and replay commands.
//!
//! Commands:
//! - `scan` — load per-pair CSV bars, run the full pipeline across the
//!   watchlist, print one JSON record per pair
//! - `replay` — run the pipeline at a cut point in one pair's history,
//!   then drive the resulting position through the remaining bars and
//!   print its event stream

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pairscan_core::config::EngineConfig;
use pairscan_core::domain::{
    AccountState, Bar, BarSeries, Direction, FundamentalBias, Pair, Timeframe,
};
use pairscan_core::engine::{CollectingSink, PairData, PositionMonitor, ScanEngine};
use pairscan_core::position::PositionState;
use pairscan_core::risk::SizedPlan;
use pairscan_core::signal::SignalOutcome;

#[derive(Parser)]
#[command(name = "pairscan", about = "PairScan CLI — forex setup screener")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a watchlist of pairs and print one JSON record per pair.
    Scan {
        /// Pairs to scan (e.g. GBP/USD EUR/USD). Falls back to the
        /// config's `pairs` list when omitted.
        pairs: Vec<String>,

        /// Directory holding <PAIR>_<TF>.csv files (e.g. GBPUSD_H4.csv).
        #[arg(long, default_value = "data")]
        bars_dir: PathBuf,

        /// Engine config TOML. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Account balance used for sizing.
        #[arg(long, default_value_t = 10_000.0)]
        balance: f64,

        /// JSON array of fundamental bias records.
        #[arg(long)]
        bias_file: Option<PathBuf>,
    },
    /// Replay one pair: evaluate at a cut point, then run the plan through
    /// the remaining bars.
    Replay {
        /// Pair symbol (e.g. GBP/USD).
        #[arg(long)]
        pair: String,

        /// CSV of execution-timeframe (M15) bars. H1/H4 are resampled.
        #[arg(long)]
        bars: PathBuf,

        /// Engine config TOML. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Account balance used for sizing.
        #[arg(long, default_value_t = 10_000.0)]
        balance: f64,

        /// Evaluation instant (RFC 3339). Defaults to 3/4 through the file.
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        /// Fundamental bias as direction:confidence (e.g. long:0.8).
        #[arg(long)]
        bias: Option<String>,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            pairs,
            bars_dir,
            config,
            balance,
            bias_file,
        } => run_scan(pairs, &bars_dir, config.as_deref(), balance, bias_file.as_deref()),
        Commands::Replay {
            pair,
            bars,
            config,
            balance,
            from,
            bias,
        } => run_replay(&pair, &bars, config.as_deref(), balance, from, bias.as_deref()),
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

// ── CSV ingestion ────────────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
struct BarRecord {
    timestamp: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

impl From<BarRecord> for Bar {
    fn from(r: BarRecord) -> Self {
        Bar {
            timestamp: r.timestamp,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume,
        }
    }
}

fn load_bars(path: &Path) -> Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut bars = Vec::new();
    for record in reader.deserialize() {
        let record: BarRecord = record.with_context(|| format!("parsing {}", path.display()))?;
        bars.push(Bar::from(record));
    }
    Ok(bars)
}

fn load_series(path: &Path) -> Result<BarSeries> {
    let bars = load_bars(path)?;
    BarSeries::from_bars(bars).with_context(|| format!("validating {}", path.display()))
}

fn bars_path(dir: &Path, pair: &Pair, timeframe: Timeframe) -> PathBuf {
    let stem = pair.as_str().replace('/', "");
    dir.join(format!("{stem}_{timeframe}.csv"))
}

// ── scan ─────────────────────────────────────────────────────────────

#[derive(serde::Serialize)]
struct ScanRecord<'a> {
    pair: &'a str,
    outcome: &'a SignalOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<&'a SizedPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejection: Option<String>,
}

fn run_scan(
    pairs: Vec<String>,
    bars_dir: &Path,
    config: Option<&Path>,
    balance: f64,
    bias_file: Option<&Path>,
) -> Result<()> {
    let config = load_config(config)?;
    let pairs: Vec<Pair> = if pairs.is_empty() {
        config.pairs.clone()
    } else {
        pairs.iter().map(|s| Pair::new(s.as_str())).collect()
    };
    if pairs.is_empty() {
        bail!("no pairs given on the command line or in the config");
    }
    let engine = ScanEngine::new(config);
    let account = AccountState {
        balance,
        currency: "USD".to_string(),
    };
    let biases = load_biases(bias_file)?;
    let now = Utc::now();

    let mut data = Vec::new();
    for pair in &pairs {
        let pair = pair.clone();
        data.push(PairData {
            primary: load_series(&bars_path(bars_dir, &pair, Timeframe::H4))?,
            confirmation: load_series(&bars_path(bars_dir, &pair, Timeframe::H1))?,
            execution: load_series(&bars_path(bars_dir, &pair, Timeframe::M15))?,
            bias: biases.get(&pair).cloned(),
            pair,
        });
    }

    let mut failures = 0;
    for (pair, result) in engine.scan(&data, &account, now) {
        match result {
            Ok(evaluation) => {
                let record = ScanRecord {
                    pair: pair.as_str(),
                    outcome: &evaluation.outcome,
                    plan: evaluation.plan.as_ref(),
                    rejection: evaluation.rejection.as_ref().map(|r| r.to_string()),
                };
                println!("{}", serde_json::to_string(&record)?);
            }
            Err(err) => {
                tracing::error!(%pair, %err, "evaluation failed");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("{failures} of {} pairs failed to evaluate", pairs.len());
    }
    Ok(())
}

fn load_biases(path: Option<&Path>) -> Result<HashMap<Pair, FundamentalBias>> {
    let Some(path) = path else {
        return Ok(HashMap::new());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let records: Vec<FundamentalBias> = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(records
        .into_iter()
        .map(|bias| (bias.pair.clone(), bias))
        .collect())
}

// ── replay ───────────────────────────────────────────────────────────

fn run_replay(
    symbol: &str,
    bars_file: &Path,
    config: Option<&Path>,
    balance: f64,
    from: Option<DateTime<Utc>>,
    bias: Option<&str>,
) -> Result<()> {
    let config = load_config(config)?;
    let pair = Pair::new(symbol);
    let bars = load_bars(bars_file)?;
    if bars.len() < 4 {
        bail!("{} holds too few bars to replay", bars_file.display());
    }

    let cut_at = from.unwrap_or_else(|| bars[bars.len() * 3 / 4].timestamp);
    let cut = bars.partition_point(|b| b.timestamp <= cut_at);
    let (history, future) = bars.split_at(cut);
    if history.is_empty() || future.is_empty() {
        bail!("cut point {cut_at} leaves nothing to evaluate or replay");
    }

    let execution = BarSeries::from_bars(history.to_vec())?;
    let data = PairData {
        pair: pair.clone(),
        primary: resample(history, Timeframe::H4)?,
        confirmation: resample(history, Timeframe::H1)?,
        execution,
        bias: bias
            .map(|spec| parse_bias(&pair, spec, cut_at))
            .transpose()?,
    };
    let account = AccountState {
        balance,
        currency: "USD".to_string(),
    };

    let engine = ScanEngine::new(config);
    let evaluation = engine.evaluate_pair(&data, &account, cut_at)?;
    println!("{}", serde_json::to_string(&evaluation.outcome)?);

    let Some(plan) = evaluation.plan else {
        if let Some(rejection) = evaluation.rejection {
            tracing::info!(%rejection, "signal did not size");
        }
        return Ok(());
    };
    println!("{}", serde_json::to_string(&plan)?);

    let direction = plan.direction;
    let mut monitor = PositionMonitor::new(
        engine.config().position.clone(),
        engine.config().risk.lot_step,
        CollectingSink::new(),
    );
    let id = monitor.open(plan, cut_at);
    monitor
        .confirm(id, future[0].open, future[0].timestamp)
        .map_err(|e| anyhow::anyhow!("confirm failed: {e}"))?;

    for bar in future {
        if monitor.live_positions().count() == 0 {
            break;
        }
        // Adverse extreme first: a bar that spans both the stop and a
        // target resolves against the position.
        let (first, second) = match direction {
            Direction::Long => (bar.low, bar.high),
            Direction::Short => (bar.high, bar.low),
        };
        monitor.on_price(&pair, bar.open, bar.timestamp);
        monitor.on_price(&pair, first, bar.timestamp);
        monitor.on_price(&pair, second, bar.timestamp);
        monitor.on_price(&pair, bar.close, bar.timestamp);
        monitor.on_bar_close(&pair, bar.clone());

        for event in monitor.sink().take() {
            println!("{}", serde_json::to_string(&event)?);
        }
    }

    if let Some(position) = monitor.position(id) {
        if !position.is_terminal() {
            tracing::info!(
                state = ?position.state,
                remaining_lots = position.remaining_lots,
                "replay ended with the position still live"
            );
        } else if position.state == PositionState::Cancelled {
            tracing::info!("order was never filled");
        }
    }
    for event in monitor.sink().take() {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

fn parse_bias(pair: &Pair, spec: &str, at: DateTime<Utc>) -> Result<FundamentalBias> {
    let (direction, confidence) = spec
        .split_once(':')
        .context("bias must be direction:confidence, e.g. long:0.8")?;
    let direction = match direction {
        "long" => Direction::Long,
        "short" => Direction::Short,
        other => bail!("unknown bias direction {other:?}"),
    };
    let confidence: f64 = confidence.parse().context("bias confidence")?;
    Ok(FundamentalBias::new(pair.clone(), direction, confidence, at))
}

/// Aggregate execution bars into a higher timeframe by bucketing
/// timestamps. Partial trailing buckets are kept; the pipeline only reads
/// closes and ranges, and the final bucket matches the evaluation instant.
fn resample(bars: &[Bar], timeframe: Timeframe) -> Result<BarSeries> {
    let step = i64::from(timeframe.minutes()) * 60;
    let mut out: Vec<Bar> = Vec::new();
    for bar in bars {
        let secs = bar.timestamp.timestamp();
        let bucket = DateTime::from_timestamp(secs - secs.rem_euclid(step), 0)
            .context("bucket timestamp out of range")?;
        match out.last_mut() {
            Some(last) if last.timestamp == bucket => {
                last.high = last.high.max(bar.high);
                last.low = last.low.min(bar.low);
                last.close = bar.close;
                last.volume += bar.volume;
            }
            _ => out.push(Bar {
                timestamp: bucket,
                ..bar.clone()
            }),
        }
    }
    Ok(BarSeries::from_bars(out)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn m15_bars(n: usize) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let close = 1.2700 + 0.0001 * i as f64;
                Bar {
                    timestamp: t0 + chrono::Duration::minutes(15 * i as i64),
                    open: close - 0.0001,
                    high: close + 0.0002,
                    low: close - 0.0003,
                    close,
                    volume: 10.0,
                }
            })
            .collect()
    }

    #[test]
    fn resample_m15_to_h1_merges_four_bars() {
        let bars = m15_bars(8);
        let h1 = resample(&bars, Timeframe::H1).unwrap();
        assert_eq!(h1.len(), 2);
        let first = &h1.bars()[0];
        assert_eq!(first.open, bars[0].open);
        assert_eq!(first.close, bars[3].close);
        assert_eq!(first.high, bars[3].high);
        assert_eq!(first.low, bars[0].low);
        assert_eq!(first.volume, 40.0);
    }

    #[test]
    fn resample_keeps_a_partial_trailing_bucket() {
        let bars = m15_bars(6);
        let h1 = resample(&bars, Timeframe::H1).unwrap();
        assert_eq!(h1.len(), 2);
        assert_eq!(h1.bars()[1].close, bars[5].close);
    }

    #[test]
    fn bias_spec_parses() {
        let pair = Pair::new("GBP/USD");
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let bias = parse_bias(&pair, "long:0.8", at).unwrap();
        assert_eq!(bias.direction, Direction::Long);
        assert_eq!(bias.confidence, 0.8);
        assert!(parse_bias(&pair, "sideways:0.5", at).is_err());
    }

    #[test]
    fn bars_path_strips_the_slash() {
        let pair = Pair::new("GBP/USD");
        let path = bars_path(Path::new("data"), &pair, Timeframe::H4);
        assert_eq!(path, PathBuf::from("data/GBPUSD_H4.csv"));
    }
}
