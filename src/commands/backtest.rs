use crate::config::{parse_settings, EnvironmentConfig, Instrument};
use crate::data_loader::{self, DataSplit};
use crate::models::{EquityPoint, TradeRecord};
use crate::performance::{EpisodePerformance, PerformanceCalculator};
use crate::policy::{Policy, PolicyKind};
use crate::price_series::PriceSeries;
use crate::report::{self, RunSummary};
use crate::vec_env::VecEnvironment;
use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct BacktestOptions {
    pub data: PathBuf,
    pub instrument: Option<Instrument>,
    pub config: Option<PathBuf>,
    pub overrides: Vec<String>,
    pub split: DataSplit,
    pub split_at: Option<String>,
    pub resample_hourly: bool,
    pub policy: PolicyKind,
    pub seed: u64,
    pub envs: usize,
    pub output: PathBuf,
}

pub fn run(options: &BacktestOptions) -> Result<Vec<EpisodePerformance>> {
    if options.envs == 0 {
        return Err(anyhow!("--envs must be at least 1"));
    }

    let config = resolve_config(options)?;
    let symbol = config.instrument.symbol.clone();
    let series = load_series(options, &symbol)?;
    let cutover = data_loader::parse_split_at(options.split_at.as_deref())?;
    let series = data_loader::split_series(&series, options.split, cutover)?;

    info!(
        "Backtesting {} on {} bars ({} to {}), split {:?}, policy {:?}, {} environment(s)",
        symbol,
        series.len(),
        series.first_timestamp().to_rfc3339(),
        series.last_timestamp().to_rfc3339(),
        options.split,
        options.policy,
        options.envs
    );

    let mut vec_env = VecEnvironment::replicate(&series, &config, options.envs, false)?;
    let mut policies: Vec<Box<dyn Policy>> = (0..options.envs)
        .map(|idx| options.policy.build(options.seed, idx))
        .collect();

    let steps_per_episode = series.last_index() + 1 - config.window_size;
    let pb = ProgressBar::new((steps_per_episode * options.envs) as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    vec_env.run_episodes(&mut policies, |_| pb.inc(1))?;
    pb.finish_and_clear();

    let run_id = Uuid::new_v4().to_string();
    let run_dir = options
        .output
        .join(format!("{}-{}", symbol.to_ascii_lowercase(), run_id));

    let mut performances = Vec::with_capacity(vec_env.len());
    for (env_index, (env, policy)) in vec_env.envs().iter().zip(&policies).enumerate() {
        let performance = PerformanceCalculator::calculate_performance(
            env.trade_history(),
            env.ledger().starting_equity(),
            env.equity_curve(),
        );
        let env_dir = run_dir.join(format!("env-{}", env_index));
        let summary = RunSummary {
            run_id: run_id.clone(),
            symbol: &symbol,
            env_index,
            policy: policy.name(),
            bars: series.len(),
            start: series.first_timestamp(),
            end: series.last_timestamp(),
            config: &config,
            performance: &performance,
        };
        write_reports(&env_dir, env.trade_history(), env.equity_curve(), &summary)?;

        info!(
            "env {}: {} trades, win rate {:.1}%, net profit {:.6}, final equity {:.6}, max drawdown {:.6}",
            env_index,
            performance.total_trades,
            performance.win_rate * 100.0,
            performance.net_profit,
            performance.final_equity,
            performance.max_drawdown
        );
        performances.push(performance);
    }

    info!("Reports written to {}", run_dir.display());
    Ok(performances)
}

fn resolve_config(options: &BacktestOptions) -> Result<EnvironmentConfig> {
    let mut config = match (&options.config, options.instrument) {
        (Some(path), instrument) => {
            let config = EnvironmentConfig::from_file(path)?;
            if let Some(instrument) = instrument {
                if !config.instrument.symbol.eq_ignore_ascii_case(instrument.symbol()) {
                    warn!(
                        "Config file instrument {} overrides --instrument {}",
                        config.instrument.symbol,
                        instrument.symbol()
                    );
                }
            }
            config
        }
        (None, Some(instrument)) => instrument.environment_config(),
        (None, None) => return Err(anyhow!("Either --instrument or --config is required")),
    };

    if !options.overrides.is_empty() {
        let settings = parse_settings(&options.overrides)?;
        config
            .apply_overrides(&settings)
            .context("Invalid --set override")?;
    }
    Ok(config)
}

fn load_series(options: &BacktestOptions, symbol: &str) -> Result<PriceSeries> {
    let is_snapshot = options
        .data
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("bin"));

    if is_snapshot {
        if options.resample_hourly {
            warn!("--resample-hourly is ignored for snapshot input");
        }
        let series = PriceSeries::load_from_file(&options.data)?;
        if !series.symbol().eq_ignore_ascii_case(symbol) {
            warn!(
                "Snapshot symbol {} differs from configured instrument {}",
                series.symbol(),
                symbol
            );
        }
        return Ok(series);
    }

    data_loader::load_price_series(&options.data, symbol, options.resample_hourly)
}

fn write_reports(
    env_dir: &Path,
    trades: &[TradeRecord],
    equity_curve: &[EquityPoint],
    summary: &RunSummary<'_>,
) -> Result<()> {
    report::write_trade_history_csv(&env_dir.join("trades.csv"), trades)?;
    report::write_equity_csv(&env_dir.join("equity.csv"), equity_curve)?;
    report::write_summary_json(&env_dir.join("summary.json"), summary)?;
    Ok(())
}
