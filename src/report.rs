use crate::config::EnvironmentConfig;
use crate::models::{EquityPoint, TradeRecord};
use crate::performance::EpisodePerformance;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// One trade-history CSV row. Column names are consumed by downstream notebooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeHistoryRow {
    #[serde(rename = "Trade Number")]
    pub trade_number: usize,
    #[serde(rename = "EntryTime")]
    pub entry_time: String,
    #[serde(rename = "Entry Price")]
    pub entry_price: f64,
    #[serde(rename = "ExitTime")]
    pub exit_time: String,
    #[serde(rename = "Exit Price")]
    pub exit_price: f64,
    #[serde(rename = "Profit/Loss")]
    pub profit_loss: f64,
}

impl TradeHistoryRow {
    pub fn from_trade(trade_number: usize, trade: &TradeRecord) -> Self {
        Self {
            trade_number,
            entry_time: format_time(trade.entry_time),
            entry_price: trade.entry_price,
            exit_time: format_time(trade.exit_time),
            exit_price: trade.exit_price,
            profit_loss: trade.pnl,
        }
    }
}

#[derive(Debug, Serialize)]
struct EquityRow {
    timestamp: String,
    step_index: usize,
    equity: f64,
    unrealized_pnl: f64,
    mark_to_market: f64,
}

#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub run_id: String,
    pub symbol: &'a str,
    pub env_index: usize,
    pub policy: &'a str,
    pub bars: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub config: &'a EnvironmentConfig,
    pub performance: &'a EpisodePerformance,
}

fn format_time(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, false)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create report directory {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Trades are numbered from 1 in the order they closed.
pub fn write_trade_history_csv(path: &Path, trades: &[TradeRecord]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create trade history {}", path.display()))?;
    if trades.is_empty() {
        writer
            .write_record([
                "Trade Number",
                "EntryTime",
                "Entry Price",
                "ExitTime",
                "Exit Price",
                "Profit/Loss",
            ])
            .context("Failed to write trade history header")?;
    }
    for (idx, trade) in trades.iter().enumerate() {
        writer
            .serialize(TradeHistoryRow::from_trade(idx + 1, trade))
            .with_context(|| format!("Failed to write trade {}", idx + 1))?;
    }
    writer.flush().context("Failed to flush trade history")?;
    Ok(())
}

pub fn read_trade_history_csv(path: &Path) -> Result<Vec<TradeHistoryRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open trade history {}", path.display()))?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<TradeHistoryRow>, _>>()
        .with_context(|| format!("Failed to parse trade history {}", path.display()))
}

pub fn write_equity_csv(path: &Path, points: &[EquityPoint]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create equity curve {}", path.display()))?;
    if points.is_empty() {
        writer
            .write_record([
                "timestamp",
                "step_index",
                "equity",
                "unrealized_pnl",
                "mark_to_market",
            ])
            .context("Failed to write equity curve header")?;
    }
    for point in points {
        writer
            .serialize(EquityRow {
                timestamp: format_time(point.timestamp),
                step_index: point.step_index,
                equity: point.equity,
                unrealized_pnl: point.unrealized_pnl,
                mark_to_market: point.mark_to_market,
            })
            .context("Failed to write equity point")?;
    }
    writer.flush().context("Failed to flush equity curve")?;
    Ok(())
}

pub fn write_summary_json(path: &Path, summary: &RunSummary<'_>) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create run summary {}", path.display()))?;
    file.write_all(json.as_bytes())
        .with_context(|| format!("Failed to write run summary {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, ExitReason};
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn sample_trades() -> Vec<TradeRecord> {
        let entry_time = Utc.with_ymd_and_hms(2025, 2, 3, 4, 0, 0).unwrap();
        vec![
            TradeRecord {
                direction: Direction::Long,
                entry_time,
                entry_price: 1.0845,
                entry_step_index: 31,
                exit_time: entry_time + Duration::hours(3),
                exit_price: 1.0875,
                exit_step_index: 34,
                exit_reason: ExitReason::TakeProfit,
                pnl: 0.003,
            },
            TradeRecord {
                direction: Direction::Short,
                entry_time: entry_time + Duration::hours(5),
                entry_price: 1.0860,
                entry_step_index: 36,
                exit_time: entry_time + Duration::hours(6),
                exit_price: 1.0890,
                exit_step_index: 37,
                exit_reason: ExitReason::StopLoss,
                pnl: -0.003,
            },
        ]
    }

    #[test]
    fn test_trade_history_uses_fixed_columns() {
        let dir = std::env::temp_dir().join(format!("fxgym-report-{}", Uuid::new_v4()));
        let path = dir.join("trades.csv");
        write_trade_history_csv(&path, &sample_trades()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next(),
            Some("Trade Number,EntryTime,Entry Price,ExitTime,Exit Price,Profit/Loss")
        );
        assert_eq!(
            lines.next(),
            Some("1,2025-02-03T04:00:00+00:00,1.0845,2025-02-03T07:00:00+00:00,1.0875,0.003")
        );

        let rows = read_trade_history_csv(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].trade_number, 2);
        assert_eq!(rows[1].profit_loss, -0.003);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_empty_reports_still_have_headers() {
        let dir = std::env::temp_dir().join(format!("fxgym-report-{}", Uuid::new_v4()));
        let trades = dir.join("trades.csv");
        let equity = dir.join("equity.csv");
        write_trade_history_csv(&trades, &[]).unwrap();
        write_equity_csv(&equity, &[]).unwrap();

        assert!(read_trade_history_csv(&trades).unwrap().is_empty());
        let contents = fs::read_to_string(&equity).unwrap();
        assert!(contents.starts_with("timestamp,step_index,equity,unrealized_pnl,mark_to_market"));

        let _ = fs::remove_dir_all(&dir);
    }
}
