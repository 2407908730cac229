use crate::models::Bar;
use crate::price_series::PriceSeries;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use clap::ValueEnum;
use log::{info, warn};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Cut-over between the training and evaluation halves of a data set.
pub const DEFAULT_SPLIT_AT: &str = "2025-01-01T00:00:00+00:00";

const TIMESTAMP_COLUMNS: [&str; 6] = [
    "timestamp",
    "timestamp_utc",
    "time",
    "gmt time",
    "datetime",
    "date",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DataSplit {
    /// Bars strictly before the cut-over.
    Train,
    /// Bars at or after the cut-over.
    Test,
    All,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub rows_read: usize,
    /// Rows with an empty or NaN cell, dropped before anything else.
    pub incomplete_rows: usize,
    pub duplicates: usize,
    pub out_of_order: usize,
}

#[derive(Debug, Clone)]
pub struct LoadedBars {
    pub bars: Vec<Bar>,
    pub feature_names: Vec<String>,
    pub report: LoadReport,
}

struct ColumnLayout {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
    features: Vec<(usize, String)>,
}

impl ColumnLayout {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let normalized: Vec<String> = headers
            .iter()
            .map(|header| header.trim().to_ascii_lowercase())
            .collect();
        let find = |name: &str| normalized.iter().position(|header| header == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| anyhow!("CSV is missing the required {} column", name))
        };

        let timestamp = TIMESTAMP_COLUMNS
            .iter()
            .find_map(|name| find(*name))
            .ok_or_else(|| {
                anyhow!(
                    "CSV has no timestamp column (expected one of {})",
                    TIMESTAMP_COLUMNS.join(", ")
                )
            })?;
        let open = require("open")?;
        let high = require("high")?;
        let low = require("low")?;
        let close = require("close")?;
        let volume = find("volume");

        let reserved = [Some(timestamp), Some(open), Some(high), Some(low), Some(close), volume];
        let features = headers
            .iter()
            .enumerate()
            .filter(|(idx, _)| !reserved.contains(&Some(*idx)))
            .filter(|(_, header)| {
                let header = header.trim();
                !header.is_empty() && !header.starts_with("Unnamed")
            })
            .map(|(idx, header)| (idx, header.trim().to_string()))
            .collect();

        Ok(Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            features,
        })
    }

    /// Drops feature columns whose first populated cell is not a number and
    /// returns their names. Columns with no populated cell are kept.
    fn retain_numeric_features(&mut self, records: &[csv::StringRecord]) -> Vec<String> {
        let mut skipped = Vec::new();
        self.features.retain(|(idx, name)| {
            let first = records
                .iter()
                .filter_map(|record| record.get(*idx))
                .map(str::trim)
                .find(|raw| !raw.is_empty() && !raw.eq_ignore_ascii_case("nan"));
            let numeric = first.map_or(true, |raw| raw.parse::<f64>().is_ok());
            if !numeric {
                skipped.push(name.clone());
            }
            numeric
        });
        skipped
    }

    fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|(_, name)| name.clone()).collect()
    }
}

/// Loads bars from a CSV file. Extra columns whose first populated cell is
/// numeric become per-bar features in header order; other extra columns (a
/// ticker, say) are skipped with a warning. Rows are sorted by time and
/// duplicate timestamps keep the last row seen.
pub fn load_bars_csv<P: AsRef<Path>>(path: P) -> Result<LoadedBars> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open price CSV {}", path.display()))?;
    let loaded = read_bars_csv(file)
        .with_context(|| format!("Failed to load price CSV {}", path.display()))?;

    if loaded.report.incomplete_rows > 0 {
        warn!(
            "Dropped {} incomplete rows from {}",
            loaded.report.incomplete_rows,
            path.display()
        );
    }
    if loaded.report.duplicates > 0 || loaded.report.out_of_order > 0 {
        warn!(
            "{}: {} duplicate and {} out-of-order timestamps normalised",
            path.display(),
            loaded.report.duplicates,
            loaded.report.out_of_order
        );
    }
    info!(
        "Loaded {} bars with {} feature columns from {}",
        loaded.bars.len(),
        loaded.feature_names.len(),
        path.display()
    );
    Ok(loaded)
}

pub fn read_bars_csv<R: Read>(source: R) -> Result<LoadedBars> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(source);
    let headers = reader.headers().context("CSV has no header row")?.clone();
    let mut layout = ColumnLayout::from_headers(&headers)?;

    let records = reader
        .records()
        .enumerate()
        .map(|(row_idx, record)| {
            record.with_context(|| format!("Failed to read CSV row {}", row_idx + 1))
        })
        .collect::<Result<Vec<_>>>()?;

    let skipped = layout.retain_numeric_features(&records);
    if !skipped.is_empty() {
        warn!("Skipping non-numeric columns: {}", skipped.join(", "));
    }

    let mut report = LoadReport::default();
    let mut bars: Vec<Bar> = Vec::new();

    for (row_idx, record) in records.iter().enumerate() {
        report.rows_read += 1;

        match parse_row(record, &layout)
            .with_context(|| format!("Invalid CSV row {}", row_idx + 1))?
        {
            Some(bar) => bars.push(bar),
            None => report.incomplete_rows += 1,
        }
    }

    report.out_of_order = bars
        .windows(2)
        .filter(|pair| pair[1].timestamp < pair[0].timestamp)
        .count();
    bars.sort_by_key(|bar| bar.timestamp);

    let before = bars.len();
    bars = dedupe_keep_last(bars);
    report.duplicates = before - bars.len();

    Ok(LoadedBars {
        bars,
        feature_names: layout.feature_names(),
        report,
    })
}

/// `None` for rows with an empty or NaN cell.
fn parse_row(record: &csv::StringRecord, layout: &ColumnLayout) -> Result<Option<Bar>> {
    let raw_timestamp = record
        .get(layout.timestamp)
        .ok_or_else(|| anyhow!("Row is missing the timestamp cell"))?;
    let timestamp = parse_timestamp(raw_timestamp)?;

    let mut prices = [0.0; 4];
    for (slot, (idx, name)) in prices.iter_mut().zip([
        (layout.open, "open"),
        (layout.high, "high"),
        (layout.low, "low"),
        (layout.close, "close"),
    ]) {
        match parse_cell(record, idx, name)? {
            Some(value) => *slot = value,
            None => return Ok(None),
        }
    }

    let volume = match layout.volume {
        Some(idx) => match parse_cell(record, idx, "volume")? {
            Some(value) => value,
            None => return Ok(None),
        },
        None => 0.0,
    };

    let mut features = Vec::with_capacity(layout.features.len());
    for (idx, name) in &layout.features {
        match parse_cell(record, *idx, name)? {
            Some(value) => features.push(value),
            None => return Ok(None),
        }
    }

    let [open, high, low, close] = prices;
    Ok(Some(Bar {
        timestamp,
        open,
        high,
        low,
        close,
        volume,
        features,
    }))
}

fn parse_cell(record: &csv::StringRecord, idx: usize, name: &str) -> Result<Option<f64>> {
    let raw = record.get(idx).unwrap_or("").trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Column {} ({}) is not a number (value: {})", idx, name, raw))?;
    Ok(value.is_finite().then_some(value))
}

fn dedupe_keep_last(bars: Vec<Bar>) -> Vec<Bar> {
    let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match deduped.last_mut() {
            Some(last) if last.timestamp == bar.timestamp => *last = bar,
            _ => deduped.push(bar),
        }
    }
    deduped
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[+zz:zz]` and the
/// `DD.MM.YYYY HH:MM:SS.fff` layout of GMT candlestick exports. Naive values are UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%d.%m.%Y %H:%M:%S%.f",
        "%d.%m.%Y %H:%M:%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(anyhow!("Unsupported timestamp format: {}", value))
}

fn floor_to_hour(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    let into_hour = timestamp.timestamp().rem_euclid(3600);
    timestamp
        - Duration::seconds(into_hour)
        - Duration::nanoseconds(i64::from(timestamp.timestamp_subsec_nanos()))
}

/// Aggregates time-ordered bars into hourly buckets keyed by the floored hour:
/// first open, max high, min low, last close, summed volume, last feature values.
pub fn resample_hourly(bars: &[Bar]) -> Vec<Bar> {
    let mut output: Vec<Bar> = Vec::new();

    for bar in bars {
        let bucket_start = floor_to_hour(bar.timestamp);
        match output.last_mut() {
            Some(bucket) if bucket.timestamp == bucket_start => {
                bucket.high = bucket.high.max(bar.high);
                bucket.low = bucket.low.min(bar.low);
                bucket.close = bar.close;
                bucket.volume += bar.volume;
                bucket.features.clone_from(&bar.features);
            }
            _ => output.push(Bar {
                timestamp: bucket_start,
                ..bar.clone()
            }),
        }
    }

    output
}

pub fn parse_split_at(raw: Option<&str>) -> Result<DateTime<Utc>> {
    let raw = raw.unwrap_or(DEFAULT_SPLIT_AT);
    parse_timestamp(raw).with_context(|| format!("Invalid split cut-over {}", raw))
}

/// Train is `[.., cutover)`, test is `[cutover, ..)`; the halves never overlap.
pub fn split_series(
    series: &PriceSeries,
    split: DataSplit,
    cutover: DateTime<Utc>,
) -> Result<PriceSeries> {
    let restricted = match split {
        DataSplit::Train => series.restrict_to_range(None, Some(cutover)),
        DataSplit::Test => series.restrict_to_range(Some(cutover), None),
        DataSplit::All => return Ok(series.clone()),
    };
    restricted.with_context(|| {
        format!(
            "No usable {:?} bars for {} around cut-over {}",
            split,
            series.symbol(),
            cutover.to_rfc3339()
        )
    })
}

/// CSV to validated series in one go, optionally resampled to hourly bars.
pub fn load_price_series<P: AsRef<Path>>(
    path: P,
    symbol: &str,
    resample: bool,
) -> Result<PriceSeries> {
    let loaded = load_bars_csv(path)?;
    let bars = if resample {
        let hourly = resample_hourly(&loaded.bars);
        info!(
            "Resampled {} bars into {} hourly bars",
            loaded.bars.len(),
            hourly.len()
        );
        hourly
    } else {
        loaded.bars
    };
    Ok(PriceSeries::new(symbol, bars, loaded.feature_names)?)
}
