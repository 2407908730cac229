use crate::errors::{EnvError, EnvResult};
use crate::models::{Bar, BASE_FEATURE_COUNT};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

const PRICE_SERIES_SNAPSHOT_VERSION: u32 = 1;

/// Immutable, time-ordered bar sequence. Cloning is cheap and shares the bars,
/// so one series can back any number of environments.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    symbol: Arc<str>,
    bars: Arc<Vec<Bar>>,
    feature_names: Arc<Vec<String>>,
}

#[derive(Serialize, Deserialize)]
struct PriceSeriesSnapshot {
    version: u32,
    generated_at: DateTime<Utc>,
    symbol: String,
    feature_names: Vec<String>,
    bars: Vec<Bar>,
}

impl PriceSeries {
    pub fn new(
        symbol: impl Into<String>,
        bars: Vec<Bar>,
        feature_names: Vec<String>,
    ) -> EnvResult<Self> {
        if bars.is_empty() {
            return Err(EnvError::configuration("price series contains no bars"));
        }

        for (idx, bar) in bars.iter().enumerate() {
            if bar.features.len() != feature_names.len() {
                return Err(EnvError::configuration(format!(
                    "bar {} at {} has {} features, expected {}",
                    idx,
                    bar.timestamp,
                    bar.features.len(),
                    feature_names.len()
                )));
            }
            if ![bar.open, bar.high, bar.low, bar.close]
                .iter()
                .all(|value| value.is_finite())
            {
                return Err(EnvError::configuration(format!(
                    "bar {} at {} has a non-finite price",
                    idx, bar.timestamp
                )));
            }
            if bar.low > bar.high {
                return Err(EnvError::configuration(format!(
                    "bar {} at {} has low {} above high {}",
                    idx, bar.timestamp, bar.low, bar.high
                )));
            }
        }

        if let Some(pair) = bars
            .windows(2)
            .find(|pair| pair[1].timestamp <= pair[0].timestamp)
        {
            return Err(EnvError::configuration(format!(
                "bar timestamps must be strictly increasing ({} followed by {})",
                pair[0].timestamp, pair[1].timestamp
            )));
        }

        let symbol: String = symbol.into();
        Ok(Self {
            symbol: Arc::from(symbol),
            bars: Arc::new(bars),
            feature_names: Arc::new(feature_names),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn bar(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    pub fn last_index(&self) -> usize {
        self.bars.len() - 1
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Values per observation row: the OHLCV columns followed by the extra features.
    pub fn feature_count(&self) -> usize {
        BASE_FEATURE_COUNT + self.feature_names.len()
    }

    pub fn first_timestamp(&self) -> DateTime<Utc> {
        self.bars[0].timestamp
    }

    pub fn last_timestamp(&self) -> DateTime<Utc> {
        self.bars[self.last_index()].timestamp
    }

    /// Bars with `start <= timestamp < end`. Either bound may be open.
    pub fn restrict_to_range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> EnvResult<Self> {
        let bars: Vec<Bar> = self
            .bars
            .iter()
            .filter(|bar| start.map_or(true, |s| bar.timestamp >= s))
            .filter(|bar| end.map_or(true, |e| bar.timestamp < e))
            .cloned()
            .collect();
        Self::new(
            self.symbol.to_string(),
            bars,
            self.feature_names.as_ref().clone(),
        )
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| {
            format!("Failed to open price series snapshot at {}", path.display())
        })?;
        let reader = BufReader::new(file);
        let snapshot: PriceSeriesSnapshot =
            bincode::deserialize_from(reader).context("Snapshot decode failed")?;

        if snapshot.version != PRICE_SERIES_SNAPSHOT_VERSION {
            return Err(anyhow!(
                "Price series snapshot version mismatch (found {}, expected {})",
                snapshot.version,
                PRICE_SERIES_SNAPSHOT_VERSION
            ));
        }

        info!(
            "Loaded {} bars for {} from snapshot generated at {}",
            snapshot.bars.len(),
            snapshot.symbol,
            snapshot.generated_at
        );
        Ok(Self::new(
            snapshot.symbol,
            snapshot.bars,
            snapshot.feature_names,
        )?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create snapshot directory {}", parent.display())
                })?;
            }
        }

        let file = File::create(path).with_context(|| {
            format!(
                "Unable to create price series snapshot at {}",
                path.display()
            )
        })?;
        let mut writer = BufWriter::new(file);
        let snapshot = PriceSeriesSnapshot {
            version: PRICE_SERIES_SNAPSHOT_VERSION,
            generated_at: Utc::now(),
            symbol: self.symbol.to_string(),
            feature_names: self.feature_names.as_ref().clone(),
            bars: self.bars.as_ref().clone(),
        };
        bincode::serialize_into(&mut writer, &snapshot)
            .context("Failed to serialize price series snapshot")?;
        writer
            .flush()
            .context("Failed to flush price series snapshot to disk")?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::Bar;
    use chrono::{Duration, TimeZone, Utc};

    /// Hourly bars from `(open, high, low, close)` tuples, one feature equal to the index.
    pub fn hourly_bars(prices: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(idx, &(open, high, low, close))| Bar {
                timestamp: start + Duration::hours(idx as i64),
                open,
                high,
                low,
                close,
                volume: 1.0,
                features: vec![idx as f64],
            })
            .collect()
    }
}
