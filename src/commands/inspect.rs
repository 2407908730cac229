use crate::price_series::PriceSeries;
use anyhow::Result;
use log::info;
use std::path::Path;

pub fn run(snapshot_path: &Path) -> Result<()> {
    let series = PriceSeries::load_from_file(snapshot_path)?;

    info!("Symbol: {}", series.symbol());
    info!("Bars: {}", series.len());
    info!(
        "Range: {} to {}",
        series.first_timestamp().to_rfc3339(),
        series.last_timestamp().to_rfc3339()
    );
    if series.feature_names().is_empty() {
        info!("Features: none beyond OHLCV");
    } else {
        info!("Features: {}", series.feature_names().join(", "));
    }
    info!("Observation columns per bar: {}", series.feature_count());

    Ok(())
}
