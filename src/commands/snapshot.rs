use crate::data_loader;
use anyhow::Result;
use log::info;
use std::path::Path;

pub fn run(data: &Path, output_path: &Path, symbol: Option<&str>, resample_hourly: bool) -> Result<()> {
    let symbol = match symbol {
        Some(symbol) => symbol.to_ascii_uppercase(),
        None => data
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_ascii_uppercase())
            .unwrap_or_else(|| "UNKNOWN".to_string()),
    };

    info!(
        "Generating {} price series snapshot at {}",
        symbol,
        output_path.display()
    );
    let series = data_loader::load_price_series(data, &symbol, resample_hourly)?;
    series.save_to_file(output_path)?;
    info!(
        "Price series snapshot with {} bars successfully written to {}",
        series.len(),
        output_path.display()
    );

    Ok(())
}
