use crate::errors::{EnvError, EnvResult};
use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Instrument families with a known preset. Anything else goes through a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Instrument {
    Eurusd,
    Goog,
    Ma,
}

impl Instrument {
    pub fn symbol(self) -> &'static str {
        match self {
            Instrument::Eurusd => "EURUSD",
            Instrument::Goog => "GOOG",
            Instrument::Ma => "MA",
        }
    }

    pub fn instrument_config(self) -> InstrumentConfig {
        let pip_size = match self {
            Instrument::Eurusd => 0.0001,
            Instrument::Goog | Instrument::Ma => 0.01,
        };
        InstrumentConfig {
            symbol: self.symbol().to_string(),
            pip_size,
        }
    }

    /// Defaults both training and evaluation use for this instrument.
    pub fn environment_config(self) -> EnvironmentConfig {
        EnvironmentConfig {
            instrument: self.instrument_config(),
            ..EnvironmentConfig::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub symbol: String,
    /// Price units per pip; converts SL/TP distances to prices.
    pub pip_size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub instrument: InstrumentConfig,
    pub window_size: usize,
    /// Ordered stop-loss distances, in pips.
    pub stop_loss_pips: Vec<f64>,
    /// Ordered take-profit distances, in pips.
    pub take_profit_pips: Vec<f64>,
    pub starting_equity: f64,
    pub reward_scale: f64,
    pub max_holding_bars: Option<usize>,
    pub ruin_equity: Option<f64>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            instrument: Instrument::Eurusd.instrument_config(),
            window_size: 30,
            stop_loss_pips: vec![30.0, 60.0, 80.0],
            take_profit_pips: vec![30.0, 60.0, 80.0],
            starting_equity: 1.0,
            reward_scale: 1.0,
            max_holding_bars: None,
            ruin_equity: None,
        }
    }
}

impl EnvironmentConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read environment config {}", path.display()))?;
        let config: EnvironmentConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid environment config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EnvResult<()> {
        if self.window_size == 0 {
            return Err(EnvError::configuration("window_size must be positive"));
        }
        if !(self.instrument.pip_size.is_finite() && self.instrument.pip_size > 0.0) {
            return Err(EnvError::configuration(format!(
                "pip_size must be positive (value: {})",
                self.instrument.pip_size
            )));
        }
        validate_distances("stop_loss_pips", &self.stop_loss_pips)?;
        validate_distances("take_profit_pips", &self.take_profit_pips)?;
        if !self.starting_equity.is_finite() {
            return Err(EnvError::configuration("starting_equity must be finite"));
        }
        if !(self.reward_scale.is_finite() && self.reward_scale > 0.0) {
            return Err(EnvError::configuration(format!(
                "reward_scale must be positive (value: {})",
                self.reward_scale
            )));
        }
        if self.max_holding_bars == Some(0) {
            return Err(EnvError::configuration(
                "max_holding_bars must be at least 1 when set",
            ));
        }
        if let Some(ruin) = self.ruin_equity {
            if !ruin.is_finite() || ruin >= self.starting_equity {
                return Err(EnvError::configuration(format!(
                    "ruin_equity ({}) must be finite and below starting_equity ({})",
                    ruin, self.starting_equity
                )));
            }
        }
        Ok(())
    }

    pub fn stop_loss_distance(&self, index: usize) -> f64 {
        self.stop_loss_pips[index] * self.instrument.pip_size
    }

    pub fn take_profit_distance(&self, index: usize) -> f64 {
        self.take_profit_pips[index] * self.instrument.pip_size
    }

    /// Applies `KEY=VALUE` overrides, e.g. from the command line.
    pub fn apply_overrides(&mut self, settings: &HashMap<String, String>) -> Result<()> {
        for key in settings.keys() {
            if !OVERRIDE_KEYS.contains(&key.as_str()) {
                return Err(anyhow!(
                    "Unknown setting {} (expected one of {})",
                    key,
                    OVERRIDE_KEYS.join(", ")
                ));
            }
        }

        if settings.contains_key("WINDOW_SIZE") {
            self.window_size = require_setting_usize(settings, "WINDOW_SIZE", 1)?;
        }
        if settings.contains_key("PIP_SIZE") {
            self.instrument.pip_size = require_setting_f64(settings, "PIP_SIZE", Some(0.0), None)?;
        }
        if settings.contains_key("STOP_LOSS_PIPS") {
            self.stop_loss_pips = require_setting_f64_list(settings, "STOP_LOSS_PIPS")?;
        }
        if settings.contains_key("TAKE_PROFIT_PIPS") {
            self.take_profit_pips = require_setting_f64_list(settings, "TAKE_PROFIT_PIPS")?;
        }
        if settings.contains_key("STARTING_EQUITY") {
            self.starting_equity = require_setting_f64(settings, "STARTING_EQUITY", None, None)?;
        }
        if settings.contains_key("REWARD_SCALE") {
            self.reward_scale = require_setting_f64(settings, "REWARD_SCALE", Some(0.0), None)?;
        }
        if settings.contains_key("MAX_HOLDING_BARS") {
            self.max_holding_bars = Some(require_setting_usize(settings, "MAX_HOLDING_BARS", 1)?);
        }
        if settings.contains_key("RUIN_EQUITY") {
            self.ruin_equity = Some(require_setting_f64(settings, "RUIN_EQUITY", None, None)?);
        }

        self.validate()?;
        Ok(())
    }
}

const OVERRIDE_KEYS: [&str; 8] = [
    "WINDOW_SIZE",
    "PIP_SIZE",
    "STOP_LOSS_PIPS",
    "TAKE_PROFIT_PIPS",
    "STARTING_EQUITY",
    "REWARD_SCALE",
    "MAX_HOLDING_BARS",
    "RUIN_EQUITY",
];

fn validate_distances(name: &str, values: &[f64]) -> EnvResult<()> {
    if values.is_empty() {
        return Err(EnvError::configuration(format!(
            "{} must contain at least one option",
            name
        )));
    }
    if let Some(bad) = values.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
        return Err(EnvError::configuration(format!(
            "{} must contain only positive distances (value: {})",
            name, bad
        )));
    }
    Ok(())
}

/// Parses `KEY=VALUE` pairs into a settings map.
pub fn parse_settings(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut settings = HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Setting override must be KEY=VALUE (value: {})", pair))?;
        settings.insert(key.trim().to_ascii_uppercase(), value.trim().to_string());
    }
    Ok(settings)
}

fn require_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("Missing required setting {}", key))
}

fn require_setting_f64(
    settings: &HashMap<String, String>,
    key: &str,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<f64> {
    let raw = require_setting(settings, key)?;
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if let Some(min_value) = min {
        if value < min_value {
            return Err(anyhow!(
                "Setting {} must be >= {} (value: {})",
                key,
                min_value,
                raw
            ));
        }
    }
    if let Some(max_value) = max {
        if value > max_value {
            return Err(anyhow!(
                "Setting {} must be <= {} (value: {})",
                key,
                max_value,
                raw
            ));
        }
    }
    Ok(value)
}

fn require_setting_usize(
    settings: &HashMap<String, String>,
    key: &str,
    min: usize,
) -> Result<usize> {
    let raw = require_setting(settings, key)?;
    let value = raw
        .parse::<usize>()
        .map_err(|_| anyhow!("Setting {} must be a whole number (value: {})", key, raw))?;
    if value < min {
        return Err(anyhow!(
            "Setting {} must be >= {} (value: {})",
            key,
            min,
            raw
        ));
    }
    Ok(value)
}

fn require_setting_f64_list(settings: &HashMap<String, String>, key: &str) -> Result<Vec<f64>> {
    let raw = require_setting(settings, key)?;
    let trimmed = raw.trim().trim_matches(|c| c == '[' || c == ']');
    let mut values = Vec::new();

    for part in trimmed.split(|c: char| c == ',' || c.is_whitespace()) {
        let entry = part.trim();
        if entry.is_empty() {
            continue;
        }
        let value = entry
            .parse::<f64>()
            .map_err(|_| anyhow!("Setting {} must be a list of numbers (value: {})", key, raw))?;
        values.push(value);
    }

    if values.is_empty() {
        return Err(anyhow!(
            "Setting {} must contain at least one number (value: {})",
            key,
            raw
        ));
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_share_window_and_options() {
        let eurusd = Instrument::Eurusd.environment_config();
        let goog = Instrument::Goog.environment_config();
        assert_eq!(eurusd.window_size, 30);
        assert_eq!(eurusd.stop_loss_pips, vec![30.0, 60.0, 80.0]);
        assert_eq!(eurusd.take_profit_pips, goog.take_profit_pips);
        assert!((eurusd.stop_loss_distance(0) - 0.003).abs() < 1e-12);
        assert!((goog.take_profit_distance(2) - 0.8).abs() < 1e-12);
        assert!(eurusd.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_options_and_zero_window() {
        let mut config = EnvironmentConfig::default();
        config.stop_loss_pips.clear();
        assert!(matches!(config.validate(), Err(EnvError::Configuration(_))));

        let mut config = EnvironmentConfig::default();
        config.window_size = 0;
        assert!(config.validate().is_err());

        let mut config = EnvironmentConfig::default();
        config.take_profit_pips = vec![10.0, -5.0];
        assert!(config.validate().is_err());

        let mut config = EnvironmentConfig::default();
        config.ruin_equity = Some(config.starting_equity);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_replace_fields() {
        let mut config = EnvironmentConfig::default();
        let settings = parse_settings(&[
            "window_size=10".to_string(),
            "STOP_LOSS_PIPS=[10, 20]".to_string(),
            "STARTING_EQUITY=1000".to_string(),
        ])
        .unwrap();
        config.apply_overrides(&settings).unwrap();
        assert_eq!(config.window_size, 10);
        assert_eq!(config.stop_loss_pips, vec![10.0, 20.0]);
        assert_eq!(config.starting_equity, 1000.0);
    }

    #[test]
    fn test_overrides_reject_unknown_keys_and_bad_values() {
        let mut config = EnvironmentConfig::default();
        let unknown = parse_settings(&["LEVERAGE=10".to_string()]).unwrap();
        assert!(config.apply_overrides(&unknown).is_err());

        let zero_window = parse_settings(&["WINDOW_SIZE=0".to_string()]).unwrap();
        assert!(config.apply_overrides(&zero_window).is_err());
        assert!(parse_settings(&["WINDOW_SIZE".to_string()]).is_err());
    }

    #[test]
    fn test_config_json_fills_defaults() {
        let config: EnvironmentConfig = serde_json::from_str(
            r#"{"instrument": {"symbol": "GOOG", "pip_size": 0.01}, "window_size": 12}"#,
        )
        .unwrap();
        assert_eq!(config.window_size, 12);
        assert_eq!(config.instrument.symbol, "GOOG");
        assert_eq!(config.take_profit_pips, vec![30.0, 60.0, 80.0]);
    }
}
