// src/config/mod.rs
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub processor: ProcessorConfig,
    pub grid: GridConfig,
    pub heart_rate: HeartRateConfig,
    pub signal_map: SignalMapConfig,
    pub extraction: ExtractionConfig,
    pub validity: ValidityConfig,
    pub reference: ReferenceConfig,
    pub time_delay: TimeDelayConfig,
    pub render: RenderConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Raises the default console log level from `info` to `debug`.
    pub verbose: bool,
    /// Worker pool size; 0 uses the available CPU count.
    pub threads: usize,
    pub log_dir: PathBuf,
    pub log_file: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            threads: 0,
            log_dir: PathBuf::from("logs"),
            log_file: "rppg_ptt.log".to_string(),
        }
    }
}

impl ProcessorConfig {
    /// Default `env_logger` filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GridConfig {
    pub window_size: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { window_size: 3 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HeartRateConfig {
    /// Side of the square pixel window around the center point.
    pub roi_size: usize,
    pub f_low: f64,
    pub f_high: f64,
    pub filter_order: usize,
    /// Welch segment length (clamped to the signal length).
    pub welch_segment: usize,
}

impl Default for HeartRateConfig {
    fn default() -> Self {
        Self {
            roi_size: 20,
            f_low: 0.7,
            f_high: 4.0,
            filter_order: 3,
            welch_segment: 256,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SignalMapConfig {
    /// Half width (Hz) of the band around the heart-rate frequency.
    pub band_half_width: f64,
    pub pyramid_levels: usize,
    pub alpha: f64,
    pub attenuation: f64,
}

impl Default for SignalMapConfig {
    fn default() -> Self {
        Self {
            band_half_width: 0.15,
            pyramid_levels: 3,
            alpha: 2.0,
            attenuation: 1.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Pos,
    Chrom,
    Pca,
    Green,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    pub method: ExtractionMethod,
    pub pos_window_seconds: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            method: ExtractionMethod::Pos,
            pos_window_seconds: 1.6,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ValidityConfig {
    /// Threshold is `mean(SNR) - std_factor * std(SNR)`.
    pub std_factor: f64,
}

impl Default for ValidityConfig {
    fn default() -> Self {
        Self { std_factor: 2.0 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReferenceConfig {
    pub neighborhood_size: usize,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            neighborhood_size: 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TimeDelayConfig {
    pub max_lag_seconds: f64,
}

impl Default for TimeDelayConfig {
    fn default() -> Self {
        Self {
            max_lag_seconds: 0.34,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Raw per-patch waveform amplitude.
    Intensity,
    /// Reference waveform replayed with each patch's estimated delay.
    Delay,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub mode: RenderMode,
    pub red_threshold: f64,
    pub draw_overlay: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            mode: RenderMode::Intensity,
            red_threshold: 0.05,
            draw_overlay: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub psd_plot: String,
    pub amplitude_image: String,
    pub ptt_image: String,
    pub video: String,
    pub video_codec: String,
    pub export_csv: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./out"),
            psd_plot: "psd.png".to_string(),
            amplitude_image: "amplitude.png".to_string(),
            ptt_image: "PTT.png".to_string(),
            video: "heatmap.avi".to_string(),
            video_codec: "ffv1".to_string(),
            export_csv: true,
        }
    }
}

impl OutputConfig {
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl Config {
    /// Checks parameter ranges that the stages rely on.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(PipelineError::InvalidConfig(msg));

        let w = self.grid.window_size;
        if w < 3 || w % 2 == 0 {
            return fail(format!("grid.window_size must be odd and >= 3, got {}", w));
        }
        let hr = &self.heart_rate;
        if hr.roi_size == 0 {
            return fail("heart_rate.roi_size must be positive".to_string());
        }
        if !(hr.f_low > 0.0 && hr.f_low < hr.f_high) {
            return fail(format!(
                "heart_rate band must satisfy 0 < f_low < f_high, got [{}, {}]",
                hr.f_low, hr.f_high
            ));
        }
        if hr.filter_order == 0 {
            return fail("heart_rate.filter_order must be positive".to_string());
        }
        if hr.welch_segment == 0 {
            return fail("heart_rate.welch_segment must be positive".to_string());
        }
        let sm = &self.signal_map;
        if !(sm.band_half_width > 0.0) {
            return fail("signal_map.band_half_width must be positive".to_string());
        }
        if sm.alpha < 0.0 || sm.attenuation < 0.0 {
            return fail("signal_map.alpha and attenuation must be non-negative".to_string());
        }
        if !(self.extraction.pos_window_seconds > 0.0) {
            return fail("extraction.pos_window_seconds must be positive".to_string());
        }
        if !(self.validity.std_factor >= 0.0) {
            return fail("validity.std_factor must be non-negative".to_string());
        }
        if !(self.time_delay.max_lag_seconds > 0.0) {
            return fail("time_delay.max_lag_seconds must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.render.red_threshold) {
            return fail("render.red_threshold must lie in [0, 1]".to_string());
        }
        Ok(())
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config_str = fs::read_to_string(path)
        .map_err(|e| PipelineError::Config(format!("Failed to read config file: {}", e)))?;

    let config: Config = serde_yaml::from_str(&config_str)
        .map_err(|e| PipelineError::Config(format!("Failed to parse config file: {}", e)))?;
    config.validate()?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(config: &Config, path: P) -> Result<()> {
    let yaml = serde_yaml::to_string(config)
        .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))?;

    fs::write(path, yaml)
        .map_err(|e| PipelineError::Config(format!("Failed to write config file: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "grid:\n  window_size: 5\nrender:\n  mode: delay\nextraction:\n  method: chrom\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.grid.window_size, 5);
        assert_eq!(config.render.mode, RenderMode::Delay);
        assert_eq!(config.extraction.method, ExtractionMethod::Chrom);
        assert_eq!(config.heart_rate, HeartRateConfig::default());
        assert_eq!(config.time_delay.max_lag_seconds, 0.34);
    }

    #[test]
    fn verbose_selects_debug_logging() {
        let quiet: Config = serde_yaml::from_str("processor:\n  threads: 2\n").unwrap();
        assert_eq!(quiet.processor.log_filter(), "info");
        let loud: Config = serde_yaml::from_str("processor:\n  verbose: true\n").unwrap();
        assert_eq!(loud.processor.log_filter(), "debug");
    }

    #[test]
    fn rejects_even_window() {
        let mut config = Config::default();
        config.grid.window_size = 4;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_inverted_band() {
        let mut config = Config::default();
        config.heart_rate.f_low = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut config = Config::default();
        config.render.mode = RenderMode::Delay;
        config.processor.threads = 2;
        save_config(&config, &path).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load_config("/definitely/not/here.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
