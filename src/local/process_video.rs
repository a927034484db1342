use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{info, warn};
use ndarray::{Array2, Array3, Array4};
use serde::Serialize;

use crate::config::{Config, RenderMode};
use crate::error::{PipelineError, Result};
use crate::io::export::{export_columns, export_mask, export_matrix};
use crate::io::{load_mask, save_mask, FFmpeg, Video};
use crate::processing::{Pipeline, PipelineResult};
use crate::selection::{CenterPoint, RegionSelector, ScriptedSelector};
use crate::utils::log::{log_csv, log_with_header};
use crate::visualization::{amplitude_image, plot_psd, ptt_image};

pub struct RunOptions {
    pub video_path: PathBuf,
    /// Loaded if present, otherwise selected and written here.
    pub mask_path: PathBuf,
    pub center: Option<CenterPoint>,
    pub config: Config,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub bpm: f64,
    pub n_segmented: usize,
    pub n_valid: usize,
    pub valid_fraction: f64,
    pub snr_threshold: f64,
    pub delay_range: Option<(f64, f64)>,
    pub outputs: Vec<PathBuf>,
    pub elapsed: Duration,
}

impl RunSummary {
    fn new(result: &PipelineResult, outputs: Vec<PathBuf>, elapsed: Duration) -> Self {
        RunSummary {
            bpm: result.heart_rate.bpm,
            n_segmented: result.grid.n_segmented(),
            n_valid: result.n_valid(),
            valid_fraction: result.valid_fraction(),
            snr_threshold: result.validity.threshold,
            delay_range: result.delay_range(),
            outputs,
            elapsed,
        }
    }

    pub fn report(&self) -> String {
        let delays = match self.delay_range {
            Some((lo, hi)) => format!("{:.4} s .. {:.4} s", lo, hi),
            None => "none".to_string(),
        };
        let outputs: Vec<String> = self.outputs.iter().map(|p| p.display().to_string()).collect();
        format!(
            "heart rate: {:.1} BPM\nsegmented patches: {}\nvalid patches: {} ({:.1}%)\nSNR threshold: {:.3} dB\ndelays: {}\nelapsed: {:.2?}\noutputs: {}",
            self.bpm,
            self.n_segmented,
            self.n_valid,
            100.0 * self.valid_fraction,
            self.snr_threshold,
            delays,
            self.elapsed,
            outputs.join(", ")
        )
    }
}

/// A finished analysis with its rendered frames and the files written so far.
pub struct ProcessedVideo {
    pub result: PipelineResult,
    pub frames: Array4<u8>,
    pub outputs: Vec<PathBuf>,
}

/// Loads the video and mask, runs the pipeline and writes every output.
pub fn run(options: RunOptions) -> Result<RunSummary> {
    let start = Instant::now();
    let config = &options.config;
    let ffmpeg = FFmpeg::new()?;

    let video = ffmpeg.load(&options.video_path)?;
    info!(
        "loaded {} frames of {}x{} at {:.2} fps from {}",
        video.n_frames(),
        video.height(),
        video.width(),
        video.fps,
        options.video_path.display()
    );

    let selector = ScriptedSelector::new(options.center);
    let first = video
        .frame(0)
        .ok_or_else(|| PipelineError::Video("video contains no frames".to_string()))?;
    let mask = resolve_mask(&options.mask_path, &selector, &first)?;
    let center = selector.select_point(first.view(), mask.view())?;

    let pipeline = Pipeline::new(config.clone())?;
    let mut processed = process_video(&pipeline, &video, &mask, center)?;

    let video_path = config.output.path(&config.output.video);
    ffmpeg.write(processed.frames.view(), video.fps, &video_path, &config.output.video_codec)?;
    processed.outputs.push(video_path);

    let summary_path = config.output.path("summary.json");
    processed.outputs.push(summary_path.clone());
    let summary = RunSummary::new(&processed.result, processed.outputs, start.elapsed());
    write_json(&summary_path, &summary)?;
    write_run_log(config, &options.video_path, &summary)?;
    Ok(summary)
}

fn resolve_mask(path: &Path, selector: &dyn RegionSelector, first: &Array3<u8>) -> Result<Array2<bool>> {
    if path.exists() {
        return load_mask(path);
    }
    let mask = selector.select_mask(first.view())?;
    save_mask(path, mask.view())?;
    info!("saved selected mask to {}", path.display());
    Ok(mask)
}

/// Runs the analysis on an already decoded video and writes the diagnostic
/// images and CSV exports. The rendered frames are returned, not encoded.
pub fn process_video(pipeline: &Pipeline, video: &Video, mask: &Array2<bool>, center: CenterPoint) -> Result<ProcessedVideo> {
    let output = &pipeline.config().output;
    fs::create_dir_all(&output.dir)?;
    let mut outputs = Vec::new();

    let result = pipeline.analyze(video, mask.view(), center)?;

    // A failed PSD plot never aborts the run.
    let psd_path = output.path(&output.psd_plot);
    let hr = &result.heart_rate;
    match plot_psd(&psd_path, &hr.freqs, &hr.psd, Some(hr.frequency())) {
        Ok(()) => outputs.push(psd_path),
        Err(e) => warn!("skipping PSD plot: {}", e),
    }

    let amplitude_path = output.path(&output.amplitude_image);
    amplitude_image(result.amplitude.view(), result.grid.window_size as u32).save(&amplitude_path)?;
    outputs.push(amplitude_path);

    if pipeline.mode() == RenderMode::Delay {
        let ptt_path = output.path(&output.ptt_image);
        ptt_image(result.delays.view(), video.height(), video.width()).save(&ptt_path)?;
        outputs.push(ptt_path);
    }

    if output.export_csv {
        outputs.extend(export_tables(&output.dir, &result, video.fps, pipeline.mode())?);
    }

    let frames = pipeline.render(video, mask.view(), &result)?;
    Ok(ProcessedVideo {
        result,
        frames,
        outputs,
    })
}

fn export_tables(dir: &Path, result: &PipelineResult, fps: f64, mode: RenderMode) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    let path = dir.join("snr.csv");
    export_matrix(&path, result.validity.snr.view())?;
    written.push(path);

    let path = dir.join("valid_mask.csv");
    export_mask(&path, result.valid.view())?;
    written.push(path);

    let times: Vec<f64> = (0..result.reference.len()).map(|t| t as f64 / fps).collect();
    let reference = result.reference.to_vec();
    let path = dir.join("signal_ref.csv");
    export_columns(&path, &["time_s", "signal_ref"], &[times.as_slice(), reference.as_slice()])?;
    written.push(path);

    let hr = &result.heart_rate;
    let path = dir.join("psd.csv");
    export_columns(&path, &["frequency_hz", "power"], &[hr.freqs.as_slice(), hr.psd.as_slice()])?;
    written.push(path);

    if mode == RenderMode::Delay {
        let path = dir.join("time_delays.csv");
        export_matrix(&path, result.delays.view())?;
        written.push(path);
    }
    Ok(written)
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let mut file = File::create(path)?;
    serde_json::to_writer_pretty(&mut file, value).map_err(std::io::Error::from)?;
    file.write_all(b"\n")?;
    Ok(())
}

fn write_run_log(config: &Config, video_path: &Path, summary: &RunSummary) -> Result<()> {
    let log_dir = &config.processor.log_dir;
    let header = format!("RUN {}", video_path.display());
    log_with_header(log_dir, &config.processor.log_file, &header, &summary.report())?;

    let (lo, hi) = summary.delay_range.unwrap_or((f64::NAN, f64::NAN));
    let row = [
        video_path.display().to_string(),
        format!("{:.3}", summary.bpm),
        summary.n_segmented.to_string(),
        summary.n_valid.to_string(),
        format!("{:.4}", summary.snr_threshold),
        format!("{:.4}", lo),
        format!("{:.4}", hi),
    ];
    let row: Vec<&str> = row.iter().map(String::as_str).collect();
    log_csv(
        log_dir,
        "runs.csv",
        &["video", "bpm", "segmented", "valid", "snr_threshold_db", "delay_min_s", "delay_max_s"],
        &row,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::SyntheticVideo;

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.processor.threads = 2;
        config.processor.log_dir = dir.join("logs");
        config.output.dir = dir.join("out");
        config
    }

    fn video() -> Video {
        SyntheticVideo {
            height: 24,
            width: 24,
            ..Default::default()
        }
        .generate()
        .unwrap()
    }

    #[test]
    fn delay_mode_writes_images_and_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.render.mode = RenderMode::Delay;
        let pipeline = Pipeline::new(config.clone()).unwrap();
        let video = video();
        let mask = Array2::from_elem((24, 24), true);

        let processed = process_video(&pipeline, &video, &mask, (12, 12)).unwrap();
        assert_eq!(processed.frames.dim(), video.frames.dim());
        for name in ["amplitude.png", "PTT.png", "snr.csv", "valid_mask.csv", "signal_ref.csv", "psd.csv", "time_delays.csv"] {
            let path = config.output.dir.join(name);
            assert!(path.exists(), "{} missing", name);
            assert!(processed.outputs.contains(&path));
        }
        let amplitude = image::open(config.output.dir.join("amplitude.png")).unwrap();
        assert_eq!((amplitude.width(), amplitude.height()), (24, 24));
    }

    #[test]
    fn intensity_mode_skips_delay_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.output.export_csv = false;
        let pipeline = Pipeline::new(config.clone()).unwrap();
        let mask = Array2::from_elem((24, 24), true);

        process_video(&pipeline, &video(), &mask, (12, 12)).unwrap();
        assert!(!config.output.dir.join("PTT.png").exists());
        assert!(!config.output.dir.join("snr.csv").exists());
        assert!(config.output.dir.join("amplitude.png").exists());
    }

    #[test]
    fn missing_mask_is_selected_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("masks").join("mask.npy");
        let frame = Array3::<u8>::zeros((6, 8, 3));
        let mask = resolve_mask(&path, &ScriptedSelector::default(), &frame).unwrap();
        assert!(mask.iter().all(|&v| v));
        assert_eq!(load_mask(&path).unwrap(), mask);
    }

    #[test]
    fn run_log_gets_a_summary_and_a_csv_row() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let summary = RunSummary {
            bpm: 120.0,
            n_segmented: 64,
            n_valid: 63,
            valid_fraction: 63.0 / 64.0,
            snr_threshold: 1.5,
            delay_range: Some((-0.1, 0.2)),
            outputs: vec![PathBuf::from("out/heatmap.avi")],
            elapsed: Duration::from_millis(1500),
        };
        write_run_log(&config, Path::new("face.mp4"), &summary).unwrap();
        write_run_log(&config, Path::new("face.mp4"), &summary).unwrap();

        let log = fs::read_to_string(config.processor.log_dir.join("rppg_ptt.log")).unwrap();
        assert!(log.contains("===== RUN face.mp4 ====="));
        assert!(log.contains("heart rate: 120.0 BPM"));
        let rows = fs::read_to_string(config.processor.log_dir.join("runs.csv")).unwrap();
        assert_eq!(rows.lines().count(), 3);
        assert!(rows.starts_with("video,bpm,"));

        let json_path = dir.path().join("summary.json");
        write_json(&json_path, &summary).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(value["n_valid"], 63);
        assert_eq!(value["delay_range"][1], 0.2);
    }
}
