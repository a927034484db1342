use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use log::{debug, info};
use ndarray::{s, Array3, Array4, ArrayView4};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Decoded RGB video held fully in memory.
#[derive(Debug, Clone)]
pub struct Video {
    /// `(n_frames, height, width, 3)`, RGB order.
    pub frames: Array4<u8>,
    pub fps: f64,
}

impl Video {
    pub fn new(frames: Array4<u8>, fps: f64) -> Result<Self> {
        if frames.dim().3 != 3 {
            return Err(PipelineError::ShapeMismatch(format!(
                "expected 3 colour channels, got {}",
                frames.dim().3
            )));
        }
        if !(fps > 0.0) {
            return Err(PipelineError::Video(format!("invalid frame rate {}", fps)));
        }
        Ok(Video { frames, fps })
    }

    pub fn n_frames(&self) -> usize {
        self.frames.dim().0
    }

    pub fn height(&self) -> usize {
        self.frames.dim().1
    }

    pub fn width(&self) -> usize {
        self.frames.dim().2
    }

    pub fn frame(&self, t: usize) -> Option<Array3<u8>> {
        (t < self.n_frames()).then(|| self.frames.slice(s![t, .., .., ..]).to_owned())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub width: usize,
    pub height: usize,
    pub framerate: f64,
    pub codec: String,
}

/// Thin wrapper over the `ffmpeg` / `ffprobe` executables. Frames travel as
/// raw `rgb24` through pipes.
pub struct FFmpeg {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FFmpeg {
    pub fn new() -> Result<Self> {
        Ok(FFmpeg {
            ffmpeg_path: which_command("ffmpeg")?,
            ffprobe_path: which_command("ffprobe")?,
        })
    }

    pub fn probe<P: AsRef<Path>>(&self, input: P) -> Result<VideoInfo> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v", "quiet",
                "-print_format", "json",
                "-show_streams",
                "-select_streams", "v:0",
            ])
            .arg(input.as_ref())
            .output()
            .map_err(|e| PipelineError::Video(format!("Failed to execute ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(PipelineError::Video(format!(
                "ffprobe failed on {}: {}",
                input.as_ref().display(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let json: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| PipelineError::Video(format!("Failed to parse ffprobe output: {}", e)))?;
        let stream = json["streams"]
            .as_array()
            .and_then(|s| s.first())
            .ok_or_else(|| PipelineError::Video("No video stream found".to_string()))?;

        let framerate = parse_framerate(
            stream["r_frame_rate"]
                .as_str()
                .or_else(|| stream["avg_frame_rate"].as_str())
                .unwrap_or("0"),
        );

        Ok(VideoInfo {
            width: stream["width"].as_u64().unwrap_or(0) as usize,
            height: stream["height"].as_u64().unwrap_or(0) as usize,
            framerate,
            codec: stream["codec_name"].as_str().unwrap_or("unknown").to_string(),
        })
    }

    /// Decodes every frame of `input` into memory.
    pub fn load<P: AsRef<Path>>(&self, input: P) -> Result<Video> {
        let info = self.probe(&input)?;
        if info.width == 0 || info.height == 0 {
            return Err(PipelineError::Video(format!(
                "{} reports an empty frame size",
                input.as_ref().display()
            )));
        }
        debug!(
            "decoding {} ({}x{} @ {:.3} fps, {})",
            input.as_ref().display(),
            info.width,
            info.height,
            info.framerate,
            info.codec
        );

        let output = Command::new(&self.ffmpeg_path)
            .args(["-v", "error", "-i"])
            .arg(input.as_ref())
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .output()
            .map_err(|e| PipelineError::Video(format!("Failed to execute ffmpeg: {}", e)))?;

        if !output.status.success() {
            return Err(PipelineError::Video(format!(
                "ffmpeg decode failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let frames = frames_from_raw(output.stdout, info.height, info.width)?;
        info!(
            "loaded {} frames of {}x{} at {:.3} fps",
            frames.dim().0,
            info.width,
            info.height,
            info.framerate
        );
        Video::new(frames, info.framerate)
    }

    /// Encodes `frames` with `codec` into `output`, overwriting it.
    pub fn write<P: AsRef<Path>>(&self, frames: ArrayView4<u8>, fps: f64, output: P, codec: &str) -> Result<()> {
        let (n_frames, height, width, _) = frames.dim();
        let child = Command::new(&self.ffmpeg_path)
            .args(["-v", "error", "-y", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", width, height)])
            .args(["-r", &format!("{}", fps)])
            .args(["-i", "-", "-c:v", codec])
            .arg(output.as_ref())
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PipelineError::Video(format!("Failed to execute ffmpeg: {}", e)))?;

        let raw = frames.as_standard_layout();
        let bytes = raw
            .as_slice()
            .ok_or_else(|| PipelineError::Video("frame buffer is not contiguous".to_string()))?;
        feed_encoder(child, bytes)?;
        info!("wrote {} frames to {}", n_frames, output.as_ref().display());
        Ok(())
    }
}

/// Pipes `bytes` into the encoder's stdin and waits for it. If the encoder
/// exits early its stderr is reported instead of the broken pipe.
fn feed_encoder(mut child: Child, bytes: &[u8]) -> Result<()> {
    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(bytes),
        None => return Err(PipelineError::Video("ffmpeg stdin unavailable".to_string())),
    };

    let result = child
        .wait_with_output()
        .map_err(|e| PipelineError::Video(format!("ffmpeg did not finish: {}", e)))?;
    let stderr = String::from_utf8_lossy(&result.stderr);
    if let Err(e) = written {
        return Err(PipelineError::Video(format!(
            "ffmpeg stopped reading frames ({}): {}",
            e,
            stderr.trim()
        )));
    }
    if !result.status.success() {
        return Err(PipelineError::Video(format!("ffmpeg encode failed: {}", stderr.trim())));
    }
    Ok(())
}

/// Reshapes packed `rgb24` bytes into `(n, h, w, 3)`.
pub fn frames_from_raw(raw: Vec<u8>, height: usize, width: usize) -> Result<Array4<u8>> {
    let frame_len = height * width * 3;
    if frame_len == 0 || raw.len() % frame_len != 0 {
        return Err(PipelineError::Video(format!(
            "{} bytes do not divide into {}x{} rgb24 frames",
            raw.len(),
            width,
            height
        )));
    }
    let n_frames = raw.len() / frame_len;
    Array4::from_shape_vec((n_frames, height, width, 3), raw)
        .map_err(|e| PipelineError::ShapeMismatch(format!("raw video: {}", e)))
}

/// Parses ffprobe rates such as `"30000/1001"` or `"25"`.
pub fn parse_framerate(fps_str: &str) -> f64 {
    if let Some((num, den)) = fps_str.split_once('/') {
        let num: f64 = num.trim().parse().unwrap_or(0.0);
        let den: f64 = den.trim().parse().unwrap_or(1.0);
        return if den != 0.0 { num / den } else { 0.0 };
    }
    fps_str.trim().parse().unwrap_or(0.0)
}

fn which_command(name: &str) -> Result<String> {
    let output = Command::new("which")
        .arg(name)
        .output()
        .map_err(|e| PipelineError::Video(format!("Failed to find {}: {}", name, e)))?;

    if !output.status.success() {
        return Err(PipelineError::Video(format!("{} not found in PATH", name)));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn parses_rational_framerates() {
        assert_abs_diff_eq!(parse_framerate("30000/1001"), 29.97, epsilon = 1e-3);
        assert_eq!(parse_framerate("25"), 25.0);
        assert_eq!(parse_framerate("30/0"), 0.0);
        assert_eq!(parse_framerate("garbage"), 0.0);
    }

    #[test]
    fn raw_bytes_become_frames() {
        let raw: Vec<u8> = (0..2 * 2 * 3 * 3).map(|v| v as u8).collect();
        let frames = frames_from_raw(raw, 2, 3).unwrap();
        assert_eq!(frames.dim(), (2, 2, 3, 3));
        // Second frame, row 1, column 2, blue.
        assert_eq!(frames[[1, 1, 2, 2]], 35);
        assert!(frames_from_raw(vec![0; 10], 2, 3).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn early_encoder_exit_reports_its_stderr() {
        let child = Command::new("sh")
            .args(["-c", "echo 'Unknown encoder bogus' >&2; exit 1"])
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        // Larger than a pipe buffer, so the write fails once the child is gone.
        let frames = vec![0u8; 4 << 20];
        let err = feed_encoder(child, &frames).unwrap_err();
        assert!(matches!(err, PipelineError::Video(_)));
        assert!(err.to_string().contains("Unknown encoder bogus"), "{}", err);
    }

    #[cfg(unix)]
    #[test]
    fn encoder_that_drains_its_input_succeeds() {
        let child = Command::new("sh")
            .args(["-c", "cat > /dev/null"])
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        feed_encoder(child, &vec![7u8; 1 << 20]).unwrap();
    }

    #[test]
    fn rejects_non_rgb_frames() {
        assert!(Video::new(Array4::zeros((1, 2, 2, 4)), 30.0).is_err());
        assert!(Video::new(Array4::zeros((1, 2, 2, 3)), 0.0).is_err());
        let video = Video::new(Array4::zeros((2, 4, 5, 3)), 30.0).unwrap();
        assert_eq!((video.n_frames(), video.height(), video.width()), (2, 4, 5));
        assert!(video.frame(2).is_none());
    }
}
