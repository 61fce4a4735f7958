use std::path::{Path, PathBuf};
use std::process::Command;

use crate::{
    core::{Canvas, Fps},
    error::{QuoteclipError, QuoteclipResult},
};

/// Sample rate all audio is resampled to before mixing and muxing.
pub const MIX_SAMPLE_RATE: u32 = 48_000;

/// Stream facts reported by `ffprobe` for one media file.
#[derive(Clone, Debug)]
pub struct MediaProbe {
    pub source_path: PathBuf,
    pub duration_sec: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub has_video: bool,
    pub has_audio: bool,
}

/// Decoded interleaved PCM.
#[derive(Clone, Debug)]
pub struct AudioPcm {
    pub sample_rate: u32,
    pub channels: u16,
    pub interleaved_f32: Vec<f32>,
}

impl AudioPcm {
    /// Number of sample frames (one per channel set).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.interleaved_f32.len() / usize::from(self.channels)
        }
    }

    /// Source duration in seconds.
    pub fn duration_sec(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / f64::from(self.sample_rate)
        }
    }
}

/// Probe duration and stream layout with `ffprobe`.
pub fn probe_media(source_path: &Path) -> QuoteclipResult<MediaProbe> {
    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .output()
        .map_err(|e| QuoteclipError::encoding(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(QuoteclipError::encoding(format!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    parse_probe_output(&out.stdout, source_path)
}

fn parse_probe_output(json: &[u8], source_path: &Path) -> QuoteclipResult<MediaProbe> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let parsed: ProbeOut = serde_json::from_slice(json)
        .map_err(|e| QuoteclipError::encoding(format!("ffprobe json parse failed: {e}")))?;

    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));
    let duration_sec = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(MediaProbe {
        source_path: source_path.to_path_buf(),
        duration_sec,
        width: video_stream.and_then(|s| s.width),
        height: video_stream.and_then(|s| s.height),
        has_video: video_stream.is_some(),
        has_audio,
    })
}

/// Load a still image and resize it to the output canvas as opaque RGBA8.
pub fn load_still_rgba8(path: &Path, canvas: Canvas) -> QuoteclipResult<Vec<u8>> {
    let img = image::open(path).map_err(|e| {
        QuoteclipError::encoding(format!(
            "failed to load background image '{}': {e}",
            path.display()
        ))
    })?;
    let resized = img
        .resize_exact(
            canvas.width,
            canvas.height,
            image::imageops::FilterType::Triangle,
        )
        .to_rgba8();
    let mut data = resized.into_raw();
    for px in data.chunks_exact_mut(4) {
        px[3] = 255;
    }
    Ok(data)
}

/// Decode `frame_count` frames starting at `start_time_sec`, scaled to the
/// canvas and resampled to the timeline frame rate.
///
/// Near the end of a source ffmpeg can come up short; the last decoded frame
/// is repeated to fill the requested count.
pub fn decode_video_frames_rgba8(
    source_path: &Path,
    start_time_sec: f64,
    frame_count: u32,
    canvas: Canvas,
    fps: Fps,
) -> QuoteclipResult<Vec<Vec<u8>>> {
    if frame_count == 0 {
        return Ok(Vec::new());
    }

    let filter = scale_fps_filter(canvas, fps);
    let out = Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{start_time_sec:.9}")])
        .arg("-i")
        .arg(source_path)
        .args([
            "-vf",
            &filter,
            "-frames:v",
            &frame_count.to_string(),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ])
        .output()
        .map_err(|e| QuoteclipError::encoding(format!("failed to run ffmpeg for video decode: {e}")))?;

    if !out.status.success() {
        return Err(QuoteclipError::encoding(format!(
            "ffmpeg video decode failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let expected_len = canvas.frame_bytes();
    if out.stdout.len() < expected_len || !out.stdout.len().is_multiple_of(expected_len) {
        return Err(QuoteclipError::encoding(format!(
            "decoded video batch has invalid size: got {} bytes, expected multiples of {expected_len}",
            out.stdout.len()
        )));
    }

    let available = (out.stdout.len() / expected_len).min(frame_count as usize);
    let mut frames = Vec::with_capacity(frame_count as usize);
    for idx in 0..available {
        let off = idx * expected_len;
        let mut frame = out.stdout[off..off + expected_len].to_vec();
        for px in frame.chunks_exact_mut(4) {
            px[3] = 255;
        }
        frames.push(frame);
    }
    while frames.len() < frame_count as usize {
        let last = frames
            .last()
            .cloned()
            .ok_or_else(|| QuoteclipError::encoding("ffmpeg returned no video frames"))?;
        frames.push(last);
    }
    Ok(frames)
}

/// Decode an audio file to interleaved stereo f32 PCM at `sample_rate`.
pub fn decode_audio_f32_stereo(path: &Path, sample_rate: u32) -> QuoteclipResult<AudioPcm> {
    let out = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            "2",
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| QuoteclipError::encoding(format!("failed to run ffmpeg for audio decode: {e}")))?;

    if !out.status.success() {
        let msg = String::from_utf8_lossy(&out.stderr);
        // ffmpeg reports a missing audio stream as an error. Surface it as
        // empty PCM so duration normalization can raise the typed failure.
        if msg.contains("Stream specifier")
            || msg.contains("matches no streams")
            || msg.contains("does not contain any stream")
        {
            return Ok(AudioPcm {
                sample_rate,
                channels: 2,
                interleaved_f32: Vec::new(),
            });
        }
        return Err(QuoteclipError::encoding(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            msg.trim()
        )));
    }

    if !out.stdout.len().is_multiple_of(4) {
        return Err(QuoteclipError::encoding(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }
    let mut pcm = Vec::<f32>::with_capacity(out.stdout.len() / 4);
    for chunk in out.stdout.chunks_exact(4) {
        pcm.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }

    Ok(AudioPcm {
        sample_rate,
        channels: 2,
        interleaved_f32: pcm,
    })
}

/// Scale-and-resample filter chain for video decode. The frame rate is kept
/// rational so non-integer rates like 30000/1001 survive intact.
fn scale_fps_filter(canvas: Canvas, fps: Fps) -> String {
    format!(
        "scale={}:{}:flags=bilinear,fps={}/{}",
        canvas.width, canvas.height, fps.num, fps.den
    )
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_json_reports_stream_layout() {
        let json = br#"{
            "streams": [
                {"codec_type": "video", "width": 1920, "height": 1080},
                {"codec_type": "audio"}
            ],
            "format": {"duration": "12.480000"}
        }"#;
        let probe = parse_probe_output(json, Path::new("clip.mp4")).unwrap();
        assert!(probe.has_video);
        assert!(probe.has_audio);
        assert_eq!(probe.width, Some(1920));
        assert_eq!(probe.height, Some(1080));
        assert!((probe.duration_sec - 12.48).abs() < 1e-9);
    }

    #[test]
    fn probe_json_without_video_stream() {
        let json = br#"{
            "streams": [{"codec_type": "audio"}],
            "format": {"duration": "30.0"}
        }"#;
        let probe = parse_probe_output(json, Path::new("song.mp4")).unwrap();
        assert!(!probe.has_video);
        assert!(probe.has_audio);
        assert_eq!(probe.width, None);
    }

    #[test]
    fn decode_filter_keeps_the_rational_rate() {
        let canvas = Canvas::new(1280, 720).unwrap();
        assert_eq!(
            scale_fps_filter(canvas, Fps::new(24, 1).unwrap()),
            "scale=1280:720:flags=bilinear,fps=24/1"
        );
        // NTSC rates must not collapse to the numerator.
        assert_eq!(
            scale_fps_filter(canvas, Fps::new(30_000, 1_001).unwrap()),
            "scale=1280:720:flags=bilinear,fps=30000/1001"
        );
    }

    #[test]
    fn pcm_frame_and_duration_math() {
        let pcm = AudioPcm {
            sample_rate: 48_000,
            channels: 2,
            interleaved_f32: vec![0.0; 48_000 * 2],
        };
        assert_eq!(pcm.frames(), 48_000);
        assert!((pcm.duration_sec() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_pcm_has_zero_duration() {
        let pcm = AudioPcm {
            sample_rate: 48_000,
            channels: 2,
            interleaved_f32: Vec::new(),
        };
        assert_eq!(pcm.frames(), 0);
        assert_eq!(pcm.duration_sec(), 0.0);
    }
}
