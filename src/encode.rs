use std::{
    io::Read,
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
};

use crate::error::{QuoteclipError, QuoteclipResult};

/// Pre-mixed PCM file fed to ffmpeg as a second input.
#[derive(Clone, Debug)]
pub struct AudioInputConfig {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Encoder settings. Codec/preset values are passed through to ffmpeg
/// untouched; the pipeline does not reinterpret them.
#[derive(Clone, Debug)]
pub struct EncodeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub out_path: PathBuf,
    pub overwrite: bool,
    pub audio: Option<AudioInputConfig>,
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
}

impl EncodeConfig {
    pub fn mp4(out_path: impl Into<PathBuf>, width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            out_path: out_path.into(),
            overwrite: true,
            audio: None,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: "faster".to_string(),
        }
    }

    pub fn validate(&self) -> QuoteclipResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(QuoteclipError::validation(
                "encode width/height must be non-zero",
            ));
        }
        if self.fps == 0 {
            return Err(QuoteclipError::validation("encode fps must be non-zero"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            // Default settings target yuv420p output for maximum compatibility.
            return Err(QuoteclipError::validation(
                "encode width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        if let Some(audio) = &self.audio {
            if audio.sample_rate == 0 {
                return Err(QuoteclipError::validation(
                    "audio sample_rate must be non-zero when audio is enabled",
                ));
            }
            if audio.channels == 0 {
                return Err(QuoteclipError::validation(
                    "audio channels must be non-zero when audio is enabled",
                ));
            }
        }
        Ok(())
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> QuoteclipResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Streams opaque RGBA8 frames into the system `ffmpeg` binary.
///
/// The system binary is used rather than linking FFmpeg to avoid native dev
/// header/lib requirements.
pub struct FfmpegEncoder {
    cfg: EncodeConfig,
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    frame_bytes: usize,
}

impl FfmpegEncoder {
    pub fn new(cfg: EncodeConfig) -> QuoteclipResult<Self> {
        cfg.validate()?;
        ensure_parent_dir(&cfg.out_path)?;

        if !cfg.overwrite && cfg.out_path.exists() {
            return Err(QuoteclipError::validation(format!(
                "output file '{}' already exists",
                cfg.out_path.display()
            )));
        }

        if !crate::media::is_ffmpeg_on_path() {
            return Err(QuoteclipError::encoding(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        if cfg.overwrite {
            cmd.arg("-y");
        } else {
            cmd.arg("-n");
        }

        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
        ]);

        if let Some(audio) = &cfg.audio {
            cmd.args([
                "-f",
                "f32le",
                "-ar",
                &audio.sample_rate.to_string(),
                "-ac",
                &audio.channels.to_string(),
                "-i",
            ])
            .arg(&audio.path)
            .args([
                "-c:v",
                &cfg.video_codec,
                "-preset",
                &cfg.preset,
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                &cfg.audio_codec,
                "-shortest",
                "-movflags",
                "+faststart",
            ]);
        } else {
            cmd.args([
                "-an",
                "-c:v",
                &cfg.video_codec,
                "-preset",
                &cfg.preset,
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ]);
        }
        cmd.arg(&cfg.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            QuoteclipError::encoding(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| QuoteclipError::encoding("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| QuoteclipError::encoding("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        Ok(Self {
            frame_bytes: (cfg.width * cfg.height * 4) as usize,
            cfg,
            child,
            stdin: Some(stdin),
            stderr_drain: Some(stderr_drain),
        })
    }

    pub fn encode_frame(&mut self, frame: &[u8]) -> QuoteclipResult<()> {
        if frame.len() != self.frame_bytes {
            return Err(QuoteclipError::validation(format!(
                "frame size mismatch: got {} bytes, expected {} ({}x{}x4)",
                frame.len(),
                self.frame_bytes,
                self.cfg.width,
                self.cfg.height
            )));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(QuoteclipError::encoding("ffmpeg encoder is already finalized"));
        };

        use std::io::Write as _;
        stdin.write_all(frame).map_err(|e| {
            QuoteclipError::encoding(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(())
    }

    pub fn finish(mut self) -> QuoteclipResult<()> {
        drop(self.stdin.take());

        let status = self.child.wait().map_err(|e| {
            QuoteclipError::encoding(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| QuoteclipError::encoding("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| QuoteclipError::encoding(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(QuoteclipError::encoding(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Write interleaved f32 PCM to a raw little-endian `.f32le` file for muxing.
pub fn write_pcm_f32le_file(samples_interleaved: &[f32], out_path: &Path) -> QuoteclipResult<()> {
    ensure_parent_dir(out_path)?;
    let mut bytes = Vec::<u8>::with_capacity(samples_interleaved.len() * 4);
    for &sample in samples_interleaved {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    std::fs::write(out_path, bytes).map_err(|e| {
        QuoteclipError::encoding(format!(
            "failed to write mixed audio file '{}': {e}",
            out_path.display()
        ))
    })
}
