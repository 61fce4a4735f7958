use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use tracing::info;

use crate::{
    assets::{AssetKind, AssetSelector},
    config::PipelineConfig,
    core::Rgba8,
    duration::{NormalizationPlan, OffsetPolicy, fit_audio},
    encode::{AudioInputConfig, EncodeConfig, FfmpegEncoder, write_pcm_f32le_file},
    error::{QuoteclipError, QuoteclipResult},
    layout::{LayoutParams, Measurer, TextLayoutEngine},
    media,
    quote::{self, QuoteText},
    timeline::{Compositor, VisualTrack},
};

/// Frames rendered and fed to the encoder per batch.
const CHUNK_FRAMES: u64 = 64;

/// Summary of one finished run.
#[derive(Clone, Debug)]
pub struct RenderedVideo {
    pub out_path: PathBuf,
    pub duration_sec: f64,
    pub frames_total: u64,
    pub quote: QuoteText,
    pub background: PathBuf,
    pub music: PathBuf,
}

/// Run the whole quote-to-video pipeline once, synchronously.
///
/// All randomness (asset picks, quote pick, trim offsets) flows through the
/// injected `rng`, so a seeded caller gets a reproducible run.
pub fn run_pipeline<R: Rng>(cfg: &PipelineConfig, rng: &mut R) -> QuoteclipResult<RenderedVideo> {
    cfg.validate()?;
    let canvas = cfg.canvas()?;
    let fps = cfg.fps()?;

    if !cfg.output.overwrite && cfg.output.path.exists() {
        return Err(QuoteclipError::validation(format!(
            "output file '{}' already exists",
            cfg.output.path.display()
        )));
    }

    let selector = AssetSelector::from_dirs(&cfg.assets.background_dir, &cfg.assets.music_dir)?;
    let background = selector.pick_background(rng).clone();
    let music = selector.pick_music(rng).clone();
    info!(background = %background.path.display(), music = %music.path.display(), "selected assets");

    let quotes = match (&cfg.quote.url, &cfg.quote.csv_path) {
        (Some(url), _) => quote::fetch_quotes(url, Duration::from_secs(cfg.quote.timeout_sec))?,
        (None, Some(path)) => quote::load_quotes_file(path)?,
        (None, None) => {
            return Err(QuoteclipError::no_quote_available(
                "no quote source configured (set quote.url or quote.csv_path)",
            ));
        }
    };
    let quote = quote::select_quote(&quotes, cfg.quote.selection, rng)?.clone();
    info!(body = quote.body(), author = ?quote.author(), "selected quote");

    let target_sec = cfg.target_duration().derive(quote.word_count())?;
    info!(target_sec, "derived target duration");

    let measurer = Measurer::select(&cfg.text.font_paths);
    let engine = TextLayoutEngine::new(measurer, layout_params(cfg)?);
    let overlay = engine.layout(&quote, canvas)?;
    info!(lines = overlay.block.lines.len(), "rendered text overlay");

    let visual = match background.kind {
        AssetKind::Image => {
            let frame = media::load_still_rgba8(&background.path, canvas)?;
            VisualTrack::fit_still(frame, canvas, fps, target_sec)?
        }
        AssetKind::Video => {
            let probe = media::probe_media(&background.path)?;
            info!(
                duration_sec = probe.duration_sec,
                width = ?probe.width,
                height = ?probe.height,
                has_audio = probe.has_audio,
                "probed background video"
            );
            if !probe.has_video {
                return Err(QuoteclipError::invalid_media_duration(format!(
                    "background '{}' has no video stream",
                    background.path.display()
                )));
            }
            let plan = NormalizationPlan::new(probe.duration_sec, target_sec)?;
            VisualTrack::fit_video(&background.path, plan, canvas, fps)?
        }
        AssetKind::Audio => {
            return Err(QuoteclipError::validation(
                "background pool returned an audio file (bug)",
            ));
        }
    };

    let pcm = media::decode_audio_f32_stereo(&music.path, media::MIX_SAMPLE_RATE)?;
    let offset_policy = if cfg.music.random_start {
        OffsetPolicy::RandomStart
    } else {
        OffsetPolicy::FromStart
    };
    let audio_plan =
        NormalizationPlan::with_policy(pcm.duration_sec(), target_sec, offset_policy, rng)?;
    let audio = fit_audio(&pcm, &audio_plan, cfg.music.volume)?;
    info!(
        repetitions = audio_plan.repetitions,
        start_offset_sec = audio_plan.start_offset_sec,
        "normalized audio"
    );

    let timeline = Compositor::new(canvas, fps).compose(
        visual,
        overlay,
        Some(audio),
        cfg.video.fade_in_sec,
        cfg.video.fade_out_sec,
        target_sec,
    )?;

    // Stage both the mixed audio and the encoded video in scratch locations;
    // the final path only ever receives a complete file.
    let mut audio_tmp = TempFileGuard(None);
    let audio_cfg = match &timeline.audio {
        Some(audio) => {
            let path = scratch_path("audio", "f32le");
            write_pcm_f32le_file(&audio.interleaved_f32, &path)?;
            audio_tmp.0 = Some(path.clone());
            Some(AudioInputConfig {
                path,
                sample_rate: audio.sample_rate,
                channels: audio.channels,
            })
        }
        None => None,
    };

    let staging = staging_path(&cfg.output.path);
    let mut staging_guard = TempFileGuard(Some(staging.clone()));
    let encode_cfg = EncodeConfig {
        audio: audio_cfg,
        ..EncodeConfig::mp4(&staging, canvas.width, canvas.height, fps.num)
    };

    let mut encoder = FfmpegEncoder::new(encode_cfg)?;
    let mut frame_idx = 0u64;
    while frame_idx < timeline.frames_total {
        let count = CHUNK_FRAMES.min(timeline.frames_total - frame_idx);
        for frame in timeline.render_chunk(frame_idx, count)? {
            encoder.encode_frame(&frame)?;
        }
        frame_idx += count;
    }
    encoder.finish()?;

    std::fs::rename(&staging, &cfg.output.path).map_err(|e| {
        QuoteclipError::encoding(format!(
            "failed to publish output to '{}': {e}",
            cfg.output.path.display()
        ))
    })?;
    staging_guard.0 = None;

    info!(out = %cfg.output.path.display(), frames = timeline.frames_total, "wrote video");
    Ok(RenderedVideo {
        out_path: cfg.output.path.clone(),
        duration_sec: timeline.duration_sec,
        frames_total: timeline.frames_total,
        quote,
        background: background.path,
        music: music.path,
    })
}

/// Render just the text overlay for a quote, for inspection.
pub fn render_overlay_png(
    cfg: &PipelineConfig,
    quote: &QuoteText,
    out_path: &Path,
) -> QuoteclipResult<()> {
    cfg.validate()?;
    let canvas = cfg.canvas()?;
    let measurer = Measurer::select(&cfg.text.font_paths);
    let engine = TextLayoutEngine::new(measurer, layout_params(cfg)?);
    let overlay = engine.layout(quote, canvas)?;

    crate::encode::ensure_parent_dir(out_path)?;
    overlay
        .image
        .save_with_format(out_path, image::ImageFormat::Png)
        .map_err(|e| {
            QuoteclipError::encoding(format!(
                "failed to write overlay '{}': {e}",
                out_path.display()
            ))
        })
}

fn layout_params(cfg: &PipelineConfig) -> QuoteclipResult<LayoutParams> {
    Ok(LayoutParams {
        font_size: cfg.text.font_size,
        author_font_size: cfg.text.author_font_size,
        color: Rgba8::parse(&cfg.text.color)?,
        panel_opacity: cfg.text.panel_opacity,
        max_chars_per_line: cfg.text.max_chars_per_line,
        stroke_width: cfg.text.stroke_width,
        stroke_color: Rgba8::parse(&cfg.text.stroke_color)?,
    })
}

/// Sibling of the final output so the publishing rename never crosses a
/// filesystem boundary.
fn staging_path(out_path: &Path) -> PathBuf {
    let file_name = out_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out.mp4".to_string());
    out_path.with_file_name(format!(".{file_name}.part"))
}

fn scratch_path(tag: &str, ext: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!(
        "quoteclip_{tag}_{}_{nanos}.{ext}",
        std::process::id()
    ))
}

struct TempFileGuard(Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn staging_path_is_a_hidden_sibling() {
        let s = staging_path(Path::new("out/dir/final.mp4"));
        assert_eq!(s.parent(), Some(Path::new("out/dir")));
        assert_eq!(s.file_name().unwrap().to_str().unwrap(), ".final.mp4.part");
    }

    #[test]
    fn temp_guard_removes_file_on_drop() {
        let path = scratch_path("guard_test", "tmp");
        std::fs::write(&path, "x").unwrap();
        assert!(path.exists());
        drop(TempFileGuard(Some(path.clone())));
        assert!(!path.exists());
    }

    #[test]
    fn pipeline_fails_fast_without_quote_source() {
        let dir = std::env::temp_dir().join(format!("quoteclip_pipe_{}", std::process::id()));
        let bg = dir.join("bg");
        let music = dir.join("music");
        std::fs::create_dir_all(&bg).unwrap();
        std::fs::create_dir_all(&music).unwrap();
        std::fs::write(bg.join("a.png"), "x").unwrap();
        std::fs::write(music.join("a.mp3"), "x").unwrap();

        let mut cfg = PipelineConfig::default();
        cfg.assets.background_dir = bg;
        cfg.assets.music_dir = music;

        let mut rng = StdRng::seed_from_u64(0);
        let err = run_pipeline(&cfg, &mut rng).unwrap_err();
        assert!(matches!(err, QuoteclipError::NoQuoteAvailable(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn pipeline_reports_empty_asset_pool() {
        let mut cfg = PipelineConfig::default();
        cfg.assets.background_dir = PathBuf::from("/definitely/not/here");
        let mut rng = StdRng::seed_from_u64(0);
        let err = run_pipeline(&cfg, &mut rng).unwrap_err();
        assert!(matches!(err, QuoteclipError::AssetPoolEmpty(_)));
    }
}
