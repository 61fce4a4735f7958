use tracing::debug;

use crate::{
    core::{Canvas, Fps, mul_div255},
    duration::{NormalizationPlan, NormalizedAudio},
    error::{QuoteclipError, QuoteclipResult},
    layout::RasterOverlay,
    media,
};

/// Audio duration tolerance expressed in samples (one decode block).
const AUDIO_BLOCK_SAMPLES: u64 = 1024;

/// Where background pixels come from.
#[derive(Debug)]
enum VisualSource {
    /// One canvas-sized opaque RGBA frame, held for the whole timeline.
    Still { frame: Vec<u8> },
    /// A video file, looped/trimmed per the normalization plan and decoded
    /// on demand.
    Video {
        source_path: std::path::PathBuf,
        plan: NormalizationPlan,
    },
}

/// The background track, already normalized to the target duration.
#[derive(Debug)]
pub struct VisualTrack {
    pub canvas: Canvas,
    pub fps: Fps,
    pub frames_total: u64,
    source: VisualSource,
}

impl VisualTrack {
    /// Fit a still image to the target duration. A still has no intrinsic
    /// length, so normalization reduces to holding the frame.
    pub fn fit_still(
        frame: Vec<u8>,
        canvas: Canvas,
        fps: Fps,
        target_sec: f64,
    ) -> QuoteclipResult<Self> {
        if frame.len() != canvas.frame_bytes() {
            return Err(QuoteclipError::validation(
                "still frame size does not match canvas",
            ));
        }
        let frames_total = fps.secs_to_frames_round(target_sec);
        if frames_total == 0 {
            return Err(QuoteclipError::validation(
                "target duration is shorter than one frame",
            ));
        }
        Ok(Self {
            canvas,
            fps,
            frames_total,
            source: VisualSource::Still { frame },
        })
    }

    /// Fit a background video to the target duration via its plan.
    pub fn fit_video(
        source_path: impl Into<std::path::PathBuf>,
        plan: NormalizationPlan,
        canvas: Canvas,
        fps: Fps,
    ) -> QuoteclipResult<Self> {
        let frames_total = fps.secs_to_frames_round(plan.target_duration_sec);
        if frames_total == 0 {
            return Err(QuoteclipError::validation(
                "target duration is shorter than one frame",
            ));
        }
        Ok(Self {
            canvas,
            fps,
            frames_total,
            source: VisualSource::Video {
                source_path: source_path.into(),
                plan,
            },
        })
    }

    pub fn duration_sec(&self) -> f64 {
        self.fps.frames_to_secs(self.frames_total)
    }

    /// Produce `count` opaque background frames starting at `start_frame`.
    ///
    /// Video sources decode one run per repetition so a loop seam never lands
    /// inside a single ffmpeg invocation.
    fn frames_chunk(&self, start_frame: u64, count: u64) -> QuoteclipResult<Vec<Vec<u8>>> {
        let end = (start_frame + count).min(self.frames_total);
        match &self.source {
            VisualSource::Still { frame } => {
                Ok((start_frame..end).map(|_| frame.clone()).collect())
            }
            VisualSource::Video { source_path, plan } => {
                let mut frames = Vec::with_capacity((end - start_frame) as usize);
                let mut f = start_frame;
                while f < end {
                    let t = self.fps.frames_to_secs(f);
                    let rep = plan.repetition_index(t);
                    let rep_end_t = if plan.is_looped() {
                        (f64::from(rep) + 1.0) * plan.source_duration_sec
                    } else {
                        plan.target_duration_sec
                    };
                    let mut boundary = (rep_end_t * self.fps.as_f64()).ceil() as u64;
                    if boundary <= f {
                        boundary = f + 1;
                    }
                    let run_end = boundary.min(end);
                    let run_len = (run_end - f) as u32;

                    let decoded = media::decode_video_frames_rgba8(
                        source_path,
                        plan.source_time_at(t),
                        run_len,
                        self.canvas,
                        self.fps,
                    )?;
                    frames.extend(decoded);
                    f = run_end;
                }
                Ok(frames)
            }
        }
    }
}

/// The assembled timeline for one run: normalized visual track, overlay,
/// fades, and the attached audio. Built fresh per invocation and discarded
/// after export.
#[derive(Debug)]
pub struct TimelineSpec {
    pub canvas: Canvas,
    pub fps: Fps,
    pub duration_sec: f64,
    pub frames_total: u64,
    pub fade_in_sec: f64,
    pub fade_out_sec: f64,
    visual: VisualTrack,
    overlay: Vec<u8>,
    pub audio: Option<NormalizedAudio>,
}

impl TimelineSpec {
    /// Fade envelope applied to the combined visual (and, during compose, to
    /// the audio): linear ramps at both ends.
    pub fn fade_gain_at(&self, t_sec: f64) -> f32 {
        fade_gain(t_sec, self.duration_sec, self.fade_in_sec, self.fade_out_sec)
    }

    /// Render `count` fully-composited opaque frames starting at
    /// `start_frame`: background, then overlay, then the fade envelope.
    pub fn render_chunk(&self, start_frame: u64, count: u64) -> QuoteclipResult<Vec<Vec<u8>>> {
        let mut frames = self.visual.frames_chunk(start_frame, count)?;
        for (i, frame) in frames.iter_mut().enumerate() {
            composite_over(frame, &self.overlay)?;
            let t = self.fps.frames_to_secs(start_frame + i as u64);
            apply_fade(frame, self.fade_gain_at(t));
        }
        Ok(frames)
    }
}

/// Stacks the layers into a [`TimelineSpec`], rejecting any layer whose
/// duration disagrees with the target. Normalization itself is the duration
/// module's job; the compositor only verifies.
pub struct Compositor {
    pub canvas: Canvas,
    pub fps: Fps,
}

impl Compositor {
    pub fn new(canvas: Canvas, fps: Fps) -> Self {
        Self { canvas, fps }
    }

    pub fn compose(
        &self,
        visual: VisualTrack,
        overlay: RasterOverlay,
        audio: Option<NormalizedAudio>,
        fade_in_sec: f64,
        fade_out_sec: f64,
        target_sec: f64,
    ) -> QuoteclipResult<TimelineSpec> {
        if visual.canvas != self.canvas || visual.fps != self.fps {
            return Err(QuoteclipError::timeline_mismatch(
                "visual track canvas/fps differs from the compositor's",
            ));
        }

        let frame_tolerance = self.fps.frame_duration_secs();
        if (visual.duration_sec() - target_sec).abs() > frame_tolerance {
            return Err(QuoteclipError::timeline_mismatch(format!(
                "visual track is {:.3}s, target is {target_sec:.3}s",
                visual.duration_sec()
            )));
        }

        if overlay.image.width() != self.canvas.width
            || overlay.image.height() != self.canvas.height
        {
            return Err(QuoteclipError::timeline_mismatch(format!(
                "overlay is {}x{}, canvas is {}x{}",
                overlay.image.width(),
                overlay.image.height(),
                self.canvas.width,
                self.canvas.height
            )));
        }

        let audio = match audio {
            Some(mut a) => {
                let sr = f64::from(a.sample_rate);
                let tolerance_sec = AUDIO_BLOCK_SAMPLES as f64 / sr;
                if (a.segment.target_duration_sec - target_sec).abs() > tolerance_sec {
                    return Err(QuoteclipError::timeline_mismatch(format!(
                        "audio segment targets {:.3}s, timeline is {target_sec:.3}s",
                        a.segment.target_duration_sec
                    )));
                }
                let actual_sec = a.target_frames() as f64 / sr;
                if (actual_sec - target_sec).abs() > tolerance_sec {
                    return Err(QuoteclipError::timeline_mismatch(format!(
                        "audio PCM is {actual_sec:.3}s, timeline is {target_sec:.3}s"
                    )));
                }

                // The audio envelope gets the same fades as the visual.
                apply_audio_fades(&mut a, fade_in_sec, fade_out_sec, target_sec);
                Some(a)
            }
            None => None,
        };

        let frames_total = visual.frames_total;
        debug!(frames_total, target_sec, "composed timeline");
        Ok(TimelineSpec {
            canvas: self.canvas,
            fps: self.fps,
            duration_sec: target_sec,
            frames_total,
            fade_in_sec,
            fade_out_sec,
            visual,
            overlay: overlay.image.into_raw(),
            audio,
        })
    }
}

fn fade_gain(t_sec: f64, duration_sec: f64, fade_in_sec: f64, fade_out_sec: f64) -> f32 {
    let mut gain = 1.0f32;
    if fade_in_sec > 0.0 {
        gain *= ((t_sec / fade_in_sec).clamp(0.0, 1.0)) as f32;
    }
    if fade_out_sec > 0.0 {
        let remaining = (duration_sec - t_sec).max(0.0);
        gain *= ((remaining / fade_out_sec).clamp(0.0, 1.0)) as f32;
    }
    gain
}

fn apply_audio_fades(audio: &mut NormalizedAudio, fade_in_sec: f64, fade_out_sec: f64, duration_sec: f64) {
    if fade_in_sec <= 0.0 && fade_out_sec <= 0.0 {
        return;
    }
    let sr = f64::from(audio.sample_rate);
    let channels = usize::from(audio.channels);
    for (frame_idx, frame) in audio.interleaved_f32.chunks_exact_mut(channels).enumerate() {
        let t = frame_idx as f64 / sr;
        let gain = fade_gain(t, duration_sec, fade_in_sec, fade_out_sec);
        if gain < 1.0 {
            for sample in frame {
                *sample *= gain;
            }
        }
    }
}

/// Composite a straight-alpha overlay over an opaque base frame, in place.
pub fn composite_over(base: &mut [u8], overlay: &[u8]) -> QuoteclipResult<()> {
    if base.len() != overlay.len() || !base.len().is_multiple_of(4) {
        return Err(QuoteclipError::validation(
            "composite_over expects equal-length rgba8 buffers",
        ));
    }

    for (d, s) in base.chunks_exact_mut(4).zip(overlay.chunks_exact(4)) {
        let a = u16::from(s[3]);
        if a == 0 {
            continue;
        }
        if a == 255 {
            d[0] = s[0];
            d[1] = s[1];
            d[2] = s[2];
            d[3] = 255;
            continue;
        }
        let inv = 255 - a;
        d[0] = (mul_div255(u16::from(s[0]), a) + mul_div255(u16::from(d[0]), inv)).min(255) as u8;
        d[1] = (mul_div255(u16::from(s[1]), a) + mul_div255(u16::from(d[1]), inv)).min(255) as u8;
        d[2] = (mul_div255(u16::from(s[2]), a) + mul_div255(u16::from(d[2]), inv)).min(255) as u8;
        d[3] = 255;
    }
    Ok(())
}

/// Scale an opaque frame toward black by `gain` (the fade envelope).
pub fn apply_fade(frame: &mut [u8], gain: f32) {
    if gain >= 1.0 {
        return;
    }
    let gain = gain.max(0.0);
    let scaled = (gain * 255.0).round() as u16;
    for px in frame.chunks_exact_mut(4) {
        px[0] = mul_div255(u16::from(px[0]), scaled) as u8;
        px[1] = mul_div255(u16::from(px[1]), scaled) as u8;
        px[2] = mul_div255(u16::from(px[2]), scaled) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::{AudioSegment, NormalizedAudio};
    use crate::layout::{LayoutParams, Measurer, MonoMeasurer, TextLayoutEngine};
    use crate::quote::QuoteText;

    fn canvas() -> Canvas {
        Canvas::new(64, 32).unwrap()
    }

    fn fps() -> Fps {
        Fps::new(24, 1).unwrap()
    }

    fn still_track(target_sec: f64) -> VisualTrack {
        let frame = vec![255u8; canvas().frame_bytes()];
        VisualTrack::fit_still(frame, canvas(), fps(), target_sec).unwrap()
    }

    fn overlay_for(c: Canvas) -> crate::layout::RasterOverlay {
        let engine = TextLayoutEngine::new(
            Measurer::Mono(MonoMeasurer::default()),
            LayoutParams {
                font_size: 8.0,
                author_font_size: 6.0,
                panel_opacity: 0.0,
                ..LayoutParams::default()
            },
        );
        let quote = QuoteText::new("Go", None).unwrap();
        engine.layout(&quote, c).unwrap()
    }

    fn silent_audio(target_sec: f64, sample_rate: u32) -> NormalizedAudio {
        let frames = (target_sec * f64::from(sample_rate)).round() as usize;
        NormalizedAudio {
            segment: AudioSegment {
                source_duration_sec: target_sec,
                target_duration_sec: target_sec,
                start_offset_sec: 0.0,
            },
            sample_rate,
            channels: 2,
            interleaved_f32: vec![1.0; frames * 2],
        }
    }

    #[test]
    fn compose_accepts_matching_layers() {
        let comp = Compositor::new(canvas(), fps());
        let timeline = comp
            .compose(still_track(2.0), overlay_for(canvas()), None, 0.0, 0.0, 2.0)
            .unwrap();
        assert_eq!(timeline.frames_total, 48);
    }

    #[test]
    fn compose_rejects_visual_duration_mismatch() {
        let comp = Compositor::new(canvas(), fps());
        let err = comp
            .compose(still_track(5.0), overlay_for(canvas()), None, 0.0, 0.0, 2.0)
            .unwrap_err();
        assert!(matches!(err, QuoteclipError::TimelineMismatch(_)));
    }

    #[test]
    fn compose_rejects_wrong_size_overlay() {
        let comp = Compositor::new(canvas(), fps());
        let other = Canvas::new(32, 16).unwrap();
        let err = comp
            .compose(still_track(2.0), overlay_for(other), None, 0.0, 0.0, 2.0)
            .unwrap_err();
        assert!(matches!(err, QuoteclipError::TimelineMismatch(_)));
    }

    #[test]
    fn compose_rejects_audio_duration_mismatch() {
        let comp = Compositor::new(canvas(), fps());
        let err = comp
            .compose(
                still_track(2.0),
                overlay_for(canvas()),
                Some(silent_audio(5.0, 48_000)),
                0.0,
                0.0,
                2.0,
            )
            .unwrap_err();
        assert!(matches!(err, QuoteclipError::TimelineMismatch(_)));
    }

    #[test]
    fn compose_applies_audio_fades() {
        let comp = Compositor::new(canvas(), fps());
        let timeline = comp
            .compose(
                still_track(2.0),
                overlay_for(canvas()),
                Some(silent_audio(2.0, 48_000)),
                1.0,
                1.0,
                2.0,
            )
            .unwrap();
        let audio = timeline.audio.as_ref().unwrap();
        // Faded in at the head, faded out at the tail, untouched at midpoint.
        assert!(audio.interleaved_f32[0].abs() < 1e-6);
        let mid = audio.interleaved_f32.len() / 2;
        assert!(audio.interleaved_f32[mid] > 0.9);
        assert!(audio.interleaved_f32[audio.interleaved_f32.len() - 1].abs() < 1e-3);
    }

    #[test]
    fn fade_gain_ramps_at_both_ends() {
        let comp = Compositor::new(canvas(), fps());
        let timeline = comp
            .compose(still_track(10.0), overlay_for(canvas()), None, 1.0, 1.0, 10.0)
            .unwrap();
        assert!(timeline.fade_gain_at(0.0).abs() < 1e-6);
        assert!((timeline.fade_gain_at(0.5) - 0.5).abs() < 1e-6);
        assert!((timeline.fade_gain_at(5.0) - 1.0).abs() < 1e-6);
        assert!((timeline.fade_gain_at(9.5) - 0.5).abs() < 1e-6);
        assert!(timeline.fade_gain_at(10.0).abs() < 1e-6);
    }

    #[test]
    fn render_chunk_composites_overlay_and_fade() {
        let comp = Compositor::new(canvas(), fps());
        let timeline = comp
            .compose(still_track(2.0), overlay_for(canvas()), None, 1.0, 0.0, 2.0)
            .unwrap();
        let frames = timeline.render_chunk(0, 2).unwrap();
        assert_eq!(frames.len(), 2);
        // Frame 0 is fully faded to black.
        assert!(frames[0].chunks_exact(4).all(|px| px[0] == 0 && px[3] == 255));
        // Frame 1 is brighter than frame 0.
        assert!(frames[1][0] > frames[0][0]);
    }

    #[test]
    fn composite_over_blends_straight_alpha() {
        // 50% white over opaque black ~= mid gray.
        let mut base = vec![0u8, 0, 0, 255];
        let overlay = vec![255u8, 255, 255, 128];
        composite_over(&mut base, &overlay).unwrap();
        assert_eq!(base[3], 255);
        assert!((i16::from(base[0]) - 128).abs() <= 1);
    }

    #[test]
    fn composite_over_skips_transparent_pixels() {
        let mut base = vec![7u8, 8, 9, 255];
        let overlay = vec![255u8, 255, 255, 0];
        composite_over(&mut base, &overlay).unwrap();
        assert_eq!(base, vec![7, 8, 9, 255]);
    }

    #[test]
    fn apply_fade_scales_toward_black() {
        let mut frame = vec![200u8, 100, 50, 255];
        apply_fade(&mut frame, 0.5);
        assert!((i16::from(frame[0]) - 100).abs() <= 1);
        assert_eq!(frame[3], 255);
    }
}
