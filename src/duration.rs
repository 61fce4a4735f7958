use rand::Rng;
use tracing::debug;

use crate::{
    error::{QuoteclipError, QuoteclipResult},
    media::AudioPcm,
};

/// How a trim start offset is chosen when the source is longer than the
/// target. The backing policy differs between deployments, so it is
/// configurable rather than fixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OffsetPolicy {
    /// Always trim from the beginning of the source.
    FromStart,
    /// Pick the trim start uniformly in `[0, source - target]`.
    RandomStart,
}

/// Loop-then-trim schedule that maps a source of duration `d` onto a target
/// duration `T`.
///
/// - `d >= T`: one repetition, trimmed to `[offset, offset + T]`.
/// - `d < T`: `ceil(T / d)` end-to-end repetitions, the concatenation trimmed
///   to exactly `T` (the last repetition is partial).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizationPlan {
    pub source_duration_sec: f64,
    pub target_duration_sec: f64,
    pub start_offset_sec: f64,
    pub repetitions: u32,
}

impl NormalizationPlan {
    /// Plan with the trim start pinned to the beginning of the source.
    pub fn new(source_duration_sec: f64, target_duration_sec: f64) -> QuoteclipResult<Self> {
        Self::build(source_duration_sec, target_duration_sec, 0.0)
    }

    /// Plan honoring the configured offset policy.
    pub fn with_policy<R: Rng>(
        source_duration_sec: f64,
        target_duration_sec: f64,
        policy: OffsetPolicy,
        rng: &mut R,
    ) -> QuoteclipResult<Self> {
        let slack = source_duration_sec - target_duration_sec;
        let offset = match policy {
            OffsetPolicy::FromStart => 0.0,
            OffsetPolicy::RandomStart if slack > 0.0 => rng.gen_range(0.0..=slack),
            OffsetPolicy::RandomStart => 0.0,
        };
        Self::build(source_duration_sec, target_duration_sec, offset)
    }

    fn build(source: f64, target: f64, start_offset: f64) -> QuoteclipResult<Self> {
        if !source.is_finite() || source <= 0.0 {
            return Err(QuoteclipError::invalid_media_duration(format!(
                "source duration {source} is zero or unusable"
            )));
        }
        if !target.is_finite() || target <= 0.0 {
            return Err(QuoteclipError::validation(format!(
                "target duration {target} must be finite and > 0"
            )));
        }

        let repetitions = if source >= target {
            1
        } else {
            (target / source).ceil() as u32
        };
        // The offset only applies to the trim case; looped sources always
        // start at zero.
        let start_offset = if repetitions == 1 {
            start_offset.clamp(0.0, source - target)
        } else {
            0.0
        };

        let plan = Self {
            source_duration_sec: source,
            target_duration_sec: target,
            start_offset_sec: start_offset,
            repetitions,
        };
        debug!(?plan, "normalization plan");
        Ok(plan)
    }

    pub fn is_looped(&self) -> bool {
        self.repetitions > 1
    }

    /// Map a timeline instant `t` (in `[0, target)`) to a source instant.
    pub fn source_time_at(&self, t_sec: f64) -> f64 {
        let t = t_sec.clamp(0.0, self.target_duration_sec);
        if self.repetitions == 1 {
            self.start_offset_sec + t
        } else {
            t % self.source_duration_sec
        }
    }

    /// Which repetition a timeline instant falls into (0-based).
    pub fn repetition_index(&self, t_sec: f64) -> u32 {
        if self.repetitions == 1 {
            return 0;
        }
        let t = t_sec.clamp(0.0, self.target_duration_sec);
        let idx = (t / self.source_duration_sec).floor() as u32;
        idx.min(self.repetitions - 1)
    }
}

/// How the final video length is chosen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TargetDuration {
    /// Fixed length in seconds.
    Fixed(f64),
    /// Reading-speed estimate from the quote's word count.
    FromText {
        words_per_minute: f64,
        lead_in_sec: f64,
        min_sec: f64,
        max_sec: f64,
    },
}

impl TargetDuration {
    /// Derive the concrete target length for a quote of `word_count` words.
    pub fn derive(&self, word_count: usize) -> QuoteclipResult<f64> {
        match *self {
            TargetDuration::Fixed(sec) => {
                if !sec.is_finite() || sec <= 0.0 {
                    return Err(QuoteclipError::validation(
                        "fixed target duration must be finite and > 0",
                    ));
                }
                Ok(sec)
            }
            TargetDuration::FromText {
                words_per_minute,
                lead_in_sec,
                min_sec,
                max_sec,
            } => {
                if words_per_minute <= 0.0 {
                    return Err(QuoteclipError::validation("words_per_minute must be > 0"));
                }
                if min_sec <= 0.0 || max_sec < min_sec {
                    return Err(QuoteclipError::validation(
                        "duration bounds must satisfy 0 < min <= max",
                    ));
                }
                let estimate = (word_count as f64) / words_per_minute * 60.0 + lead_in_sec;
                Ok(estimate.clamp(min_sec, max_sec))
            }
        }
    }
}

/// Trim/loop bookkeeping for the attached audio track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AudioSegment {
    pub source_duration_sec: f64,
    pub target_duration_sec: f64,
    pub start_offset_sec: f64,
}

/// Audio fitted to exactly the target duration, ready for muxing.
#[derive(Clone, Debug)]
pub struct NormalizedAudio {
    pub segment: AudioSegment,
    pub sample_rate: u32,
    pub channels: u16,
    pub interleaved_f32: Vec<f32>,
}

impl NormalizedAudio {
    pub fn target_frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.interleaved_f32.len() / usize::from(self.channels)
        }
    }
}

/// Apply a normalization plan to decoded PCM: loop or trim to exactly the
/// target length and scale by `volume`.
pub fn fit_audio(
    pcm: &AudioPcm,
    plan: &NormalizationPlan,
    volume: f32,
) -> QuoteclipResult<NormalizedAudio> {
    let src_frames = pcm.frames();
    if src_frames == 0 || pcm.sample_rate == 0 {
        return Err(QuoteclipError::invalid_media_duration(
            "audio source decoded to zero samples",
        ));
    }
    if pcm.channels != 2 {
        return Err(QuoteclipError::validation(
            "fit_audio expects stereo interleaved PCM",
        ));
    }

    let sr = f64::from(pcm.sample_rate);
    let target_frames = (plan.target_duration_sec * sr).round() as usize;
    let offset_frames = (plan.start_offset_sec * sr).round() as usize;

    let mut out = Vec::<f32>::with_capacity(target_frames * 2);
    for i in 0..target_frames {
        let src_frame = if plan.is_looped() {
            i % src_frames
        } else {
            (offset_frames + i).min(src_frames - 1)
        };
        let idx = src_frame * 2;
        out.push((pcm.interleaved_f32[idx] * volume).clamp(-1.0, 1.0));
        out.push((pcm.interleaved_f32[idx + 1] * volume).clamp(-1.0, 1.0));
    }

    Ok(NormalizedAudio {
        segment: AudioSegment {
            source_duration_sec: pcm.duration_sec(),
            target_duration_sec: plan.target_duration_sec,
            start_offset_sec: plan.start_offset_sec,
        },
        sample_rate: pcm.sample_rate,
        channels: 2,
        interleaved_f32: out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn short_source_loops_ceil_times() {
        // 22s of music against a 60s video needs ceil(60/22) = 3 repetitions.
        let plan = NormalizationPlan::new(22.0, 60.0).unwrap();
        assert_eq!(plan.repetitions, 3);
        assert!(plan.is_looped());
        assert_eq!(plan.start_offset_sec, 0.0);
    }

    #[test]
    fn long_source_trims_once() {
        let plan = NormalizationPlan::new(90.0, 60.0).unwrap();
        assert_eq!(plan.repetitions, 1);
        assert!(!plan.is_looped());
    }

    #[test]
    fn exact_length_source_is_a_no_op() {
        let plan = NormalizationPlan::new(60.0, 60.0).unwrap();
        assert_eq!(plan.repetitions, 1);
        assert_eq!(plan.start_offset_sec, 0.0);
        assert!((plan.source_time_at(13.5) - 13.5).abs() < 1e-12);
    }

    #[test]
    fn zero_duration_source_is_rejected() {
        let err = NormalizationPlan::new(0.0, 60.0).unwrap_err();
        assert!(matches!(err, QuoteclipError::InvalidMediaDuration(_)));
        assert!(NormalizationPlan::new(f64::NAN, 60.0).is_err());
    }

    #[test]
    fn looped_mapping_wraps_and_preserves_early_content() {
        let plan = NormalizationPlan::new(22.0, 60.0).unwrap();
        // For t < d the mapped time equals t.
        assert!((plan.source_time_at(10.0) - 10.0).abs() < 1e-9);
        assert!((plan.source_time_at(25.0) - 3.0).abs() < 1e-9);
        assert_eq!(plan.repetition_index(10.0), 0);
        assert_eq!(plan.repetition_index(25.0), 1);
        assert_eq!(plan.repetition_index(59.9), 2);
    }

    #[test]
    fn random_start_stays_within_slack() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..50 {
            let plan =
                NormalizationPlan::with_policy(100.0, 60.0, OffsetPolicy::RandomStart, &mut rng)
                    .unwrap();
            assert!(plan.start_offset_sec >= 0.0);
            assert!(plan.start_offset_sec + plan.target_duration_sec <= plan.source_duration_sec);
        }
    }

    #[test]
    fn random_start_is_disabled_when_looping() {
        let mut rng = StdRng::seed_from_u64(1);
        let plan =
            NormalizationPlan::with_policy(10.0, 60.0, OffsetPolicy::RandomStart, &mut rng).unwrap();
        assert_eq!(plan.start_offset_sec, 0.0);
        assert_eq!(plan.repetitions, 6);
    }

    #[test]
    fn reading_speed_estimate_clamps_to_floor() {
        // 8 words at 200 wpm plus a 5s lead-in is 7.4s, clamped to min 10s.
        let target = TargetDuration::FromText {
            words_per_minute: 200.0,
            lead_in_sec: 5.0,
            min_sec: 10.0,
            max_sec: 60.0,
        };
        assert!((target.derive(8).unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn reading_speed_estimate_clamps_to_ceiling() {
        let target = TargetDuration::FromText {
            words_per_minute: 200.0,
            lead_in_sec: 5.0,
            min_sec: 10.0,
            max_sec: 60.0,
        };
        assert!((target.derive(1000).unwrap() - 60.0).abs() < 1e-9);
    }

    fn ramp_pcm(frames: usize) -> AudioPcm {
        let mut pcm = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let v = (i as f32) / (frames as f32);
            pcm.push(v);
            pcm.push(-v);
        }
        AudioPcm {
            sample_rate: 1_000,
            channels: 2,
            interleaved_f32: pcm,
        }
    }

    #[test]
    fn fit_audio_loops_and_matches_source_prefix() {
        let pcm = ramp_pcm(1_000); // 1s at 1kHz
        let plan = NormalizationPlan::new(pcm.duration_sec(), 2.5).unwrap();
        assert_eq!(plan.repetitions, 3);

        let fitted = fit_audio(&pcm, &plan, 1.0).unwrap();
        assert_eq!(fitted.target_frames(), 2_500);
        // Content for t < d equals the original source content for t.
        assert_eq!(fitted.interleaved_f32[..2_000], pcm.interleaved_f32[..]);
        // Second repetition restarts at the source head.
        assert_eq!(fitted.interleaved_f32[2_000], pcm.interleaved_f32[0]);
    }

    #[test]
    fn fit_audio_trim_respects_start_offset_invariant() {
        let pcm = ramp_pcm(2_000); // 2s
        let mut rng = StdRng::seed_from_u64(5);
        let plan = NormalizationPlan::with_policy(
            pcm.duration_sec(),
            1.0,
            OffsetPolicy::RandomStart,
            &mut rng,
        )
        .unwrap();
        let fitted = fit_audio(&pcm, &plan, 1.0).unwrap();
        let seg = fitted.segment;
        assert_eq!(fitted.target_frames(), 1_000);
        assert!(seg.start_offset_sec + seg.target_duration_sec <= seg.source_duration_sec + 1e-9);
    }

    #[test]
    fn fit_audio_applies_volume() {
        let pcm = ramp_pcm(1_000);
        let plan = NormalizationPlan::new(pcm.duration_sec(), 1.0).unwrap();
        let fitted = fit_audio(&pcm, &plan, 0.5).unwrap();
        assert!((fitted.interleaved_f32[1_000] - pcm.interleaved_f32[1_000] * 0.5).abs() < 1e-6);
    }

    #[test]
    fn fit_audio_rejects_empty_source() {
        let pcm = AudioPcm {
            sample_rate: 48_000,
            channels: 2,
            interleaved_f32: Vec::new(),
        };
        let plan = NormalizationPlan::new(22.0, 60.0).unwrap();
        let err = fit_audio(&pcm, &plan, 1.0).unwrap_err();
        assert!(matches!(err, QuoteclipError::InvalidMediaDuration(_)));
    }
}
