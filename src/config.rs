use std::path::{Path, PathBuf};

use crate::{
    core::{Canvas, Fps, Rgba8},
    duration::TargetDuration,
    error::{QuoteclipError, QuoteclipResult},
    quote::SelectionPolicy,
};

/// Full configuration surface for one pipeline run.
///
/// Every section has defaults, so an empty JSON object is a valid config.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub video: VideoConfig,
    pub text: TextConfig,
    pub music: MusicConfig,
    pub assets: AssetDirsConfig,
    pub quote: QuoteSourceConfig,
    pub output: OutputConfig,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Fixed video length in seconds. When absent the length is estimated
    /// from the quote's word count (see `words_per_minute` and friends).
    pub fixed_duration_sec: Option<f64>,
    pub words_per_minute: f64,
    pub lead_in_sec: f64,
    pub min_duration_sec: f64,
    pub max_duration_sec: f64,
    pub fade_in_sec: f64,
    pub fade_out_sec: f64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 24,
            fixed_duration_sec: None,
            words_per_minute: 200.0,
            lead_in_sec: 5.0,
            min_duration_sec: 10.0,
            max_duration_sec: 60.0,
            fade_in_sec: 1.0,
            fade_out_sec: 1.0,
        }
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub font_size: f32,
    pub author_font_size: f32,
    pub color: String,
    /// Opacity of the panel behind the text, in `[0, 1]`. Zero disables it.
    pub panel_opacity: f64,
    pub max_chars_per_line: usize,
    pub stroke_width: u32,
    pub stroke_color: String,
    /// Candidate font files, first readable one wins.
    pub font_paths: Vec<PathBuf>,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            font_size: 48.0,
            author_font_size: 32.0,
            color: "white".to_string(),
            panel_opacity: 0.25,
            max_chars_per_line: 40,
            stroke_width: 0,
            stroke_color: "black".to_string(),
            font_paths: vec![
                PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf"),
                PathBuf::from("/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf"),
                PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
                PathBuf::from("/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf"),
            ],
        }
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MusicConfig {
    /// Linear gain applied to the music track.
    pub volume: f32,
    /// When the track is longer than the video, start at a uniformly random
    /// offset instead of the beginning.
    pub random_start: bool,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            random_start: false,
        }
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AssetDirsConfig {
    pub background_dir: PathBuf,
    pub music_dir: PathBuf,
}

impl Default for AssetDirsConfig {
    fn default() -> Self {
        Self {
            background_dir: PathBuf::from("assets/background"),
            music_dir: PathBuf::from("assets/music"),
        }
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct QuoteSourceConfig {
    /// Remote CSV (e.g. a published spreadsheet). Takes precedence over
    /// `csv_path` when both are set.
    pub url: Option<String>,
    /// Local CSV file with the same column layout.
    pub csv_path: Option<PathBuf>,
    pub selection: SelectionPolicy,
    pub timeout_sec: u64,
}

impl Default for QuoteSourceConfig {
    fn default() -> Self {
        Self {
            url: None,
            csv_path: None,
            selection: SelectionPolicy::Latest,
            timeout_sec: 10,
        }
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub overwrite: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("out/quote_video.mp4"),
            overwrite: true,
        }
    }
}

impl PipelineConfig {
    /// Load a config from a JSON file.
    pub fn load(path: &Path) -> QuoteclipResult<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            QuoteclipError::validation(format!("failed to open config '{}': {e}", path.display()))
        })?;
        let cfg: Self = serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| {
            QuoteclipError::validation(format!("failed to parse config '{}': {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> QuoteclipResult<()> {
        if self.video.width == 0 || self.video.height == 0 {
            return Err(QuoteclipError::validation(
                "video width/height must be > 0",
            ));
        }
        if !self.video.width.is_multiple_of(2) || !self.video.height.is_multiple_of(2) {
            return Err(QuoteclipError::validation(
                "video width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        if self.video.fps == 0 {
            return Err(QuoteclipError::validation("video fps must be > 0"));
        }
        if let Some(d) = self.video.fixed_duration_sec
            && (!d.is_finite() || d <= 0.0)
        {
            return Err(QuoteclipError::validation(
                "fixed_duration_sec must be finite and > 0",
            ));
        }
        if self.video.min_duration_sec <= 0.0
            || self.video.max_duration_sec < self.video.min_duration_sec
        {
            return Err(QuoteclipError::validation(
                "duration bounds must satisfy 0 < min <= max",
            ));
        }
        if self.video.words_per_minute <= 0.0 {
            return Err(QuoteclipError::validation("words_per_minute must be > 0"));
        }
        if self.video.fade_in_sec < 0.0 || self.video.fade_out_sec < 0.0 {
            return Err(QuoteclipError::validation("fade durations must be >= 0"));
        }
        if !(0.0..=1.0).contains(&self.text.panel_opacity) {
            return Err(QuoteclipError::validation(
                "panel_opacity must be within [0, 1]",
            ));
        }
        if self.text.font_size <= 0.0 || self.text.author_font_size <= 0.0 {
            return Err(QuoteclipError::validation("font sizes must be > 0"));
        }
        if self.text.max_chars_per_line == 0 {
            return Err(QuoteclipError::validation("max_chars_per_line must be > 0"));
        }
        if self.music.volume < 0.0 {
            return Err(QuoteclipError::validation("music volume must be >= 0"));
        }
        Rgba8::parse(&self.text.color)?;
        Rgba8::parse(&self.text.stroke_color)?;
        Ok(())
    }

    pub fn canvas(&self) -> QuoteclipResult<Canvas> {
        Canvas::new(self.video.width, self.video.height)
    }

    pub fn fps(&self) -> QuoteclipResult<Fps> {
        Fps::new(self.video.fps, 1)
    }

    pub fn target_duration(&self) -> TargetDuration {
        match self.video.fixed_duration_sec {
            Some(sec) => TargetDuration::Fixed(sec),
            None => TargetDuration::FromText {
                words_per_minute: self.video.words_per_minute,
                lead_in_sec: self.video.lead_in_sec,
                min_sec: self.video.min_duration_sec,
                max_sec: self.video.max_duration_sec,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_a_valid_config() {
        let cfg: PipelineConfig = serde_json::from_str("{}").unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.video.width, 1280);
        assert_eq!(cfg.text.max_chars_per_line, 40);
    }

    #[test]
    fn validate_rejects_odd_dimensions() {
        let mut cfg = PipelineConfig::default();
        cfg.video.width = 1281;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_opacity() {
        let mut cfg = PipelineConfig::default();
        cfg.text.panel_opacity = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_duration_bounds() {
        let mut cfg = PipelineConfig::default();
        cfg.video.min_duration_sec = 30.0;
        cfg.video.max_duration_sec = 10.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn fixed_duration_takes_precedence() {
        let mut cfg = PipelineConfig::default();
        cfg.video.fixed_duration_sec = Some(60.0);
        assert!(matches!(cfg.target_duration(), TargetDuration::Fixed(d) if d == 60.0));
    }
}
