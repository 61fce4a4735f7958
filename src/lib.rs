#![forbid(unsafe_code)]

pub mod assets;
pub mod config;
pub mod core;
pub mod duration;
pub mod encode;
pub mod error;
pub mod layout;
pub mod media;
pub mod pipeline;
pub mod quote;
pub mod timeline;

pub use assets::{AssetKind, AssetPool, AssetRef, AssetSelector};
pub use config::PipelineConfig;
pub use crate::core::{Canvas, Fps, Rgba8};
pub use duration::{NormalizationPlan, OffsetPolicy, TargetDuration};
pub use error::{QuoteclipError, QuoteclipResult};
pub use layout::{RasterOverlay, TextBlock, TextLayoutEngine};
pub use pipeline::{RenderedVideo, run_pipeline};
pub use quote::QuoteText;
pub use timeline::{Compositor, TimelineSpec};
