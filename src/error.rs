pub type QuoteclipResult<T> = Result<T, QuoteclipError>;

#[derive(thiserror::Error, Debug)]
pub enum QuoteclipError {
    #[error("asset pool empty: {0}")]
    AssetPoolEmpty(String),

    #[error("invalid media duration: {0}")]
    InvalidMediaDuration(String),

    #[error("no quote available: {0}")]
    NoQuoteAvailable(String),

    #[error("font unavailable: {0}")]
    FontUnavailable(String),

    #[error("timeline mismatch: {0}")]
    TimelineMismatch(String),

    #[error("encoding failure: {0}")]
    Encoding(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl QuoteclipError {
    pub fn asset_pool_empty(msg: impl Into<String>) -> Self {
        Self::AssetPoolEmpty(msg.into())
    }

    pub fn invalid_media_duration(msg: impl Into<String>) -> Self {
        Self::InvalidMediaDuration(msg.into())
    }

    pub fn no_quote_available(msg: impl Into<String>) -> Self {
        Self::NoQuoteAvailable(msg.into())
    }

    pub fn font_unavailable(msg: impl Into<String>) -> Self {
        Self::FontUnavailable(msg.into())
    }

    pub fn timeline_mismatch(msg: impl Into<String>) -> Self {
        Self::TimelineMismatch(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
