use crate::error::{QuoteclipError, QuoteclipResult};

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> QuoteclipResult<Self> {
        if num == 0 {
            return Err(QuoteclipError::validation("Fps num must be > 0"));
        }
        if den == 0 {
            return Err(QuoteclipError::validation("Fps den must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    /// Convert frame count to seconds.
    pub fn frames_to_secs(self, frames: u64) -> f64 {
        (frames as f64) * self.frame_duration_secs()
    }

    /// Convert seconds to frame count, rounding to the nearest frame.
    pub fn secs_to_frames_round(self, secs: f64) -> u64 {
        (secs * self.as_f64()).round().max(0.0) as u64
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> QuoteclipResult<Self> {
        if width == 0 || height == 0 {
            return Err(QuoteclipError::validation(
                "canvas width/height must be > 0",
            ));
        }
        Ok(Self { width, height })
    }

    /// Byte length of one RGBA8 frame at these dimensions.
    pub fn frame_bytes(self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Straight-alpha RGBA8 color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const WHITE: Self = Self::opaque(255, 255, 255);
    pub const BLACK: Self = Self::opaque(0, 0, 0);

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse a named color or `#rrggbb` / `#rrggbbaa` hex string.
    pub fn parse(s: &str) -> QuoteclipResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" => return Ok(Self::WHITE),
            "black" => return Ok(Self::BLACK),
            "red" => return Ok(Self::opaque(255, 0, 0)),
            "green" => return Ok(Self::opaque(0, 255, 0)),
            "blue" => return Ok(Self::opaque(0, 0, 255)),
            "yellow" => return Ok(Self::opaque(255, 255, 0)),
            "gray" | "grey" => return Ok(Self::opaque(128, 128, 128)),
            _ => {}
        }

        let hex = s.trim().trim_start_matches('#');
        // Length is in bytes; non-ASCII input must fail here, not at the
        // slice below.
        if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
            return Err(QuoteclipError::validation(format!(
                "invalid color '{s}': expected a named color or #rrggbb[aa]"
            )));
        }
        let byte = |i: usize| -> QuoteclipResult<u8> {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| QuoteclipError::validation(format!("invalid color '{s}'")))
        };
        Ok(Self {
            r: byte(0)?,
            g: byte(2)?,
            b: byte(4)?,
            a: if hex.len() == 8 { byte(6)? } else { 255 },
        })
    }
}

pub(crate) fn mul_div255(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}
