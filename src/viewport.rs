use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Browser viewport used for page captures. Screenshots are full-page, so
/// only the width is binding for the final image; the height sets the
/// initial layout box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1440,
            height: 900,
        }
    }
}

const MAX_DIMENSION: u32 = 16_384;

#[derive(Debug, Error)]
pub enum ViewportParseError {
    #[error("Invalid viewport format: expected WIDTHxHEIGHT (e.g., 1440x900)")]
    InvalidFormat,
    #[error("Invalid width: {0}")]
    InvalidWidth(String),
    #[error("Invalid height: {0}")]
    InvalidHeight(String),
    #[error("Viewport dimensions must be between 1 and {MAX_DIMENSION}")]
    OutOfRange,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Result<Self, ViewportParseError> {
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(ViewportParseError::OutOfRange);
        }
        Ok(Self { width, height })
    }
}

impl FromStr for Viewport {
    type Err = ViewportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or(ViewportParseError::InvalidFormat)?;
        if h.contains(['x', 'X']) {
            return Err(ViewportParseError::InvalidFormat);
        }

        let width: u32 = w
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidWidth(w.to_string()))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidHeight(h.to_string()))?;

        Viewport::new(width, height)
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// Config files may spell the viewport either as "1440x900" or as a table.
#[derive(Deserialize)]
#[serde(untagged)]
enum ViewportRepr {
    Text(String),
    Table { width: u32, height: u32 },
}

impl<'de> Deserialize<'de> for Viewport {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match ViewportRepr::deserialize(deserializer)? {
            ViewportRepr::Text(text) => text.parse().map_err(serde::de::Error::custom),
            ViewportRepr::Table { width, height } => {
                Viewport::new(width, height).map_err(serde::de::Error::custom)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_width_by_height() {
        let vp: Viewport = "1440x900".parse().unwrap();
        assert_eq!(vp, Viewport::default());

        let vp: Viewport = " 1920 X 1080 ".parse().unwrap();
        assert_eq!(vp.width, 1920);
        assert_eq!(vp.height, 1080);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!("1440".parse::<Viewport>().is_err());
        assert!("1440x900x600".parse::<Viewport>().is_err());
        assert!("abcx900".parse::<Viewport>().is_err());
        assert!("0x900".parse::<Viewport>().is_err());
        assert!("1440x99999".parse::<Viewport>().is_err());
    }

    #[test]
    fn deserializes_from_string_or_table() {
        #[derive(Deserialize)]
        struct Holder {
            viewport: Viewport,
        }

        let text: Holder = toml::from_str("viewport = \"1280x720\"").unwrap();
        assert_eq!(text.viewport.width, 1280);

        let table: Holder = toml::from_str("[viewport]\nwidth = 800\nheight = 600").unwrap();
        assert_eq!(table.viewport.height, 600);

        assert!(toml::from_str::<Holder>("viewport = \"0x0\"").is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        let vp = Viewport::new(375, 812).unwrap();
        assert_eq!(vp.to_string(), "375x812");
    }
}
