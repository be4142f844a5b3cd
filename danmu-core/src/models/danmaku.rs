use serde::{Deserialize, Serialize};

pub const WHITE: u32 = 16_777_215;

/// On-screen placement of a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum DanmakuMode {
    Scroll,
    Bottom,
    Top,
}

impl From<DanmakuMode> for u8 {
    fn from(mode: DanmakuMode) -> u8 {
        match mode {
            DanmakuMode::Scroll => 1,
            DanmakuMode::Bottom => 4,
            DanmakuMode::Top => 5,
        }
    }
}

impl TryFrom<u8> for DanmakuMode {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 | 2 | 3 | 6 => Ok(Self::Scroll),
            4 => Ok(Self::Bottom),
            5 | 7 => Ok(Self::Top),
            other => Err(format!("unsupported danmaku mode {other}")),
        }
    }
}

impl DanmakuMode {
    /// Lenient parse used on upstream data: anything unknown scrolls.
    pub fn from_raw(v: i64) -> Self {
        u8::try_from(v)
            .ok()
            .and_then(|v| Self::try_from(v).ok())
            .unwrap_or(Self::Scroll)
    }

    pub fn as_int(self) -> u8 {
        self.into()
    }
}

/// A single normalized comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Danmaku {
    /// Playback offset in seconds.
    pub time: f64,
    pub mode: DanmakuMode,
    /// 24-bit RGB, decimal.
    pub color: u32,
    pub text: String,
    /// Originating platform tag, rendered as `[platform]` in the `p` field.
    #[serde(default)]
    pub platform: String,
}

impl Danmaku {
    pub fn new(time: f64, mode: DanmakuMode, color: u32, text: impl Into<String>) -> Self {
        Self {
            time,
            mode,
            color: color & 0x00FF_FFFF,
            text: text.into(),
            platform: String::new(),
        }
    }

    pub fn scrolling(time: f64, text: impl Into<String>) -> Self {
        Self::new(time, DanmakuMode::Scroll, WHITE, text)
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// The four-field JSON `p` string: `t,mode,color,[platform]`.
    pub fn p_field(&self) -> String {
        format!(
            "{:.2},{},{},[{}]",
            self.time,
            self.mode.as_int(),
            self.color,
            self.platform
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_roundtrip() {
        assert_eq!(DanmakuMode::try_from(1u8), Ok(DanmakuMode::Scroll));
        assert_eq!(DanmakuMode::try_from(4u8), Ok(DanmakuMode::Bottom));
        assert_eq!(DanmakuMode::try_from(5u8), Ok(DanmakuMode::Top));
        assert!(DanmakuMode::try_from(9u8).is_err());
        assert_eq!(DanmakuMode::from_raw(99), DanmakuMode::Scroll);
    }

    #[test]
    fn test_p_field_format() {
        let d = Danmaku::new(12.3456, DanmakuMode::Scroll, 16777215, "hi").with_platform("bilibili");
        assert_eq!(d.p_field(), "12.35,1,16777215,[bilibili]");
    }

    #[test]
    fn test_color_masked_to_24_bits() {
        let d = Danmaku::new(0.0, DanmakuMode::Top, 0xFF00_0000 | 123, "x");
        assert_eq!(d.color, 123);
    }
}
