//! Video generation settings carried by a video task.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Subtitle look and placement.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubtitleStyle {
    #[serde(default = "default_font")]
    pub font: String,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_position")]
    pub position: String,
}

fn default_font() -> String {
    "Arial".to_string()
}

fn default_font_size() -> u32 {
    48
}

fn default_color() -> String {
    "white".to_string()
}

fn default_position() -> String {
    "bottom".to_string()
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font: default_font(),
            font_size: default_font_size(),
            color: default_color(),
            position: default_position(),
        }
    }
}

/// The `generation_settings` bag attached to a video task.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationSettings {
    /// `"WxH"`, e.g. `"1920x1080"`.
    #[serde(default = "default_resolution")]
    pub resolution: String,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
    /// Per-frame zoom increment for the slow push-in.
    #[serde(default = "default_zoom_speed")]
    pub zoom_speed: f64,
    #[serde(default)]
    pub subtitle_style: SubtitleStyle,
    /// Chat model used for subtitle correction, when an API key is attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
}

fn default_resolution() -> String {
    "1920x1080".to_string()
}

fn default_fps() -> u32 {
    25
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_audio_bitrate() -> String {
    "192k".to_string()
}

fn default_zoom_speed() -> f64 {
    0.0005
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            fps: default_fps(),
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            zoom_speed: default_zoom_speed(),
            subtitle_style: SubtitleStyle::default(),
            llm_model: None,
        }
    }
}

impl GenerationSettings {
    /// Parse `resolution` into `(width, height)`, falling back to 1920x1080
    /// when the string is malformed.
    pub fn dimensions(&self) -> (u32, u32) {
        let mut parts = self.resolution.splitn(2, 'x');
        let w = parts.next().and_then(|s| s.parse().ok());
        let h = parts.next().and_then(|s| s.parse().ok());
        match (w, h) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => (1920, 1080),
        }
    }

    pub fn is_portrait(&self) -> bool {
        let (w, h) = self.dimensions();
        h > w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let s = GenerationSettings::default();
        assert_eq!(s.resolution, "1920x1080");
        assert_eq!(s.fps, 25);
        assert_eq!(s.video_codec, "libx264");
        assert_eq!(s.audio_codec, "aac");
        assert_eq!(s.audio_bitrate, "192k");
        assert!((s.zoom_speed - 0.0005).abs() < f64::EPSILON);
        assert_eq!(s.subtitle_style.font_size, 48);
        assert_eq!(s.subtitle_style.color, "white");
    }

    #[test]
    fn malformed_resolution_falls_back() {
        let s = GenerationSettings {
            resolution: "banana".into(),
            ..Default::default()
        };
        assert_eq!(s.dimensions(), (1920, 1080));
    }

    #[test]
    fn portrait_detection() {
        let s = GenerationSettings {
            resolution: "1080x1920".into(),
            ..Default::default()
        };
        assert!(s.is_portrait());
        assert_eq!(s.dimensions(), (1080, 1920));
    }

    #[test]
    fn settings_deserialize_from_sparse_json() {
        let s: GenerationSettings = serde_json::from_str(r#"{"fps": 30}"#).unwrap();
        assert_eq!(s.fps, 30);
        assert_eq!(s.resolution, "1920x1080");
    }
}
