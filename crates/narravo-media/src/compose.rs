//! Per-sentence clip composition.
//!
//! One still image is scaled and cropped to cover the target resolution,
//! pushed through `zoompan` for a slow zoom lasting the full voice-over,
//! overlaid with subtitle drawtext filters, and muxed with the audio under
//! `-shortest`.

use std::path::{Path, PathBuf};

use narravo_models::GenerationSettings;

use crate::command::FfmpegCommand;

/// Everything needed to render one sentence clip.
#[derive(Debug, Clone)]
pub struct SentenceClipSpec {
    pub image: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
    /// Comma-joined `drawtext` chain; empty for no subtitles.
    pub subtitle_filter: String,
    /// Voice-over duration in seconds.
    pub audio_duration: f64,
}

impl SentenceClipSpec {
    pub fn new(
        image: impl AsRef<Path>,
        audio: impl AsRef<Path>,
        output: impl AsRef<Path>,
        subtitle_filter: impl Into<String>,
        audio_duration: f64,
    ) -> Self {
        Self {
            image: image.as_ref().to_path_buf(),
            audio: audio.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            subtitle_filter: subtitle_filter.into(),
            audio_duration,
        }
    }
}

/// Build the filter graph for one sentence clip.
fn build_filter_complex(spec: &SentenceClipSpec, settings: &GenerationSettings) -> String {
    let (width, height) = settings.dimensions();
    let frames = (settings.fps as f64 * spec.audio_duration).ceil().max(1.0) as u64;

    let background = format!(
        "[0:v]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},\
         zoompan=z='zoom+{speed}':s={w}x{h}:d={frames}[bg]",
        w = width,
        h = height,
        speed = settings.zoom_speed,
        frames = frames,
    );

    if spec.subtitle_filter.is_empty() {
        format!("{background};[bg]null[v0]")
    } else {
        format!("{background};[bg]{}[v0]", spec.subtitle_filter)
    }
}

/// Build the full FFmpeg command for one sentence clip.
pub fn build_sentence_clip_command(
    spec: &SentenceClipSpec,
    settings: &GenerationSettings,
) -> FfmpegCommand {
    let filter = build_filter_complex(spec, settings);

    FfmpegCommand::new(&spec.output)
        .input_with_args(
            ["-loop", "1", "-framerate", &settings.fps.to_string()],
            &spec.image,
        )
        .input(&spec.audio)
        .filter_complex(filter)
        .output_args(["-map", "[v0]", "-map", "1:a"])
        .video_codec(&settings.video_codec)
        .preset("veryfast")
        .audio_codec(&settings.audio_codec)
        .audio_bitrate(&settings.audio_bitrate)
        .output_args(["-pix_fmt", "yuv420p", "-shortest"])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> SentenceClipSpec {
        SentenceClipSpec::new("image.jpg", "audio.mp3", "clip.mp4", "", 4.0)
    }

    #[test]
    fn filter_graph_covers_and_zooms() {
        let settings = GenerationSettings::default();
        let filter = build_filter_complex(&spec(), &settings);
        assert!(filter.contains("scale=1920:1080:force_original_aspect_ratio=increase"));
        assert!(filter.contains("crop=1920:1080"));
        assert!(filter.contains("zoompan=z='zoom+0.0005':s=1920x1080:d=100"));
        assert!(filter.ends_with("[v0]"));
    }

    #[test]
    fn subtitle_chain_is_spliced_after_background() {
        let settings = GenerationSettings::default();
        let mut s = spec();
        s.subtitle_filter = "drawtext=text='你好':fontsize=48".into();
        let filter = build_filter_complex(&s, &settings);
        assert!(filter.contains("[bg]drawtext=text='你好':fontsize=48[v0]"));
    }

    #[test]
    fn zoompan_duration_tracks_audio() {
        let settings = GenerationSettings {
            fps: 30,
            ..Default::default()
        };
        let mut s = spec();
        s.audio_duration = 2.5;
        let filter = build_filter_complex(&s, &settings);
        assert!(filter.contains(":d=75["));
    }

    #[test]
    fn command_maps_video_and_audio_streams() {
        let settings = GenerationSettings::default();
        let joined = build_sentence_clip_command(&spec(), &settings)
            .build_args()
            .join(" ");
        assert!(joined.contains("-loop 1 -framerate 25 -i image.jpg"));
        assert!(joined.contains("-i audio.mp3"));
        assert!(joined.contains("-map [v0] -map 1:a"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-preset veryfast"));
        assert!(joined.contains("-c:a aac -b:a 192k"));
        assert!(joined.contains("-pix_fmt yuv420p -shortest"));
        assert!(joined.ends_with("clip.mp4"));
    }
}
