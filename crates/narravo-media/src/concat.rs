//! Final chapter concat: stream copy only, no re-encode.

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::CONCAT_TIMEOUT_SECS;

/// Write the concat demuxer manifest: one `file '<abs path>'` line per clip,
/// in the given order.
pub async fn write_concat_manifest(
    clips: &[PathBuf],
    manifest_path: impl AsRef<Path>,
) -> MediaResult<()> {
    if clips.is_empty() {
        return Err(MediaError::InvalidMedia("no clips to concatenate".into()));
    }

    let mut contents = String::new();
    for clip in clips {
        let abs = clip.canonicalize().unwrap_or_else(|_| clip.clone());
        // Single quotes inside paths are closed-escaped-reopened per the
        // concat demuxer's quoting rules.
        let quoted = abs.to_string_lossy().replace('\'', "'\\''");
        contents.push_str(&format!("file '{}'\n", quoted));
    }

    tokio::fs::write(manifest_path.as_ref(), contents).await?;
    Ok(())
}

/// Concatenate clips into `output` via the concat demuxer under `-c copy`.
///
/// All inputs share codec and resolution by construction, so stream copy is
/// deterministic: identical input bytes produce an identical output stream.
pub async fn concat_clips(
    clips: &[PathBuf],
    manifest_path: impl AsRef<Path>,
    output: impl AsRef<Path>,
    cancel: Option<watch::Receiver<bool>>,
) -> MediaResult<()> {
    let manifest_path = manifest_path.as_ref();
    write_concat_manifest(clips, manifest_path).await?;

    let cmd = FfmpegCommand::new(output.as_ref())
        .input_with_args(["-f", "concat", "-safe", "0"], manifest_path)
        .output_args(["-c", "copy"]);

    let mut runner = FfmpegRunner::new().with_timeout(CONCAT_TIMEOUT_SECS);
    if let Some(rx) = cancel {
        runner = runner.with_cancel(rx);
    }
    runner.run(&cmd).await?;

    info!(
        clips = clips.len(),
        output = %output.as_ref().display(),
        "concatenated chapter video"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manifest_lists_clips_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let clips: Vec<PathBuf> = (0..3)
            .map(|i| {
                let p = dir.path().join(format!("clip_{i:03}.mp4"));
                std::fs::write(&p, b"stub").unwrap();
                p
            })
            .collect();

        let manifest = dir.path().join("concat.txt");
        write_concat_manifest(&clips, &manifest).await.unwrap();

        let text = std::fs::read_to_string(&manifest).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("clip_000.mp4"));
        assert!(lines[1].contains("clip_001.mp4"));
        assert!(lines[2].contains("clip_002.mp4"));
        assert!(lines.iter().all(|l| l.starts_with("file '")));
    }

    #[tokio::test]
    async fn empty_clip_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("concat.txt");
        let err = write_concat_manifest(&[], &manifest).await.unwrap_err();
        assert!(matches!(err, MediaError::InvalidMedia(_)));
    }

    #[test]
    fn concat_command_uses_stream_copy() {
        let cmd = FfmpegCommand::new("final.mp4")
            .input_with_args(["-f", "concat", "-safe", "0"], "concat.txt")
            .output_args(["-c", "copy"]);
        let joined = cmd.build_args().join(" ");
        assert!(joined.contains("-f concat -safe 0 -i concat.txt"));
        assert!(joined.contains("-c copy"));
        assert!(!joined.contains("-c:v"));
    }
}
