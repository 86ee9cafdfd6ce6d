//! Duration probing via ffprobe.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Read a media file's duration in seconds.
///
/// Uses `ffprobe -v error -show_entries format=duration -of
/// default=noprint_wrappers=1:nokey=1 <file>`.
pub async fn media_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("ffprobe failed for {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_duration(&stdout)
        .ok_or_else(|| MediaError::InvalidMedia(format!("unparseable duration: {stdout:?}")))
}

fn parse_duration(stdout: &str) -> Option<f64> {
    let value: f64 = stdout.trim().parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_float() {
        assert_eq!(parse_duration("12.48\n"), Some(12.48));
        assert_eq!(parse_duration("  0.0  "), Some(0.0));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_duration("N/A"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("-3"), None);
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = media_duration("/definitely/not/here.mp3").await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
