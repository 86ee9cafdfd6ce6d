//! Object key layout.
//!
//! Keys are namespaced by purpose and owner:
//! `<purpose>/<user_id>/<YYYYMMDD>/<uuid>.<ext>`, except background music
//! which skips the date segment. Entities persist these keys, never
//! presigned URLs.

use chrono::Utc;
use uuid::Uuid;

/// Storage namespace for a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPurpose {
    /// Source documents
    Uploads,
    /// Generated images
    Images,
    /// Generated voice-overs
    Audio,
    /// Final chapter videos
    Videos,
    /// Background music
    Bgm,
}

impl KeyPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyPurpose::Uploads => "uploads",
            KeyPurpose::Images => "images",
            KeyPurpose::Audio => "audio",
            KeyPurpose::Videos => "videos",
            KeyPurpose::Bgm => "bgm",
        }
    }
}

/// Generate a fresh object key for a user-owned blob.
pub fn object_key(purpose: KeyPurpose, user_id: &str, ext: &str) -> String {
    let unique = Uuid::new_v4();
    let ext = ext.trim_start_matches('.');
    match purpose {
        KeyPurpose::Bgm => format!("{}/{}/{}.{}", purpose.as_str(), user_id, unique, ext),
        _ => {
            let date = Utc::now().format("%Y%m%d");
            format!("{}/{}/{}/{}.{}", purpose.as_str(), user_id, date, unique, ext)
        }
    }
}

/// Pick a content type for a key from its extension.
pub fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next().map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "mp4" => "video/mp4",
        Some(ext) if ext == "mp3" => "audio/mpeg",
        Some(ext) if ext == "wav" => "audio/wav",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "webp" => "image/webp",
        Some(ext) if ext == "txt" => "text/plain",
        Some(ext) if ext == "md" => "text/markdown",
        Some(ext) if ext == "json" => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_matches_contract() {
        let key = object_key(KeyPurpose::Videos, "user-1", "mp4");
        let parts: Vec<&str> = key.split('/').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "videos");
        assert_eq!(parts[1], "user-1");
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit()));
        assert!(parts[3].ends_with(".mp4"));
    }

    #[test]
    fn bgm_keys_skip_the_date_segment() {
        let key = object_key(KeyPurpose::Bgm, "user-1", ".mp3");
        let parts: Vec<&str> = key.split('/').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "bgm");
        assert!(parts[2].ends_with(".mp3"));
    }

    #[test]
    fn keys_are_unique() {
        let a = object_key(KeyPurpose::Images, "u", "png");
        let b = object_key(KeyPurpose::Images, "u", "png");
        assert_ne!(a, b);
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("videos/u/20260801/x.mp4"), "video/mp4");
        assert_eq!(content_type_for("audio/u/20260801/x.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("weird"), "application/octet-stream");
    }
}
