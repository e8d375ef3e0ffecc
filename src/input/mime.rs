//! MIME helpers for raw inputs.

pub const DOCUMENT_MIME_TYPES: &[&str] = &["application/pdf", "text/plain", "text/markdown"];

pub const IMAGE_MIME_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/heic",
    "image/heif",
];

pub const AUDIO_MIME_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/x-wav",
    "audio/ogg",
    "audio/aac",
    "audio/flac",
    "audio/webm",
    "audio/mp4",
    "audio/x-m4a",
];

/// Guess a MIME type from the leading bytes of a file.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x41, 0x56, 0x45, ..] => Some("audio/wav"),
        [0x25, 0x50, 0x44, 0x46, ..] => Some("application/pdf"),
        [0x49, 0x44, 0x33, ..] | [0xFF, 0xFB, ..] | [0xFF, 0xF3, ..] => Some("audio/mpeg"),
        [0x4F, 0x67, 0x67, 0x53, ..] => Some("audio/ogg"),
        [0x66, 0x4C, 0x61, 0x43, ..] => Some("audio/flac"),
        _ => {
            tracing::debug!(
                "Unrecognized file signature (first 4 bytes: {:02X?})",
                &bytes[..bytes.len().min(4)]
            );
            None
        }
    }
}

/// Lower-case the essence of a MIME type, dropping parameters.
pub fn essence(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn is_allowed(mime: &str, allowed: &[&str]) -> bool {
    let essence = essence(mime);
    allowed.iter().any(|candidate| *candidate == essence)
}
