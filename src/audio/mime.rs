//! Audio MIME handling and the multipart body for transcription uploads.

use std::path::Path;

/// Strip parameters (`; codecs=...`) and whitespace.
pub fn normalize_mime_type(mime_type: &str) -> Option<&str> {
    let normalized = mime_type
        .split(';')
        .next()
        .map(str::trim)
        .unwrap_or_default();
    if normalized.is_empty() {
        return None;
    }
    Some(normalized)
}

pub fn is_supported_mime(mime_type: &str) -> bool {
    extension_for_mime(mime_type).is_some()
}

/// File extension the transcription endpoint expects for `mime_type`.
pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "audio/mpeg" | "audio/mp3" | "audio/mpga" => Some("mp3"),
        "audio/mp4" | "video/mp4" | "audio/x-m4a" | "audio/m4a" => Some("m4a"),
        "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
        "audio/webm" => Some("webm"),
        "audio/ogg" => Some("ogg"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        _ => None,
    }
}

/// Guess a MIME type from a file name.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "mp3" | "mpga" | "mpeg" => Some("audio/mpeg"),
        "m4a" | "mp4" => Some("audio/mp4"),
        "wav" => Some("audio/wav"),
        "webm" => Some("audio/webm"),
        "ogg" | "oga" => Some("audio/ogg"),
        "flac" => Some("audio/flac"),
        _ => None,
    }
}

pub(crate) fn build_transcription_multipart(
    boundary: &str,
    model: &str,
    audio: &[u8],
    mime_type: &str,
    extension: &str,
    language: Option<&str>,
) -> Vec<u8> {
    let mut body = Vec::with_capacity(audio.len() + 512);

    append_field(&mut body, boundary, "model", model);
    if let Some(lang) = language {
        append_field(&mut body, boundary, "language", lang.trim());
    }

    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"question.{extension}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(audio);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    body
}

fn append_field(body: &mut Vec<u8>, boundary: &str, name: &str, value: &str) {
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
    );
    body.extend_from_slice(value.as_bytes());
    body.extend_from_slice(b"\r\n");
}
