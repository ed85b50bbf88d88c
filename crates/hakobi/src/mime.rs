//! Content sniffing for mimetypes.
//!
//! Used when an adapter has no native content type. Binary formats are
//! recognised by their magic bytes; anything else that looks like text
//! (no NUL bytes, valid UTF-8) is `text/plain`.

/// Fallback for unrecognised binary content.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Plain text.
pub const TEXT_PLAIN: &str = "text/plain";

/// Bytes we look at by default.
pub const DEFAULT_SNIFF_LEN: usize = 4096;

/// A magic signature: `bytes` must appear at `offset`.
struct Signature {
    offset: usize,
    bytes: &'static [u8],
    mimetype: &'static str,
}

const fn sig(offset: usize, bytes: &'static [u8], mimetype: &'static str) -> Signature {
    Signature {
        offset,
        bytes,
        mimetype,
    }
}

static SIGNATURES: &[Signature] = &[
    sig(0, b"\x89PNG\r\n\x1a\n", "image/png"),
    sig(0, b"\xff\xd8\xff", "image/jpeg"),
    sig(0, b"GIF87a", "image/gif"),
    sig(0, b"GIF89a", "image/gif"),
    sig(0, b"II*\x00", "image/tiff"),
    sig(0, b"MM\x00*", "image/tiff"),
    sig(0, b"\x00\x00\x01\x00", "image/x-icon"),
    sig(0, b"8BPS", "image/vnd.adobe.photoshop"),
    sig(0, b"%PDF-", "application/pdf"),
    sig(0, b"PK\x03\x04", "application/zip"),
    sig(0, b"PK\x05\x06", "application/zip"),
    sig(0, b"\x1f\x8b", "application/gzip"),
    sig(0, b"BZh", "application/x-bzip2"),
    sig(0, b"\xfd7zXZ\x00", "application/x-xz"),
    sig(0, b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed"),
    sig(0, b"Rar!\x1a\x07", "application/vnd.rar"),
    sig(257, b"ustar", "application/x-tar"),
    sig(0, b"\x00asm", "application/wasm"),
    sig(0, b"\x7fELF", "application/x-elf"),
    sig(0, b"SQLite format 3\x00", "application/vnd.sqlite3"),
    sig(0, b"wOFF", "font/woff"),
    sig(0, b"wOF2", "font/woff2"),
    sig(0, b"OggS", "audio/ogg"),
    sig(0, b"fLaC", "audio/flac"),
    sig(0, b"ID3", "audio/mpeg"),
    sig(0, b"MThd", "audio/midi"),
    sig(4, b"ftyp", "video/mp4"),
];

/// "BM" alone is too common in text; require the zeroed reserved field.
fn sniff_bmp(sample: &[u8]) -> Option<&'static str> {
    (sample.starts_with(b"BM") && sample.get(6..10) == Some(&[0u8; 4][..])).then_some("image/bmp")
}

/// RIFF containers carry their real type at offset 8.
fn sniff_riff(sample: &[u8]) -> Option<&'static str> {
    if !sample.starts_with(b"RIFF") || sample.len() < 12 {
        return None;
    }
    match &sample[8..12] {
        b"WEBP" => Some("image/webp"),
        b"WAVE" => Some("audio/wav"),
        b"AVI " => Some("video/x-msvideo"),
        _ => None,
    }
}

fn matches(sample: &[u8], sig: &Signature) -> bool {
    sample
        .get(sig.offset..sig.offset + sig.bytes.len())
        .is_some_and(|window| window == sig.bytes)
}

/// True when the sample reads as UTF-8 text.
///
/// The sample may be cut mid-character, so an incomplete sequence at the
/// very end still counts as text.
fn looks_like_text(sample: &[u8]) -> bool {
    if sample.contains(&0) {
        return false;
    }
    match std::str::from_utf8(sample) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

/// Guess a mimetype from the leading bytes of a file.
pub fn sniff(sample: &[u8]) -> &'static str {
    if let Some(found) = SIGNATURES.iter().find(|sig| matches(sample, sig)) {
        return found.mimetype;
    }
    if let Some(found) = sniff_riff(sample).or_else(|| sniff_bmp(sample)) {
        return found;
    }
    if looks_like_text(sample) {
        TEXT_PLAIN
    } else {
        OCTET_STREAM
    }
}
