//! Encoding negotiation between callers and storage.
//!
//! Storage only ever holds bytes. On the way in, text is turned into bytes
//! according to its declared encoding (byte input is stored untouched). On
//! the way out, bytes are handed back raw or rendered as text.
//!
//! The streaming coders carry incomplete units across chunk boundaries
//! (a split UTF-8 sequence, half a UTF-16 code unit, a partial Base64
//! group), so chunked output concatenates to exactly the whole-buffer
//! result.

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{VfsError, VfsResult};
use crate::types::{Contents, WriteContent};

/// Supported encodings. Names follow the usual Node.js spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Encoding {
    #[strum(to_string = "utf8", serialize = "utf-8")]
    #[serde(alias = "utf-8")]
    Utf8,
    #[strum(to_string = "ascii")]
    Ascii,
    #[strum(to_string = "latin1", serialize = "binary")]
    #[serde(alias = "binary")]
    Latin1,
    #[strum(to_string = "utf16le", serialize = "utf-16le", serialize = "ucs2", serialize = "ucs-2")]
    #[serde(alias = "ucs2")]
    Utf16Le,
    #[strum(to_string = "base64")]
    Base64,
    /// Either case is accepted on input; output is always lower-case.
    #[strum(to_string = "hex")]
    Hex,
}

/// Lenient Base64 reader: padding optional, as Node's decoder is.
const BASE64_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

impl Encoding {
    /// Parse an encoding name, failing with [`VfsError::UnknownEncoding`].
    pub fn from_name(name: &str) -> VfsResult<Self> {
        name.parse()
            .map_err(|_| VfsError::UnknownEncoding(name.to_string()))
    }

    /// Bytes per indivisible unit when rendering bytes as text.
    fn byte_unit(&self) -> usize {
        match self {
            Encoding::Base64 => 3,
            _ => 1,
        }
    }

    /// Characters per indivisible unit when decoding text into bytes.
    fn text_unit(&self) -> usize {
        match self {
            Encoding::Base64 => 4,
            Encoding::Hex => 2,
            _ => 1,
        }
    }
}

/// Turn text in `encoding` into the bytes it denotes.
pub fn decode_text(text: &str, encoding: Encoding) -> VfsResult<Bytes> {
    let bytes = match encoding {
        Encoding::Utf8 => text.as_bytes().to_vec(),
        Encoding::Ascii => text
            .chars()
            .map(|c| {
                if c.is_ascii() {
                    Ok(c as u8)
                } else {
                    Err(VfsError::encoding(encoding, format!("non-ASCII character {c:?}")))
                }
            })
            .collect::<VfsResult<Vec<u8>>>()?,
        Encoding::Latin1 => text
            .chars()
            .map(|c| {
                u8::try_from(u32::from(c))
                    .map_err(|_| VfsError::encoding(encoding, format!("character {c:?} outside latin1")))
            })
            .collect::<VfsResult<Vec<u8>>>()?,
        Encoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        Encoding::Base64 => {
            let cleaned: String = text
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .map(|c| match c {
                    '-' => '+',
                    '_' => '/',
                    c => c,
                })
                .collect();
            BASE64_LENIENT
                .decode(cleaned)
                .map_err(|e| VfsError::encoding(encoding, e.to_string()))?
        }
        Encoding::Hex => hex::decode(text).map_err(|e| VfsError::encoding(encoding, e.to_string()))?,
    };
    Ok(Bytes::from(bytes))
}

/// Render bytes as text in `encoding`.
///
/// UTF-8 and UTF-16 rendering is lossy: invalid sequences become U+FFFD.
/// A trailing odd byte under UTF-16 is dropped.
pub fn encode_bytes(bytes: &[u8], encoding: Encoding) -> String {
    match encoding {
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Encoding::Ascii => bytes.iter().map(|b| (b & 0x7f) as char).collect(),
        Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        Encoding::Utf16Le => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        Encoding::Base64 => STANDARD.encode(bytes),
        Encoding::Hex => hex::encode(bytes),
    }
}

/// Resolve caller write input into the bytes to store.
///
/// Byte input ignores `encoding`; text defaults to UTF-8.
pub fn to_bytes(content: WriteContent, encoding: Option<Encoding>) -> VfsResult<Bytes> {
    match content {
        WriteContent::Bytes(bytes) => Ok(bytes),
        WriteContent::Text(text) => decode_text(&text, encoding.unwrap_or(Encoding::Utf8)),
    }
}

/// Render stored bytes for the caller: raw without an encoding, text with one.
pub fn render(bytes: Bytes, encoding: Option<Encoding>) -> Contents {
    match encoding {
        None => Contents::Bytes(bytes),
        Some(encoding) => Contents::Text(encode_bytes(&bytes, encoding)),
    }
}

/// Length of a trailing UTF-8 sequence that is still waiting for bytes.
fn utf8_incomplete_tail(buf: &[u8]) -> usize {
    let start = buf.len().saturating_sub(3);
    for i in (start..buf.len()).rev() {
        let b = buf[i];
        if b & 0xC0 == 0x80 {
            continue;
        }
        let expected = match b {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        let have = buf.len() - i;
        return if expected > have { have } else { 0 };
    }
    0
}

/// Incremental bytes → text renderer.
#[derive(Debug)]
pub struct StreamEncoder {
    encoding: Encoding,
    pending: Vec<u8>,
}

impl StreamEncoder {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            pending: Vec::new(),
        }
    }

    /// Feed a chunk; returns whatever text is complete so far.
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let keep = match self.encoding {
            Encoding::Utf8 => utf8_incomplete_tail(&self.pending),
            Encoding::Utf16Le => {
                let odd = self.pending.len() % 2;
                let even = self.pending.len() - odd;
                // hold a trailing high surrogate until its pair arrives
                let high_surrogate = even >= 2
                    && (0xD800..=0xDBFF).contains(&u16::from_le_bytes([
                        self.pending[even - 2],
                        self.pending[even - 1],
                    ]));
                if high_surrogate { odd + 2 } else { odd }
            }
            _ => self.pending.len() % self.encoding.byte_unit(),
        };
        let ready = self.pending.len() - keep;
        let out = encode_bytes(&self.pending[..ready], self.encoding);
        self.pending.drain(..ready);
        out
    }

    /// Flush the remainder at end of stream.
    pub fn finish(self) -> String {
        encode_bytes(&self.pending, self.encoding)
    }
}

/// Incremental text → bytes decoder for streamed writes.
#[derive(Debug)]
pub struct StreamDecoder {
    encoding: Encoding,
    pending: String,
}

impl StreamDecoder {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            pending: String::new(),
        }
    }

    /// Returns true when text is buffered waiting for the rest of a unit.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Feed a text chunk; returns the bytes of every complete unit.
    pub fn push(&mut self, text: &str) -> VfsResult<Bytes> {
        let unit = self.encoding.text_unit();
        if unit == 1 {
            return decode_text(text, self.encoding);
        }

        self.pending
            .extend(text.chars().filter(|c| !c.is_ascii_whitespace()));
        if !self.pending.is_ascii() {
            return Err(VfsError::encoding(self.encoding, "non-ASCII character in input"));
        }
        let ready = self.pending.len() - self.pending.len() % unit;
        let rest = self.pending.split_off(ready);
        let head = std::mem::replace(&mut self.pending, rest);
        decode_text(&head, self.encoding)
    }

    /// Decode whatever is left at end of stream.
    pub fn finish(self) -> VfsResult<Bytes> {
        decode_text(&self.pending, self.encoding)
    }
}
