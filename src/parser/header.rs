//! RFC 5322 header blocks: reading up to the blank line, unfolding, and
//! RFC 2047 encoded-word decoding.

use std::io::{BufRead, Read};
use std::path::Path;

use base64::Engine as _;
use thiserror::Error;
use tracing::debug;

use crate::error::{AddrError, Result};

/// Why an encoded-word could not be decoded.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unknown encoded-word encoding '{0}'")]
    UnknownEncoding(char),
    #[error("unhandled charset '{0}'")]
    UnknownCharset(String),
    #[error("invalid base64 in encoded-word: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid Q-encoding in encoded-word")]
    QEncoding,
}

/// The unfolded fields of one message header, in their original order.
#[derive(Debug, Clone, Default)]
pub struct HeaderBlock {
    fields: Vec<(String, String)>,
}

impl HeaderBlock {
    /// Parse raw header bytes (everything before the blank line).
    ///
    /// Continuation lines are joined to the previous field with a single
    /// space. A leading continuation line, a line without a colon, or a
    /// field name containing whitespace is an error.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = decode_header_bytes(raw);
        let mut fields: Vec<(String, String)> = Vec::new();

        for (number, line) in text.lines().enumerate() {
            if line.is_empty() {
                break;
            }
            if line.starts_with([' ', '\t']) {
                let Some(last) = fields.last_mut() else {
                    return Err(AddrError::Header {
                        reason: "continuation line before the first field".to_string(),
                    });
                };
                let continued = line.trim();
                if !continued.is_empty() {
                    if !last.1.is_empty() {
                        last.1.push(' ');
                    }
                    last.1.push_str(continued);
                }
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                return Err(AddrError::Header {
                    reason: format!("line {} has no colon: {line:?}", number + 1),
                });
            };
            if name.is_empty() || name.contains(|c: char| c.is_whitespace() || c.is_control()) {
                return Err(AddrError::Header {
                    reason: format!("invalid field name {name:?}"),
                });
            }
            fields.push((name.to_string(), value.trim().to_string()));
        }

        Ok(Self { fields })
    }

    /// All values of a field, matched case-insensitively, in header order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Number of fields in the block.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Read a header block from `reader`, stopping at the first blank line.
///
/// The body is never read. End of input also terminates the block. A
/// block larger than `max_size` bytes is rejected without reading past
/// that limit.
pub fn read_header_block<R: BufRead>(
    reader: &mut R,
    path: &Path,
    max_size: usize,
) -> Result<Vec<u8>> {
    let mut reader = reader.take(max_size as u64 + 1);
    let mut block = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .map_err(|source| AddrError::MessageRead {
                path: path.to_path_buf(),
                source,
            })?;
        if n == 0 || line == b"\n" || line == b"\r\n" {
            break;
        }
        if block.len() + line.len() > max_size {
            return Err(AddrError::Header {
                reason: format!("header block exceeds {max_size} bytes"),
            });
        }
        block.extend_from_slice(&line);
    }
    Ok(block)
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
fn decode_header_bytes(bytes: &[u8]) -> String {
    // Strip BOM if present
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Text that only resembles an encoded-word is copied through, and so is
/// an encoded-word with an unknown encoding or a corrupt payload. Only an
/// unknown charset fails the whole value.
pub fn decode_encoded_words(input: &str) -> std::result::Result<String, DecodeError> {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        let after_start = &remaining[start + 2..];

        match EncodedWord::split(after_start) {
            Some(word) => match word.decode() {
                Ok(text) => {
                    // Whitespace between two encoded words is dropped (RFC 2047 §6.2)
                    if !last_was_encoded || !before.trim().is_empty() {
                        result.push_str(before);
                    }
                    result.push_str(&text);
                    remaining = &after_start[word.consumed..];
                    last_was_encoded = true;
                }
                Err(e @ DecodeError::UnknownCharset(_)) => return Err(e),
                Err(e) => {
                    let raw = &remaining[start..start + 2 + word.consumed];
                    debug!(word = raw, error = %e, "Keeping malformed encoded-word as text");
                    result.push_str(before);
                    result.push_str(raw);
                    remaining = &after_start[word.consumed..];
                    last_was_encoded = false;
                }
            },
            None => {
                result.push_str(before);
                result.push_str("=?");
                remaining = after_start;
                last_was_encoded = false;
            }
        }
    }

    result.push_str(remaining);
    Ok(result)
}

struct EncodedWord<'a> {
    charset: &'a str,
    encoding: char,
    text: &'a str,
    consumed: usize, // bytes consumed from the string *after* the initial "=?"
}

impl<'a> EncodedWord<'a> {
    /// Recognize `charset?X?text?=` at the start of `s`.
    fn split(s: &'a str) -> Option<Self> {
        let first_q = s.find('?')?;
        let charset = &s[..first_q];
        if charset.is_empty() || charset.contains(char::is_whitespace) {
            return None;
        }

        let rest = &s[first_q + 1..];
        let mut chars = rest.chars();
        let encoding = chars.next()?;
        if chars.next()? != '?' {
            return None;
        }

        let rest2 = &rest[encoding.len_utf8() + 1..];
        let end = rest2.find("?=")?;

        Some(Self {
            charset,
            encoding,
            text: &rest2[..end],
            consumed: first_q + 1 + encoding.len_utf8() + 1 + end + 2,
        })
    }

    fn decode(&self) -> std::result::Result<String, DecodeError> {
        let bytes = match self.encoding {
            'B' | 'b' => base64::engine::general_purpose::STANDARD.decode(self.text)?,
            'Q' | 'q' => decode_q_encoding(self.text)?,
            other => return Err(DecodeError::UnknownEncoding(other)),
        };
        decode_charset(self.charset, &bytes)
    }
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> std::result::Result<Vec<u8>, DecodeError> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' => {
                let hex = bytes.get(i + 1..i + 3).ok_or(DecodeError::QEncoding)?;
                let hex = std::str::from_utf8(hex).map_err(|_| DecodeError::QEncoding)?;
                let byte = u8::from_str_radix(hex, 16).map_err(|_| DecodeError::QEncoding)?;
                result.push(byte);
                i += 3;
            }
            b if (b < b' ' && b != b'\t') || b > b'~' => return Err(DecodeError::QEncoding),
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    Ok(result)
}

/// Decode bytes using a named charset.
fn decode_charset(charset: &str, bytes: &[u8]) -> std::result::Result<String, DecodeError> {
    // RFC 2231 language suffix: "utf-8*en"
    let label = charset.split('*').next().unwrap_or(charset);
    match label.to_lowercase().as_str() {
        "utf-8" | "utf8" => Ok(String::from_utf8_lossy(bytes).into_owned()),
        _ => match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(encoding) => {
                let (decoded, _, _) = encoding.decode(bytes);
                Ok(decoded.into_owned())
            }
            None => Err(DecodeError::UnknownCharset(charset.to_string())),
        },
    }
}
