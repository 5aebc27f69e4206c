//! The I/O Source Switch: abstracts "next character" and "next word" across
//! a file handle or an in-memory string, selected by the `SOURCE_ID`
//! register.

use crate::cell::{Cell, MAXIMUM_WORD_LENGTH};
use crate::error::{ForthError, ForthResult};
use crate::files::FileTable;
use crate::image::Image;
use crate::registers::{self, source_id};

/// Reads one character from the current source, or `None` on EOF.
///
/// `string_buf` backs `STRING_IN` mode directly rather than through the
/// image's own byte space: source text can be arbitrarily long (far past
/// the reserved low-cell scratch region), and living outside the image
/// keeps it from ever colliding with the dictionary the same `eval` call
/// may be growing.
pub fn get_char(image: &mut Image, files: &mut FileTable, string_buf: &[u8]) -> ForthResult<Option<u8>> {
    match image.get(registers::SOURCE_ID as Cell)? {
        v if v == source_id::STRING_IN => {
            let idx = image.get(registers::SIDX as Cell)?;
            let len = image.get(registers::SLEN as Cell)?;
            if idx >= len || idx as usize >= string_buf.len() {
                return Ok(None);
            }
            let c = string_buf[idx as usize];
            image.set(registers::SIDX as Cell, idx + 1)?;
            Ok(Some(c))
        }
        v if v == source_id::FILE_IN => {
            let fin = image.get(registers::FIN as Cell)?;
            let mut buf = [0u8; 1];
            let n = files
                .read_bytes(fin, &mut buf)
                .map_err(|e| ForthError::Fatal {
                    reason: e.to_string(),
                })?;
            if n == 0 {
                Ok(None)
            } else {
                Ok(Some(buf[0]))
            }
        }
        other => Err(ForthError::Fatal {
            reason: format!("invalid SOURCE_ID {}", other),
        }),
    }
}

/// Consumes one whitespace-delimited token, at most `MAXIMUM_WORD_LENGTH -
/// 1` bytes. Returns `None` cleanly on EOF with no token pending.
pub fn get_word(image: &mut Image, files: &mut FileTable, string_buf: &[u8]) -> ForthResult<Option<Vec<u8>>> {
    let mut word = Vec::new();
    loop {
        match get_char(image, files, string_buf)? {
            None => {
                return if word.is_empty() { Ok(None) } else { Ok(Some(word)) };
            }
            Some(c) if c.is_ascii_whitespace() => {
                if !word.is_empty() {
                    return Ok(Some(word));
                }
            }
            Some(c) => {
                if word.len() < MAXIMUM_WORD_LENGTH - 1 {
                    word.push(c);
                } else {
                    return Err(ForthError::Recoverable {
                        reason: "word too long".into(),
                    });
                }
            }
        }
    }
}
