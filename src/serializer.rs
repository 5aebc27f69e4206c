//! The Image Serializer: saves and loads the memory image with a magic
//! header, cell-size and endianness checks.
//!
//! Endian-aware reads and writes use `scroll`, the same crate
//! `m4b-goblin` reaches for to parse binary container formats.

use std::io::{self, Read, Write};
use std::mem::size_of;

use scroll::{Pread, Pwrite, BE};

use crate::cell::{Cell, MIN_CORE};
use crate::error::{ForthError, ForthResult};
use crate::image::Image;

const MAGIC0: u8 = 0xFF;
const MAGIC1: u8 = b'4';
const MAGIC2: u8 = b'T';
const MAGIC3: u8 = b'H';
const MAGIC7: u8 = 0xFF;
const CORE_VERSION: u8 = 2;

const HEADER_LEN: usize = 8;

fn host_endianness_byte() -> u8 {
    if cfg!(target_endian = "little") {
        1
    } else {
        0
    }
}

fn build_header() -> [u8; HEADER_LEN] {
    [
        MAGIC0,
        MAGIC1,
        MAGIC2,
        MAGIC3,
        size_of::<Cell>() as u8,
        CORE_VERSION,
        host_endianness_byte(),
        MAGIC7,
    ]
}

/// Serializes `image` as: header, big-endian 8-byte `core_size`, then the
/// raw cell array in host byte order and width.
pub fn save(image: &Image, out: &mut dyn Write) -> ForthResult<()> {
    out.write_all(&build_header())?;

    let mut size_buf = [0u8; 8];
    size_buf
        .pwrite_with(image.core_size() as u64, 0, BE)
        .expect("fixed 8-byte buffer");
    out.write_all(&size_buf)?;

    for &cell in &image.cells {
        out.write_all(&cell.to_ne_bytes())?;
    }
    Ok(())
}

/// Dumps the image identically to `save`, but documents (per the public
/// API contract) that the result is a raw snapshot, not guaranteed
/// reloadable. Callers that want a round-trippable file should prefer
/// `save`. The two share an implementation because the on-disk format is
/// the only difference `load` checks for.
pub fn dump(image: &Image, out: &mut dyn Write) -> ForthResult<()> {
    save(image, out)
}

/// Reads back an image, rejecting any mismatch against this build's cell
/// size or endianness, and any `core_size` below `MIN_CORE`.
pub fn load(source: &mut dyn Read) -> ForthResult<Image> {
    let mut header = [0u8; HEADER_LEN];
    source.read_exact(&mut header).map_err(wrap_eof)?;

    let expected = build_header();
    if header[0] != MAGIC0 || header[1] != MAGIC1 || header[2] != MAGIC2 || header[3] != MAGIC3 || header[7] != MAGIC7
    {
        return Err(ForthError::BadImage {
            reason: "magic number mismatch".into(),
        });
    }
    if header[4] != expected[4] {
        return Err(ForthError::BadImage {
            reason: format!("cell size mismatch: image is {} bytes, this build is {}", header[4], expected[4]),
        });
    }
    if header[5] != expected[5] {
        return Err(ForthError::BadImage {
            reason: format!("version mismatch: image is {}, this build supports {}", header[5], expected[5]),
        });
    }
    if header[6] != expected[6] {
        return Err(ForthError::BadImage {
            reason: "endianness mismatch".into(),
        });
    }

    let mut size_buf = [0u8; 8];
    source.read_exact(&mut size_buf).map_err(wrap_eof)?;
    let core_size: u64 = size_buf.pread_with(0, BE).expect("fixed 8-byte buffer");
    let core_size = core_size as usize;
    if core_size < MIN_CORE {
        return Err(ForthError::BadImage {
            reason: format!("core_size {} below minimum {}", core_size, MIN_CORE),
        });
    }

    let mut cells = Vec::with_capacity(core_size);
    let mut buf = [0u8; size_of::<Cell>()];
    for _ in 0..core_size {
        source.read_exact(&mut buf).map_err(wrap_eof)?;
        cells.push(Cell::from_ne_bytes(buf));
    }

    // Registers are part of the saved state and come back as-is: a stack
    // left non-empty at save time must still be non-empty after load. Only
    // host-only transient handles (open file descriptors) need refreshing,
    // which is the caller's job, not this format reader's.
    let image = Image::from_cells(cells)?;
    Ok(image)
}

fn wrap_eof(e: io::Error) -> ForthError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ForthError::BadImage {
            reason: "truncated image".into(),
        }
    } else {
        ForthError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_cells() {
        let mut image = Image::new(MIN_CORE).unwrap();
        image.cells[100] = 0x1234;
        image.cells[200] = -9;

        let mut buf = Vec::new();
        save(&image, &mut buf).unwrap();

        let mut cursor = io::Cursor::new(buf);
        let loaded = load(&mut cursor).unwrap();
        assert_eq!(loaded.cells, image.cells);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut cursor = io::Cursor::new(vec![0u8; HEADER_LEN + 8]);
        assert!(load(&mut cursor).is_err());
    }

    #[test]
    fn rejects_undersized_core() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&build_header());
        let mut size_buf = [0u8; 8];
        size_buf.pwrite_with(10u64, 0, BE).unwrap();
        buf.extend_from_slice(&size_buf);
        let mut cursor = io::Cursor::new(buf);
        assert!(load(&mut cursor).is_err());
    }
}
