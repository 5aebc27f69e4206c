//! The machine word of the virtual machine, and the handful of size
//! constants that describe the layout of an image.

/// The machine word. Wide enough to hold a cell index, a signed integer
/// result, or a packed MISC field.
pub type Cell = i64;

/// Unsigned view of a cell, used by `ULESS`/`UMORE`/`SHR` and byte-address
/// arithmetic.
pub type UCell = u64;

/// Default image size when the host does not request a specific one.
pub const DEFAULT_CORE_SIZE: usize = 32 * 1024;

/// Smallest image the interpreter will accept, matching the reference
/// implementation's `MINIMUM_CORE_SIZE`.
pub const MIN_CORE: usize = 2048;

/// Floor under which `STACK_SIZE` is never allowed to fall, even in a tiny
/// image.
pub const MIN_STACK: usize = 64;

/// Size, in cells, of the parse-buffer region reserved for the current word.
pub const STRING_OFFSET: usize = 32;

/// Longest word name the reader will accept, in bytes.
pub const MAXIMUM_WORD_LENGTH: usize = 32;

/// Cell index at which the dictionary begins: past the registers and the
/// parse buffer.
pub const DICTIONARY_START: usize = STRING_OFFSET + MAXIMUM_WORD_LENGTH;

/// Bit offset of the name-length field within MISC.
pub const WORD_LENGTH_OFFSET: u32 = 8;

/// Mask isolating the opcode stored in the low bits of MISC.
pub const INSTRUCTION_MASK: Cell = 0x7f;

/// Hidden-word flag within MISC.
pub const WORD_HIDDEN_BIT: Cell = 0x80;

/// Size in bytes of a block file (`BSAVE`/`BLOAD`).
pub const BLOCK_SIZE: usize = 1024;

pub fn word_length(misc: Cell) -> Cell {
    (misc >> WORD_LENGTH_OFFSET) & 0xff
}

pub fn word_hidden(misc: Cell) -> bool {
    misc & WORD_HIDDEN_BIT != 0
}

pub fn instruction(misc: Cell) -> Cell {
    misc & INSTRUCTION_MASK
}
