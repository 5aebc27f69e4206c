//! The Dictionary Compiler: appends word headers and resolves lookups,
//! case-insensitive and skipping hidden words.
//!
//! A header is laid out `Name (padded) | PWD | MISC | body...`. `PWD`
//! points at the index of the previous header's MISC cell directly (not at
//! a slot holding that address) so the register's own name ("pointer to
//! previous word") and its stored value agree without an extra indirection.
//! Zero terminates the chain.

use crate::cell::{self, Cell, DICTIONARY_START, WORD_LENGTH_OFFSET};
use crate::error::ForthResult;
use crate::image::Image;
use crate::registers;

/// Appends a new header naming `name` with the given opcode packed into
/// MISC, and returns the cell index of the new MISC field (the new `PWD`).
pub fn compile(image: &mut Image, opcode: Cell, name: &[u8]) -> ForthResult<Cell> {
    let dic = image.get(registers::DIC as Cell)?;
    let name_cells = image.write_padded_bytes(dic, name)?;
    let pwd_slot = dic + name_cells;
    let misc_slot = pwd_slot + 1;

    let prev_pwd = image.get(registers::PWD as Cell)?;
    image.set(pwd_slot, prev_pwd)?;

    let misc = (name_cells << WORD_LENGTH_OFFSET) | opcode;
    image.set(misc_slot, misc)?;

    image.set(registers::DIC as Cell, misc_slot + 1)?;
    image.set(registers::PWD as Cell, misc_slot)?;
    Ok(misc_slot)
}

/// Looks a name up starting from `PWD`, walking the previous-word chain.
/// Returns the cell index of the matching header's MISC field, or 0 if no
/// visible word matches.
pub fn find(image: &Image, name: &[u8]) -> ForthResult<Cell> {
    let mut misc_slot = image.get(registers::PWD as Cell)?;
    while misc_slot > DICTIONARY_START as Cell {
        let misc = image.get(misc_slot)?;
        if !cell::word_hidden(misc) {
            let name_cells = cell::word_length(misc);
            let name_start = misc_slot - 1 - name_cells;
            let candidate = image.read_padded_bytes(name_start, name_cells)?;
            if istreq(&candidate, name) {
                return Ok(misc_slot);
            }
        }
        misc_slot = image.get(misc_slot - 1)?; // PWD back-link
    }
    Ok(0)
}

/// Rewrites the most recent header's opcode field in place, used by
/// `IMMEDIATE` to flip a freshly defined word from `COMPILE` to `RUN`.
pub fn set_opcode(image: &mut Image, misc_slot: Cell, opcode: Cell) -> ForthResult<()> {
    let misc = image.get(misc_slot)?;
    image.set(misc_slot, (misc & !cell::INSTRUCTION_MASK) | opcode)
}

/// ASCII-only case-insensitive name comparison.
fn istreq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_ascii_lowercase() == y.to_ascii_lowercase())
}

/// Synthesizes `: NAME VALUE ;` and evaluates it, relying on `:` and `;`
/// already being defined. Used for `define_constant`.
pub fn constant_source(name: &str, value: Cell) -> String {
    format!(": {} {} ;", name, value)
}
