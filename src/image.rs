//! The memory image: one contiguous vector of cells holding registers, the
//! parse buffer, the dictionary, and both stacks.

use crate::cell::{Cell, DICTIONARY_START, MIN_CORE, MIN_STACK, STRING_OFFSET};
use crate::error::{ForthError, ForthResult};
use crate::registers::{self, REGISTER_COUNT};

/// Bump-allocated linear memory. `DIC` monotonically increases until the
/// image is reset; the variable and return stacks grow upward from the top
/// of the image.
#[derive(Debug, Clone)]
pub struct Image {
    pub cells: Vec<Cell>,
}

impl Image {
    pub fn new(core_size: usize) -> ForthResult<Image> {
        if core_size < MIN_CORE {
            return Err(ForthError::ImageTooSmall {
                requested: core_size,
                minimum: MIN_CORE,
            });
        }
        let mut image = Image {
            cells: vec![0; core_size],
        };
        image.reset_registers();
        Ok(image)
    }

    pub fn from_cells(cells: Vec<Cell>) -> ForthResult<Image> {
        if cells.len() < MIN_CORE {
            return Err(ForthError::ImageTooSmall {
                requested: cells.len(),
                minimum: MIN_CORE,
            });
        }
        Ok(Image { cells })
    }

    pub fn core_size(&self) -> usize {
        self.cells.len()
    }

    /// (Re-)establishes the default registers on both a fresh image and a
    /// reloaded one: stack geometry, string-buffer/dictionary start, and
    /// the initial command-mode state. Transient handles (`FIN`/`FOUT`/
    /// `STDIN`/...) are left to the caller, since they are meaningless
    /// across a save or
    /// across processes.
    pub fn reset_registers(&mut self) {
        let core_size = self.core_size() as Cell;
        let stack_size = std::cmp::max(core_size / MIN_STACK as Cell, MIN_STACK as Cell);
        self.cells[registers::STACK_SIZE] = stack_size;
        self.cells[registers::RSTK] = core_size - stack_size;
        self.cells[registers::TOP] = core_size - 2 * stack_size;
        self.cells[registers::STATE] = 0;
        self.cells[registers::BASE] = 0;
        self.cells[registers::SOURCE_ID] = registers::source_id::FILE_IN;
        self.cells[registers::ARGC] = 0;
        self.cells[registers::ARGV] = 0;
        self.cells[registers::ERROR_HANDLER] = 0;
        self.cells[registers::DEBUG] = 0;
        if self.cells[registers::DIC] == 0 {
            self.cells[registers::DIC] = DICTIONARY_START as Cell;
        }
        if self.cells[registers::PWD] == 0 {
            self.cells[registers::PWD] = 0;
        }
        let _ = REGISTER_COUNT;
        let _ = STRING_OFFSET;
    }

    #[inline]
    pub fn get(&self, addr: Cell) -> ForthResult<Cell> {
        self.bounds_check(addr)?;
        Ok(self.cells[addr as usize])
    }

    #[inline]
    pub fn set(&mut self, addr: Cell, value: Cell) -> ForthResult<()> {
        self.bounds_check(addr)?;
        self.cells[addr as usize] = value;
        Ok(())
    }

    #[inline]
    fn bounds_check(&self, addr: Cell) -> ForthResult<()> {
        if addr < 0 || addr as usize >= self.cells.len() {
            return Err(ForthError::Fatal {
                reason: format!("address {} out of bounds", addr),
            });
        }
        Ok(())
    }

    /// `CLOAD`: read a single byte, addressing the image as a flat byte
    /// array in host byte order (matches the reference implementation's
    /// `((uint8_t*)m)[addr]`).
    pub fn get_byte(&self, byte_addr: Cell) -> ForthResult<u8> {
        let (cell_idx, offset) = self.byte_location(byte_addr)?;
        let bytes = self.cells[cell_idx].to_ne_bytes();
        Ok(bytes[offset])
    }

    /// `CSTORE`: write a single byte at the given byte address.
    pub fn set_byte(&mut self, byte_addr: Cell, value: u8) -> ForthResult<()> {
        let (cell_idx, offset) = self.byte_location(byte_addr)?;
        let mut bytes = self.cells[cell_idx].to_ne_bytes();
        bytes[offset] = value;
        self.cells[cell_idx] = Cell::from_ne_bytes(bytes);
        Ok(())
    }

    fn byte_location(&self, byte_addr: Cell) -> ForthResult<(usize, usize)> {
        if byte_addr < 0 {
            return Err(ForthError::Fatal {
                reason: format!("byte address {} out of bounds", byte_addr),
            });
        }
        let cell_bytes = std::mem::size_of::<Cell>();
        let cell_idx = byte_addr as usize / cell_bytes;
        let offset = byte_addr as usize % cell_bytes;
        if cell_idx >= self.cells.len() {
            return Err(ForthError::Fatal {
                reason: format!("byte address {} out of bounds", byte_addr),
            });
        }
        Ok((cell_idx, offset))
    }

    /// Writes `bytes` (NUL-padded to a whole number of cells) starting at
    /// `cell_addr`, returning the number of cells consumed. Used by the
    /// dictionary compiler to lay down a word's name field.
    pub fn write_padded_bytes(&mut self, cell_addr: Cell, bytes: &[u8]) -> ForthResult<Cell> {
        let cell_size = std::mem::size_of::<Cell>();
        let ncells = (bytes.len() + cell_size) / cell_size; // +1 for the NUL terminator
        for i in 0..ncells {
            let mut buf = [0u8; 8];
            for b in 0..cell_size {
                let src = i * cell_size + b;
                if src < bytes.len() {
                    buf[b] = bytes[src];
                }
            }
            self.set(cell_addr + i as Cell, Cell::from_ne_bytes(buf))?;
        }
        Ok(ncells as Cell)
    }

    /// Reads back a NUL-terminated, padded name field of `ncells` cells
    /// starting at `cell_addr`.
    pub fn read_padded_bytes(&self, cell_addr: Cell, ncells: Cell) -> ForthResult<Vec<u8>> {
        let cell_size = std::mem::size_of::<Cell>();
        let mut out = Vec::with_capacity(ncells as usize * cell_size);
        for i in 0..ncells {
            let v = self.get(cell_addr + i)?;
            out.extend_from_slice(&v.to_ne_bytes());
        }
        if let Some(pos) = out.iter().position(|&b| b == 0) {
            out.truncate(pos);
        }
        Ok(out)
    }
}
