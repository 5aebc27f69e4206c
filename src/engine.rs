//! The Engine: one interpreter instance, wiring together the Memory Image,
//! Dictionary Compiler, Inner Interpreter, Outer Interpreter, I/O Source
//! Switch, and Image Serializer into a single public API.
//!
//! The inner interpreter here is a direct translation of the reference
//! dispatch loop (`for(;(pc=m[I++]);) { w = instruction(m[pc++]); switch
//! (w) {...} }`), restructured as a `match` returning a small `Step` enum
//! instead of C's `goto INNER`. The top-level read-eval loop that the
//! reference implementation builds as a tiny self-recursive threaded word
//! (`TAIL READ RUN ...`) is instead a plain Rust loop driving `read_step`
//! directly; observable behavior matches either way.

use std::io::Write;
use std::path::Path;

use crate::bootstrap::BOOTSTRAP;
use crate::cell::{self, Cell, DICTIONARY_START, MAXIMUM_WORD_LENGTH};
use crate::config::EngineOptions;
use crate::dictionary;
use crate::error::{ForthError, ForthResult};
use crate::files::{FileTable, STDIN_ID, STDOUT_ID};
use crate::image::Image;
use crate::io_source;
use crate::logging;
use crate::numeric;
use crate::opcode::{FileAccessMode, Opcode, LAST_INSTRUCTION};
use crate::registers::{self, ErrorAction};
use crate::serializer;

/// Address stored as a return-stack sentinel to mark "this frame belongs
/// to a top-level word invocation, not a nested call". `EXIT` popping it
/// means the word has fully unwound. Never a valid dictionary address
/// since real addresses start at `DICTIONARY_START`.
const TOP_LEVEL_SENTINEL: Cell = 0;

/// Reserved low cell pre-loaded with the `PUSH` opcode, used as the
/// indirection target when the outer interpreter compiles a numeric
/// literal.
const LITERAL_TRAMPOLINE: Cell = 2;

enum Step {
    Next,
    Done,
}

/// Outcome of a single top-level `read_step` call.
pub enum ReadOutcome {
    Continue,
    Eof,
}

pub struct Engine {
    image: Image,
    files: FileTable,
    /// Backing storage for `STRING_IN` mode; lives outside the image so an
    /// `eval`'d string can be any length without colliding with the
    /// dictionary. Not part of a saved core: `load_core` starts empty.
    string_buf: Vec<u8>,
}

impl Engine {
    pub fn new(options: EngineOptions) -> ForthResult<Engine> {
        if let Some(path) = options.core_image_path.clone() {
            let mut file = std::fs::File::open(&path)?;
            return Engine::load_core(&mut file, options);
        }

        let image = Image::new(options.core_size)?;
        let mut engine = Engine {
            image,
            files: FileTable::new(),
            string_buf: Vec::new(),
        };
        engine.image.cells[LITERAL_TRAMPOLINE as usize] = Opcode::Push as Cell;
        engine.image.cells[registers::FIN] = STDIN_ID;
        engine.image.cells[registers::FOUT] = STDOUT_ID;
        engine.image.cells[registers::STDIN] = STDIN_ID;
        engine.image.cells[registers::STDOUT] = STDOUT_ID;
        engine.image.cells[registers::STDERR] = crate::files::STDERR_ID;
        engine.image.cells[registers::BASE] = options.initial_base;
        engine.image.cells[registers::ERROR_HANDLER] = options.error_action as Cell;
        engine.bootstrap()?;
        Ok(engine)
    }

    fn bootstrap(&mut self) -> ForthResult<()> {
        self.image.cells[registers::PWD] = 0;
        self.image.cells[registers::DIC] = DICTIONARY_START as Cell;

        // `:` and `immediate` are the only two immediate words that are
        // also raw virtual machine instructions: compile them with their
        // own opcode directly in MISC, and no body.
        dictionary::compile(&mut self.image, Opcode::Define as Cell, b":")?;
        dictionary::compile(&mut self.image, Opcode::Immediate as Cell, b"immediate")?;

        // Every other primitive, starting at `READ`, gets a COMPILE-headed
        // word whose single body cell holds its own opcode.
        for i in (Opcode::Read as i64)..LAST_INSTRUCTION {
            let op = Opcode::from_cell(i).expect("contiguous opcode range");
            dictionary::compile(&mut self.image, Opcode::Compile as Cell, op.name().as_bytes())?;
            self.append_body_cell(op as Cell)?;
        }

        // The minimal bootstrap: "state" reads the STATE register address,
        // and ";" compiles a trailing call to "exit" plus the code that
        // drops back into command mode, then marks itself immediate.
        self.eval_str(&format!(": state {} exit : ; immediate ' exit , 0 state ! ;", registers::STATE))?;

        for (i, name) in registers::REGISTER_NAMES.iter().enumerate() {
            self.define_constant(name, (registers::DIC + i) as Cell)?;
        }

        self.eval_str(BOOTSTRAP)?;

        self.define_constant("size", std::mem::size_of::<Cell>() as Cell)?;
        let stack_start = self.image.core_size() as Cell - 2 * self.image.get(registers::STACK_SIZE as Cell)?;
        self.define_constant("stack-start", stack_start)?;
        self.define_constant("max-core", self.image.core_size() as Cell)?;

        self.image.cells[registers::SOURCE_ID] = registers::source_id::FILE_IN;
        self.image.cells[registers::FIN] = STDIN_ID;
        Ok(())
    }

    fn append_body_cell(&mut self, v: Cell) -> ForthResult<()> {
        let dic = self.image.get(registers::DIC as Cell)?;
        self.image.set(dic, v)?;
        self.image.set(registers::DIC as Cell, dic + 1)
    }

    // ---------------------------------------------------------------
    // Public API
    // ---------------------------------------------------------------

    pub fn push(&mut self, value: Cell) -> ForthResult<()> {
        self.data_push(value)
    }

    pub fn pop(&mut self) -> ForthResult<Cell> {
        self.data_pop()
    }

    pub fn stack_position(&self) -> Cell {
        self.data_depth()
    }

    pub fn find(&self, name: &str) -> ForthResult<Cell> {
        dictionary::find(&self.image, name.as_bytes())
    }

    pub fn define_constant(&mut self, name: &str, value: Cell) -> ForthResult<()> {
        self.eval_str(&dictionary::constant_source(name, value))
    }

    pub fn set_file_input(&mut self, path: &Path) -> ForthResult<()> {
        let id = self
            .files
            .open(path, FileAccessMode::ReadOnly)
            .map_err(|e| ForthError::Fatal { reason: e.to_string() })?;
        self.image.set(registers::FIN as Cell, id)?;
        self.image.set(registers::SOURCE_ID as Cell, registers::source_id::FILE_IN)
    }

    pub fn set_file_output(&mut self, path: &Path) -> ForthResult<()> {
        let id = self
            .files
            .open(path, FileAccessMode::WriteOnly)
            .map_err(|e| ForthError::Fatal { reason: e.to_string() })?;
        self.image.set(registers::FOUT as Cell, id)
    }

    /// Loads `text` into the string-input buffer and switches the I/O
    /// Source Switch to string mode.
    pub fn set_string_input(&mut self, text: &str) -> ForthResult<()> {
        self.string_buf = text.as_bytes().to_vec();
        self.image.set(registers::SIDX as Cell, 0)?;
        self.image.set(registers::SLEN as Cell, self.string_buf.len() as Cell)?;
        self.image.set(registers::SOURCE_ID as Cell, registers::source_id::STRING_IN)
    }

    pub fn eval(&mut self, source: &str) -> ForthResult<()> {
        self.eval_str(source)
    }

    fn eval_str(&mut self, source: &str) -> ForthResult<()> {
        let saved_source_id = self.image.get(registers::SOURCE_ID as Cell)?;
        let saved_sidx = self.image.get(registers::SIDX as Cell)?;
        let saved_slen = self.image.get(registers::SLEN as Cell)?;
        let saved_rstk = self.image.get(registers::RSTK as Cell)?;
        let saved_buf = std::mem::take(&mut self.string_buf);

        self.set_string_input(source)?;
        let result = self.run();

        self.image.set(registers::SOURCE_ID as Cell, saved_source_id)?;
        self.image.set(registers::SIDX as Cell, saved_sidx)?;
        self.image.set(registers::SLEN as Cell, saved_slen)?;
        self.image.set(registers::RSTK as Cell, saved_rstk)?;
        self.string_buf = saved_buf;
        result
    }

    /// Drives the outer interpreter until end-of-input, a fatal error, or
    /// an `ERROR_HANDLER = HALT` recoverable error.
    pub fn run(&mut self) -> ForthResult<()> {
        loop {
            if self.image.get(registers::INVALID as Cell)? != 0 {
                return Err(ForthError::Invalid);
            }
            match self.read_step() {
                Ok(ReadOutcome::Continue) => continue,
                Ok(ReadOutcome::Eof) => return Ok(()),
                Err(ForthError::Recoverable { reason }) => {
                    logging::emit(&mut std::io::stderr(), "error", &reason);
                    match ErrorAction::from_cell(self.image.get(registers::ERROR_HANDLER as Cell)?) {
                        ErrorAction::Recover => {
                            let base = self.image.core_size() as Cell
                                - self.image.get(registers::STACK_SIZE as Cell)?;
                            self.image.set(registers::RSTK as Cell, base)?;
                            continue;
                        }
                        ErrorAction::Halt => return Ok(()),
                        ErrorAction::Invalidate => {
                            self.image.set(registers::INVALID as Cell, 1)?;
                            return Err(ForthError::Invalid);
                        }
                    }
                }
                Err(ForthError::Fatal { reason }) => {
                    logging::emit(&mut std::io::stderr(), "fatal", &reason);
                    self.image.set(registers::INVALID as Cell, 1)?;
                    return Err(ForthError::Fatal { reason });
                }
                Err(other) => return Err(other),
            }
        }
    }

    pub fn save_core(&self, out: &mut dyn Write) -> ForthResult<()> {
        serializer::save(&self.image, out)
    }

    pub fn dump_core(&self, out: &mut dyn Write) -> ForthResult<()> {
        serializer::dump(&self.image, out)
    }

    pub fn load_core(source: &mut dyn std::io::Read, options: EngineOptions) -> ForthResult<Engine> {
        let mut image = serializer::load(source)?;
        image.cells[registers::FIN] = STDIN_ID;
        image.cells[registers::FOUT] = STDOUT_ID;
        image.cells[registers::STDIN] = STDIN_ID;
        image.cells[registers::STDOUT] = STDOUT_ID;
        image.cells[registers::STDERR] = crate::files::STDERR_ID;
        let _ = options;
        Ok(Engine {
            image,
            files: FileTable::new(),
            string_buf: Vec::new(),
        })
    }

    // ---------------------------------------------------------------
    // Outer interpreter (READ)
    // ---------------------------------------------------------------

    fn read_step(&mut self) -> ForthResult<ReadOutcome> {
        let word = match io_source::get_word(&mut self.image, &mut self.files, &self.string_buf)? {
            None => return Ok(ReadOutcome::Eof),
            Some(w) => w,
        };
        if word.len() > MAXIMUM_WORD_LENGTH - 1 {
            return Err(ForthError::Recoverable {
                reason: "word too long".into(),
            });
        }

        let addr = dictionary::find(&self.image, &word)?;
        if addr != 0 {
            let misc = self.image.get(addr)?;
            let state = self.image.get(registers::STATE as Cell)?;
            let entry_pc = if state == 0 && cell::instruction(misc) == Opcode::Compile as Cell {
                addr + 1
            } else {
                addr
            };
            self.dispatch_word(entry_pc)?;
            return Ok(ReadOutcome::Continue);
        }

        let base = self.image.get(registers::BASE as Cell)?;
        match numeric::parse(&word, base) {
            Some(value) => {
                if self.image.get(registers::STATE as Cell)? != 0 {
                    self.append_body_cell(LITERAL_TRAMPOLINE)?;
                    self.append_body_cell(value)?;
                } else {
                    self.data_push(value)?;
                }
                Ok(ReadOutcome::Continue)
            }
            None => Err(ForthError::Recoverable {
                reason: format!("{} is not a word", String::from_utf8_lossy(&word)),
            }),
        }
    }

    /// Executes the word whose dispatchable opcode starts at `entry_pc`,
    /// to completion: a bare primitive runs once, a colon-definition (`RUN`
    /// at `entry_pc`) walks its full threaded body until it exits.
    fn dispatch_word(&mut self, entry_pc: Cell) -> ForthResult<()> {
        let raw = self.image.get(entry_pc)?;
        let mut pc = entry_pc;
        let mut i_reg = TOP_LEVEL_SENTINEL;

        if cell::instruction(raw) == Opcode::Run as Cell {
            loop {
                match self.dispatch(&mut i_reg, &mut pc)? {
                    Step::Next => {
                        let next = self.image.get(i_reg)?;
                        i_reg += 1;
                        pc = next;
                    }
                    Step::Done => break,
                }
            }
        } else {
            // A bare primitive (or, in compile mode, `COMPILE` itself
            // appending a call reference): a single dispatch is complete,
            // there is no body to walk.
            self.dispatch(&mut i_reg, &mut pc)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Inner interpreter (threaded-code dispatch)
    // ---------------------------------------------------------------

    fn dispatch(&mut self, i_reg: &mut Cell, pc: &mut Cell) -> ForthResult<Step> {
        let raw = self.image.get(*pc)?;
        *pc += 1;
        let op = Opcode::from_cell(cell::instruction(raw)).ok_or_else(|| ForthError::Fatal {
            reason: format!("illegal opcode at {}", *pc - 1),
        })?;

        use Opcode::*;
        match op {
            Push | Quote => {
                let v = self.image.get(*i_reg)?;
                *i_reg += 1;
                self.data_push(v)?;
            }
            Compile => {
                let dic = self.image.get(registers::DIC as Cell)?;
                self.image.set(dic, *pc)?;
                self.image.set(registers::DIC as Cell, dic + 1)?;
            }
            Run => {
                self.push_return(*i_reg)?;
                *i_reg = *pc;
            }
            Define => {
                self.image.set(registers::STATE as Cell, 1)?;
                let word = io_source::get_word(&mut self.image, &mut self.files, &self.string_buf)?.ok_or(ForthError::Eof)?;
                dictionary::compile(&mut self.image, Opcode::Compile as Cell, &word)?;
                self.append_body_cell(Run as Cell)?;
            }
            Immediate => {
                let dic = self.image.get(registers::DIC as Cell)? - 2;
                dictionary::set_opcode(&mut self.image, dic, Run as Cell)?;
                self.image.set(registers::DIC as Cell, dic + 1)?;
            }
            Read => {
                return match self.read_step()? {
                    ReadOutcome::Continue => Ok(Step::Next),
                    ReadOutcome::Eof => Ok(Step::Done),
                };
            }
            Load => {
                let a = self.data_pop()?;
                let v = self.image.get(a)?;
                self.data_push(v)?;
            }
            Store => {
                let a = self.data_pop()?;
                let v = self.data_pop()?;
                self.image.set(a, v)?;
            }
            CLoad => {
                let a = self.data_pop()?;
                self.data_push(self.image.get_byte(a)? as Cell)?;
            }
            CStore => {
                let a = self.data_pop()?;
                let v = self.data_pop()?;
                self.image.set_byte(a, v as u8)?;
            }
            Sub => self.binary_op(|a, b| a.wrapping_sub(b))?,
            Add => self.binary_op(|a, b| a.wrapping_add(b))?,
            And => self.binary_op(|a, b| a & b)?,
            Or => self.binary_op(|a, b| a | b)?,
            Xor => self.binary_op(|a, b| a ^ b)?,
            Inv => {
                let a = self.data_pop()?;
                self.data_push(!a)?;
            }
            Shl => self.binary_op(|a, b| a.wrapping_shl(b as u32))?,
            Shr => self.binary_op(|a, b| a.wrapping_shr(b as u32))?,
            Mul => self.binary_op(|a, b| a.wrapping_mul(b))?,
            Div => {
                let b = self.data_pop()?;
                let a = self.data_pop()?;
                if b == 0 {
                    return Err(ForthError::Recoverable {
                        reason: "divide by zero".into(),
                    });
                }
                self.data_push(a / b)?;
            }
            ULess => self.binary_op(|a, b| ((a as u64) < (b as u64)) as Cell)?,
            UMore => self.binary_op(|a, b| ((a as u64) > (b as u64)) as Cell)?,
            SLess => self.binary_op(|a, b| (a < b) as Cell)?,
            SMore => self.binary_op(|a, b| (a > b) as Cell)?,
            Exit => {
                let ret = self.pop_return()?;
                if ret == TOP_LEVEL_SENTINEL {
                    return Ok(Step::Done);
                }
                *i_reg = ret;
            }
            Emit => {
                let c = self.data_pop()?;
                let fout = self.image.get(registers::FOUT as Cell)?;
                self.files
                    .write_all(fout, &[(c % 128) as u8])
                    .map_err(|e| ForthError::Fatal { reason: e.to_string() })?;
            }
            Key => {
                let c = io_source::get_char(&mut self.image, &mut self.files, &self.string_buf)?;
                self.data_push(c.map(|b| b as Cell).unwrap_or(0))?;
            }
            FromR => {
                let v = self.pop_return()?;
                self.data_push(v)?;
            }
            ToR => {
                let v = self.data_pop()?;
                self.push_return(v)?;
            }
            Branch => {
                let off = self.image.get(*i_reg)?;
                *i_reg += off;
            }
            QBranch => {
                let cond = self.data_pop()?;
                if cond == 0 {
                    let off = self.image.get(*i_reg)?;
                    *i_reg += off;
                } else {
                    *i_reg += 1;
                }
            }
            PNum => {
                let v = self.data_pop()?;
                self.print_number(v)?;
            }
            Comma => {
                let v = self.data_pop()?;
                self.append_body_cell(v)?;
            }
            Equal => self.binary_op(|a, b| (a == b) as Cell)?,
            Swap => {
                let b = self.data_pop()?;
                let a = self.data_pop()?;
                self.data_push(b)?;
                self.data_push(a)?;
            }
            Dup => {
                let a = self.data_peek()?;
                self.data_push(a)?;
            }
            Drop => {
                self.data_pop()?;
            }
            Over => {
                let a = self.data_peek_at(1)?;
                self.data_push(a)?;
            }
            Tail => {
                let rstk = self.image.get(registers::RSTK as Cell)?;
                self.image.set(registers::RSTK as Cell, rstk - 1)?;
            }
            BSave | BLoad => {
                self.block_io(op == BSave)?;
            }
            Find => {
                let addr = self.data_pop()? as usize;
                let name = self.read_counted_string(addr)?;
                let result = dictionary::find(&self.image, &name)?;
                self.data_push(result)?;
            }
            Print => {
                let addr = self.data_pop()? as usize;
                let s = self.read_counted_string(addr)?;
                let fout = self.image.get(registers::FOUT as Cell)?;
                self.files
                    .write_all(fout, &s)
                    .map_err(|e| ForthError::Fatal { reason: e.to_string() })?;
            }
            Depth => {
                let d = self.data_depth();
                self.data_push(d)?;
            }
            Clock => {
                let millis = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_millis() as Cell)
                    .unwrap_or(0);
                self.data_push(millis)?;
            }
            Evaluate => {
                self.do_evaluate()?;
            }
            PStk => {
                self.print_stack()?;
            }
            Restart => {
                self.image.reset_registers();
            }
            System => {
                self.do_system()?;
            }
            FClose => {
                let id = self.data_pop()?;
                let ok = self.files.close(id).is_ok();
                self.data_push(if ok { 0 } else { -1 })?;
            }
            FOpen => {
                self.do_fopen()?;
            }
            FDelete => {
                let addr = self.data_pop()? as usize;
                let name = self.read_counted_string(addr)?;
                let path = String::from_utf8_lossy(&name).into_owned();
                let ok = self.files.delete(Path::new(&path)).is_ok();
                self.data_push(if ok { 0 } else { -1 })?;
            }
            FRead => {
                self.do_fread()?;
            }
            FWrite => {
                self.do_fwrite()?;
            }
            FPos => {
                let id = self.data_pop()?;
                match self.files.position(id) {
                    Ok(pos) => {
                        self.data_push(pos as Cell)?;
                        self.data_push(0)?;
                    }
                    Err(_) => {
                        self.data_push(0)?;
                        self.data_push(-1)?;
                    }
                }
            }
            FSeek => {
                let id = self.data_pop()?;
                let pos = self.data_pop()?;
                let ok = self.files.seek(id, pos as u64).is_ok();
                self.data_push(if ok { 0 } else { -1 })?;
            }
            FFlush => {
                let id = self.data_pop()?;
                let ok = self.files.flush(id).is_ok();
                self.data_push(if ok { 0 } else { -1 })?;
            }
            FRename => {
                let to_addr = self.data_pop()? as usize;
                let from_addr = self.data_pop()? as usize;
                let to = String::from_utf8_lossy(&self.read_counted_string(to_addr)?).into_owned();
                let from = String::from_utf8_lossy(&self.read_counted_string(from_addr)?).into_owned();
                let ok = self.files.rename(Path::new(&from), Path::new(&to)).is_ok();
                self.data_push(if ok { 0 } else { -1 })?;
            }
        }
        Ok(Step::Next)
    }

    fn binary_op(&mut self, f: impl FnOnce(Cell, Cell) -> Cell) -> ForthResult<()> {
        let b = self.data_pop()?;
        let a = self.data_pop()?;
        self.data_push(f(a, b))
    }

    // ---------------------------------------------------------------
    // Stacks
    // ---------------------------------------------------------------

    fn data_push(&mut self, v: Cell) -> ForthResult<()> {
        let stack_size = self.image.get(registers::STACK_SIZE as Cell)?;
        let limit = self.image.core_size() as Cell - stack_size;
        let top = self.image.get(registers::TOP as Cell)? + 1;
        if top >= limit {
            return Err(ForthError::Recoverable {
                reason: "stack overflow".into(),
            });
        }
        self.image.set(top, v)?;
        self.image.set(registers::TOP as Cell, top)
    }

    fn data_pop(&mut self) -> ForthResult<Cell> {
        let stack_size = self.image.get(registers::STACK_SIZE as Cell)?;
        let base = self.image.core_size() as Cell - 2 * stack_size;
        let top = self.image.get(registers::TOP as Cell)?;
        if top <= base {
            return Err(ForthError::Recoverable {
                reason: "stack underflow".into(),
            });
        }
        let v = self.image.get(top)?;
        self.image.set(registers::TOP as Cell, top - 1)?;
        Ok(v)
    }

    fn data_peek(&self) -> ForthResult<Cell> {
        let top = self.image.get(registers::TOP as Cell)?;
        self.image.get(top)
    }

    fn data_peek_at(&self, depth_from_top: Cell) -> ForthResult<Cell> {
        let top = self.image.get(registers::TOP as Cell)?;
        self.image.get(top - depth_from_top)
    }

    fn data_depth(&self) -> Cell {
        let top = self.image.get(registers::TOP as Cell).unwrap_or(0);
        let base = self.image.core_size() as Cell - 2 * self.image.get(registers::STACK_SIZE as Cell).unwrap_or(0);
        top - base
    }

    fn push_return(&mut self, v: Cell) -> ForthResult<()> {
        let rstk = self.image.get(registers::RSTK as Cell)? + 1;
        let limit = self.image.core_size() as Cell;
        if rstk >= limit {
            return Err(ForthError::Recoverable {
                reason: "return stack overflow".into(),
            });
        }
        self.image.set(rstk, v)?;
        self.image.set(registers::RSTK as Cell, rstk)
    }

    fn pop_return(&mut self) -> ForthResult<Cell> {
        let rstk = self.image.get(registers::RSTK as Cell)?;
        let base = self.image.core_size() as Cell - self.image.get(registers::STACK_SIZE as Cell)?;
        if rstk <= base {
            return Err(ForthError::Recoverable {
                reason: "return stack underflow".into(),
            });
        }
        let v = self.image.get(rstk)?;
        self.image.set(registers::RSTK as Cell, rstk - 1)?;
        Ok(v)
    }

    // ---------------------------------------------------------------
    // Console and numeric-printing helpers
    // ---------------------------------------------------------------

    fn print_number(&mut self, v: Cell) -> ForthResult<()> {
        let base = self.image.get(registers::BASE as Cell)?;
        let radix = if base == 0 { 10 } else { base as u32 };
        let s = to_radix_string(v, radix);
        let fout = self.image.get(registers::FOUT as Cell)?;
        self.files
            .write_all(fout, s.as_bytes())
            .map_err(|e| ForthError::Fatal { reason: e.to_string() })?;
        self.files
            .write_all(fout, b" ")
            .map_err(|e| ForthError::Fatal { reason: e.to_string() })
    }

    fn print_stack(&mut self) -> ForthResult<()> {
        let top = self.image.get(registers::TOP as Cell)?;
        let base = self.image.core_size() as Cell - 2 * self.image.get(registers::STACK_SIZE as Cell)?;
        let fout = self.image.get(registers::FOUT as Cell)?;
        let mut line = String::from("[ ");
        let mut i = base + 1;
        while i <= top {
            line.push_str(&self.image.get(i)?.to_string());
            line.push(' ');
            i += 1;
        }
        line.push(']');
        self.files
            .write_all(fout, line.as_bytes())
            .map_err(|e| ForthError::Fatal { reason: e.to_string() })
    }

    fn read_counted_string(&self, addr: usize) -> ForthResult<Vec<u8>> {
        let len = self.image.get_byte(addr as Cell)? as usize;
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            out.push(self.image.get_byte(addr as Cell + 1 + i as Cell)?);
        }
        Ok(out)
    }

    fn do_evaluate(&mut self) -> ForthResult<()> {
        let len = self.data_pop()?;
        let addr = self.data_pop()?;
        let mut bytes = Vec::with_capacity(len as usize);
        for i in 0..len {
            bytes.push(self.image.get_byte(addr + i)?);
        }
        let text = String::from_utf8_lossy(&bytes).into_owned();
        self.eval_str(&text)
    }

    fn do_system(&mut self) -> ForthResult<()> {
        let len = self.data_pop()?;
        let addr = self.data_pop()?;
        let mut bytes = Vec::with_capacity(len as usize);
        for i in 0..len {
            bytes.push(self.image.get_byte(addr + i)?);
        }
        let cmd_line = String::from_utf8_lossy(&bytes).into_owned();
        let mut parts = cmd_line.split_whitespace();
        let status = match parts.next() {
            Some(program) => std::process::Command::new(program)
                .args(parts)
                .status()
                .map(|s| s.code().unwrap_or(-1))
                .unwrap_or(-1),
            None => -1,
        };
        self.data_push(status as Cell)
    }

    fn do_fopen(&mut self) -> ForthResult<()> {
        let mode = self.data_pop()?;
        let len = self.data_pop()?;
        let addr = self.data_pop()?;
        let mut bytes = Vec::with_capacity(len as usize);
        for i in 0..len {
            bytes.push(self.image.get_byte(addr + i)?);
        }
        let path = String::from_utf8_lossy(&bytes).into_owned();
        match FileAccessMode::from_cell(mode) {
            Some(fam) => match self.files.open(Path::new(&path), fam) {
                Ok(id) => {
                    self.data_push(id)?;
                    self.data_push(0)
                }
                Err(_) => {
                    self.data_push(0)?;
                    self.data_push(-1)
                }
            },
            None => {
                self.data_push(0)?;
                self.data_push(-1)
            }
        }
    }

    fn do_fread(&mut self) -> ForthResult<()> {
        let id = self.data_pop()?;
        let len = self.data_pop()?;
        let addr = self.data_pop()?;
        let mut buf = vec![0u8; len as usize];
        match self.files.read_bytes(id, &mut buf) {
            Ok(n) => {
                for (i, &b) in buf[..n].iter().enumerate() {
                    self.image.set_byte(addr + i as Cell, b)?;
                }
                self.data_push(n as Cell)?;
                self.data_push(0)
            }
            Err(_) => {
                self.data_push(0)?;
                self.data_push(-1)
            }
        }
    }

    fn do_fwrite(&mut self) -> ForthResult<()> {
        let id = self.data_pop()?;
        let len = self.data_pop()?;
        let addr = self.data_pop()?;
        let mut bytes = Vec::with_capacity(len as usize);
        for i in 0..len {
            bytes.push(self.image.get_byte(addr + i)?);
        }
        let ok = self.files.write_all(id, &bytes).is_ok();
        self.data_push(if ok { 0 } else { -1 })
    }

    fn block_io(&mut self, is_save: bool) -> ForthResult<()> {
        let id = self.data_pop()?;
        let offset = self.data_pop()? as usize;
        if offset + cell::BLOCK_SIZE > self.image.core_size() * std::mem::size_of::<Cell>() {
            return Err(ForthError::Recoverable {
                reason: "block does not fit in image".into(),
            });
        }
        let mut buf = vec![0u8; cell::BLOCK_SIZE];
        let result = if is_save {
            for (i, slot) in buf.iter_mut().enumerate() {
                *slot = self.image.get_byte(offset as Cell + i as Cell)?;
            }
            self.files.write_all(id, &buf)
        } else {
            match self.files.read_bytes(id, &mut buf) {
                Ok(_) => {
                    for (i, &b) in buf.iter().enumerate() {
                        self.image.set_byte(offset as Cell + i as Cell, b)?;
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };
        self.data_push(if result.is_ok() { 0 } else { -1 })
    }
}

fn to_radix_string(v: Cell, radix: u32) -> String {
    if v == 0 {
        return "0".to_string();
    }
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let neg = v < 0;
    let mut n = (v as i128).unsigned_abs() as u128;
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % radix as u128) as usize]);
        n /= radix as u128;
    }
    if neg {
        out.push(b'-');
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(EngineOptions::default()).unwrap()
    }

    #[test]
    fn addition() {
        let mut e = engine();
        e.eval("2 2 +").unwrap();
        assert_eq!(e.pop().unwrap(), 4);
    }

    #[test]
    fn square_definition() {
        let mut e = engine();
        e.eval(": sq dup * ; 5 sq").unwrap();
        assert_eq!(e.pop().unwrap(), 25);
    }

    #[test]
    fn hex_literal_or() {
        let mut e = engine();
        e.eval("0xAA0A 0x5055 or").unwrap();
        assert_eq!(e.pop().unwrap(), 0xFA5F);
    }

    #[test]
    fn begin_until_loop() {
        let mut e = engine();
        e.eval(": lt begin 1 + dup 10 u> until ; 1 lt").unwrap();
        assert_eq!(e.pop().unwrap(), 11);
    }

    #[test]
    fn base_defaults_to_zero() {
        let mut e = engine();
        e.eval("base @ 0 =").unwrap();
        assert_eq!(e.pop().unwrap(), 1);
    }

    #[test]
    fn if_else_then() {
        let mut e = engine();
        e.eval(": if-test if 0x55 else 0xAA then ; 0 if-test").unwrap();
        assert_eq!(e.pop().unwrap(), 0xAA);

        let mut e2 = engine();
        e2.eval(": if-test if 0x55 else 0xAA then ; 1 if-test").unwrap();
        assert_eq!(e2.pop().unwrap(), 0x55);
    }

    #[test]
    fn push_pop_round_trip() {
        let mut e = engine();
        e.push(42).unwrap();
        assert_eq!(e.pop().unwrap(), 42);
    }

    #[test]
    fn define_constant_then_read() {
        let mut e = engine();
        e.define_constant("answer", 42).unwrap();
        e.eval("answer").unwrap();
        assert_eq!(e.pop().unwrap(), 42);
    }

    #[test]
    fn divide_by_zero_is_recoverable() {
        let mut e = engine();
        e.eval("1 0 /").unwrap();
        e.eval("2 2 +").unwrap();
        assert_eq!(e.pop().unwrap(), 4);
    }

    #[test]
    fn unknown_word_is_recoverable() {
        let mut e = engine();
        e.eval("this-word-does-not-exist").unwrap();
        e.eval("2 2 +").unwrap();
        assert_eq!(e.pop().unwrap(), 4);
    }

    #[test]
    fn whitespace_padding_is_not_observable() {
        let mut e = engine();
        e.eval("   2   2   +   \n\n").unwrap();
        assert_eq!(e.pop().unwrap(), 4);
    }

    #[test]
    fn save_and_load_round_trip_preserves_behavior() {
        let mut e = engine();
        e.eval(": sq dup * ;").unwrap();
        let mut buf = Vec::new();
        e.save_core(&mut buf).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let mut loaded = Engine::load_core(&mut cursor, EngineOptions::default()).unwrap();
        loaded.eval("6 sq").unwrap();
        assert_eq!(loaded.pop().unwrap(), 36);
    }
}
