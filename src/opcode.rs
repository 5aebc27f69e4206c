//! The primitive instruction set executed by the inner interpreter.
//!
//! Ordering matches the reference `enum instructions` exactly: opcode values
//! are serialized into saved images, so the numbering is load-bearing, not
//! cosmetic.

use crate::cell::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum Opcode {
    Push = 0,
    Compile,
    Run,
    Define,
    Immediate,
    Read,
    Load,
    Store,
    CLoad,
    CStore,
    Sub,
    Add,
    And,
    Or,
    Xor,
    Inv,
    Shl,
    Shr,
    Mul,
    Div,
    ULess,
    UMore,
    SLess,
    SMore,
    Exit,
    Emit,
    Key,
    FromR,
    ToR,
    Branch,
    QBranch,
    PNum,
    Quote,
    Comma,
    Equal,
    Swap,
    Dup,
    Drop,
    Over,
    Tail,
    BSave,
    BLoad,
    Find,
    Print,
    Depth,
    Clock,
    Evaluate,
    PStk,
    Restart,
    System,
    FClose,
    FOpen,
    FDelete,
    FRead,
    FWrite,
    FPos,
    FSeek,
    FFlush,
    FRename,
}

pub const LAST_INSTRUCTION: Cell = Opcode::FRename as Cell + 1;

/// Forth-visible names, in opcode order. Used both to compile the
/// primitives into the dictionary at startup and to print `see`-style
/// dumps.
pub const INSTRUCTION_NAMES: &[&str] = &[
    "push",
    "compile",
    "run",
    "define",
    "immediate",
    "read",
    "@",
    "!",
    "c@",
    "c!",
    "-",
    "+",
    "and",
    "or",
    "xor",
    "invert",
    "lshift",
    "rshift",
    "*",
    "/",
    "u<",
    "u>",
    "<",
    ">",
    "exit",
    "_emit",
    "key",
    "r>",
    ">r",
    "branch",
    "?branch",
    "pnum",
    "'",
    ",",
    "=",
    "swap",
    "dup",
    "drop",
    "over",
    "tail",
    "bsave",
    "bload",
    "find",
    "print",
    "depth",
    "clock",
    "evaluate",
    ".s",
    "restart",
    "system",
    "close-file",
    "open-file",
    "delete-file",
    "read-file",
    "write-file",
    "file-position",
    "reposition-file",
    "flush-file",
    "rename-file",
];

impl Opcode {
    pub fn from_cell(v: Cell) -> Option<Opcode> {
        use Opcode::*;
        Some(match v {
            0 => Push,
            1 => Compile,
            2 => Run,
            3 => Define,
            4 => Immediate,
            5 => Read,
            6 => Load,
            7 => Store,
            8 => CLoad,
            9 => CStore,
            10 => Sub,
            11 => Add,
            12 => And,
            13 => Or,
            14 => Xor,
            15 => Inv,
            16 => Shl,
            17 => Shr,
            18 => Mul,
            19 => Div,
            20 => ULess,
            21 => UMore,
            22 => SLess,
            23 => SMore,
            24 => Exit,
            25 => Emit,
            26 => Key,
            27 => FromR,
            28 => ToR,
            29 => Branch,
            30 => QBranch,
            31 => PNum,
            32 => Quote,
            33 => Comma,
            34 => Equal,
            35 => Swap,
            36 => Dup,
            37 => Drop,
            38 => Over,
            39 => Tail,
            40 => BSave,
            41 => BLoad,
            42 => Find,
            43 => Print,
            44 => Depth,
            45 => Clock,
            46 => Evaluate,
            47 => PStk,
            48 => Restart,
            49 => System,
            50 => FClose,
            51 => FOpen,
            52 => FDelete,
            53 => FRead,
            54 => FWrite,
            55 => FPos,
            56 => FSeek,
            57 => FFlush,
            58 => FRename,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        INSTRUCTION_NAMES[self as usize]
    }
}

/// File access modes, in the order the reference implementation assigns
/// them (`FAM_WO = 0`, `FAM_RO = 1`, `FAM_RW = 2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAccessMode {
    WriteOnly = 0,
    ReadOnly = 1,
    ReadWrite = 2,
}

impl FileAccessMode {
    pub fn from_cell(v: Cell) -> Option<FileAccessMode> {
        match v {
            0 => Some(FileAccessMode::WriteOnly),
            1 => Some(FileAccessMode::ReadOnly),
            2 => Some(FileAccessMode::ReadWrite),
            _ => None,
        }
    }
}
