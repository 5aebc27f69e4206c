//! The Bootstrap Text: a short Forth source string evaluated once at
//! initialization, defining the `:`-family meta-words, comments, control
//! flow, and basic stack utilities that the primitives alone cannot
//! express.
//!
//! Verbatim in spirit with the reference implementation's
//! `initial_forth_program`, translated into the primitive names this
//! crate's dictionary compiles (`src/opcode.rs::INSTRUCTION_NAMES`).

pub const BOOTSTRAP: &str = "
: here h @ ;
: [ immediate 0 state ! ;
: ] 1 state ! ;
: >mark here 0 , ;
: :noname immediate -1 , here 2 , ] ;
: if immediate ' ?branch , >mark ;
: else immediate ' branch , >mark swap dup here swap - swap ! ;
: then immediate dup here swap - swap ! ;
: begin immediate here ;
: until immediate ' ?branch , here - , ;
: ')' 41 ;
: ( immediate begin key ')' = until ;
: rot >r swap r> swap ;
: -rot rot rot ;
: tuck swap over ;
: nip swap drop ;
: allot here + h ! ;
: bl 32 ;
: emit _emit drop ;
: space bl emit ;
: . pnum drop space ;
: r/o 1 ;
: w/o 0 ;
: r/w 2 ;
";
