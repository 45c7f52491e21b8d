//! The tiny IR: tagged values, registers, instructions, blocks and functions.
//!
//! This is the data this engine's three tiers share: the [`crate::builder`]
//! assembles it from parser events, the [`crate::interp`] walks it, and the
//! [`crate::jit`] reads a single block's instructions out of it to compile a
//! native page.

pub mod instr;
pub mod program;
pub mod value;

pub use instr::Instruction;
pub use program::{Block, Function, Program};
pub use value::{Register, Value};
