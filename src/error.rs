//! The error taxonomy shared by every layer of the engine.
//!
//! Every fallible operation in this crate returns `Result<T, Error>`. There is
//! no local recovery anywhere below the CLI: the first failure aborts the
//! whole run, and the CLI is the only place a message is ever printed.

use crate::common::Id;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input text or an illegal numeric literal.
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A structural violation reported by the [`crate::builder::Builder`].
    #[error("shape error: {message}")]
    Shape { message: String },

    /// A reference to a register that has never been assigned.
    #[error("register r{0} has no value")]
    Reg(u32),

    /// A value was used at a tag it does not carry.
    #[error("type error: expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },

    /// The JIT was asked to compile an instruction outside its supported subset.
    #[error("unsupported instruction in block {block}: {message}")]
    Unsupported { block: Id, message: String },

    /// The OS refused to hand back an executable memory page.
    #[error("resource error: {message}")]
    Resource { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
