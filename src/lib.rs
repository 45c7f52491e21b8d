//! A template tracing JIT for a small three-address IR: parse a textual
//! program, interpret it, and hand hot blocks off to an x86-64 code
//! generator. See `src/bin/triad.rs` for the CLI front door.

pub mod builder;
pub mod common;
pub mod error;
pub mod front;
pub mod interp;
pub mod ir;
pub mod jit;

pub use error::{Error, Result};
