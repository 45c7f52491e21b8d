//! The x86-64 template JIT: page allocator, byte-level encoder, and the
//! per-block compiler that ties them together with the interpreter's ABI.

pub mod alloc;
pub mod compiler;
pub mod encoder;
pub mod trampoline;

pub use compiler::{CompiledBlock, Jit};
