//! The foreign-call shim `IWrite` compiles down to.
//!
//! Generated code calls a single C-linkage function with one `i64` argument.
//! That function has no way to carry a Rust closure or a borrow, so the
//! active [`crate::interp::sink::OutputSink`] is parked in a thread-local for
//! the duration of the call. The engine is single-threaded and the call is
//! synchronous (§5), so the raw pointer stashed here never outlives the
//! `with_writer` scope that installed it.

use std::cell::RefCell;

use crate::interp::sink::OutputSink;

thread_local! {
    static CURRENT_WRITER: RefCell<Option<Box<dyn FnMut(i64)>>> = RefCell::new(None);
}

/// The function whose address is baked into compiled blocks as an immediate
/// and invoked via `call rax`.
pub extern "C" fn iwrite_trampoline(value: i64) {
    CURRENT_WRITER.with(|cell| {
        if let Some(write) = cell.borrow_mut().as_mut() {
            write(value);
        }
    });
}

/// Installs `sink` as the trampoline's target for the duration of `body`.
pub fn with_writer<R>(sink: &mut dyn OutputSink, body: impl FnOnce() -> R) -> R {
    let ptr: *mut dyn OutputSink = sink;
    // SAFETY: `body` runs synchronously on this thread and `ptr` is cleared
    // before this function returns, so it never escapes this call.
    let write: Box<dyn FnMut(i64)> = Box::new(move |v: i64| unsafe { (*ptr).write_line(v) });
    CURRENT_WRITER.with(|cell| *cell.borrow_mut() = Some(write));
    let result = body();
    CURRENT_WRITER.with(|cell| *cell.borrow_mut() = None);
    result
}
