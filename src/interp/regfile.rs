//! Register file duality (§3, §9): a sparse map the interpreter reads from,
//! and a contiguous flat array the JIT reads and writes through a raw base
//! pointer. [`RegFile::set`] is the one public mutator that keeps both in
//! sync, so the invariant "`flat[r] == to_bytes(map[r])` after every write"
//! cannot be violated from outside this module.

use crate::common::Map;
use crate::error::Error;
use crate::ir::value::{Register, Value};

/// One flat-array slot: a 16-byte `{tag, payload}` record. `tag` exists only
/// to preserve the byte-level ABI contract (§4.G); nothing in this crate
/// reads or writes it.
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct Slot {
    tag: u64,
    payload: u64,
}

pub struct RegFile {
    map: Map<Register, Value>,
    flat: Vec<Slot>,
}

impl RegFile {
    pub fn new() -> Self {
        RegFile {
            map: Map::new(),
            flat: Vec::new(),
        }
    }

    pub fn get(&self, r: Register) -> Result<&Value, Error> {
        self.map.get(&r).ok_or(Error::Reg(r))
    }

    /// Writes `v` into register `r`, updating the sparse map and the flat
    /// array together. Faults with `Type` if `v` has no byte projection
    /// (`Str`/`Loc`/`Null`) — such a value can only ever reach a register
    /// through a hand-built `Program` that bypasses the parser, since the
    /// parser never emits a `LoadImm` of those kinds into a register.
    pub fn set(&mut self, r: Register, v: Value) -> Result<(), Error> {
        let payload = v.to_bytes()?;
        if self.flat.len() <= r as usize {
            self.flat.resize(r as usize + 1, Slot::default());
        }
        self.flat[r as usize] = Slot { tag: 0, payload };
        self.map.insert(r, v);
        Ok(())
    }

    /// The flat array's base address, the ABI contract handed to JITted
    /// code. Valid for reads/writes to any slot already present; the JIT
    /// never reads a register that has not already been written by the
    /// interpreter (a block only goes hot after running interpreted at
    /// least once).
    pub fn base_ptr(&mut self) -> *mut u8 {
        self.flat.as_mut_ptr() as *mut u8
    }
}
