//! Per-block translation from IR to machine code, and the page cache.

use std::collections::HashMap;

use tracing::trace;

use crate::common::Id;
use crate::error::Error;
use crate::ir::instr::Instruction;
use crate::ir::program::Block;

use super::alloc::{CodePage, PAGE_SIZE};
use super::encoder::{Encoder, Reg};

/// The register holding the flat array's base pointer for the duration of a
/// generated block, per this crate's System-V convention (§9).
const BASE: Reg = Reg::Rdi;

/// One compiled block: its code page plus the offset its `Cbr` loops back to.
pub struct CompiledBlock {
    page: CodePage,
    #[allow(dead_code)] // kept for disassembly/debugging, not read at runtime
    body_start: usize,
    len: usize,
}

impl CompiledBlock {
    /// Invokes the compiled block. `registers_base` must point at a flat
    /// array with at least as many slots as any register this block reads or
    /// writes; `globals_base` is carried for ABI symmetry only (see §4.H).
    ///
    /// # Safety
    /// The caller must ensure `registers_base` is valid for the lifetime of
    /// the call and large enough for every slot this block touches.
    pub unsafe fn execute(&self, registers_base: *mut u8, globals_base: *mut u8) -> u64 {
        let entry: unsafe extern "C" fn(*mut u8, *mut u8) -> u64 =
            std::mem::transmute(self.page.as_ptr());
        entry(registers_base, globals_base)
    }
}

/// A cache entry. Negative results are cached too: a block outside the JIT's
/// supported subset (DESIGN.md's tenth open-question decision) is never
/// going to compile differently on a later hit, so remembering the failure
/// avoids re-encoding the same doomed block on every subsequent back-edge.
enum CacheEntry {
    Compiled(CompiledBlock),
    Unsupported(String),
}

/// Owns the page cache for one interpreter run. Dropping it releases every
/// page it compiled.
#[derive(Default)]
pub struct Jit {
    cache: HashMap<(Id, Id), CacheEntry>,
}

impl Jit {
    pub fn new() -> Self {
        Jit::default()
    }

    /// Compiles `block` if `(func, block.name)` is not already cached, then
    /// returns the cached page either way. A block whose instructions fall
    /// outside the supported subset fails every time with `Unsupported`
    /// (from the cached message, not a fresh re-encode); any other failure
    /// (e.g. `Resource`) is not cached, since it may be transient.
    pub fn compile_cached(&mut self, func: Id, block: &Block) -> Result<&CompiledBlock, Error> {
        let key = (func, block.name);
        if !self.cache.contains_key(&key) {
            let entry = match compile_block(block) {
                Ok(compiled) => CacheEntry::Compiled(compiled),
                Err(Error::Unsupported { message, .. }) => CacheEntry::Unsupported(message),
                Err(other) => return Err(other),
            };
            self.cache.insert(key, entry);
        }
        match self.cache.get(&key).expect("just inserted") {
            CacheEntry::Compiled(compiled) => Ok(compiled),
            CacheEntry::Unsupported(message) => Err(Error::Unsupported {
                block: block.name,
                message: message.clone(),
            }),
        }
    }
}

fn compile_block(block: &Block) -> Result<CompiledBlock, Error> {
    let mut enc = Encoder::new();
    enc.push(Reg::Rbp);
    enc.push(Reg::Rbx);
    let body_start = enc.offset();

    let mut last_cmp = None;

    for instr in &block.instrs {
        if let Some(kind) = instr.cmp_kind() {
            emit_cmp(&mut enc, instr)?;
            last_cmp = Some(kind);
            continue;
        }
        match instr {
            Instruction::I2I { src, dst } => {
                enc.mov_load_slot(BASE, *src, Reg::R8);
                enc.mov_store_slot(BASE, *dst, Reg::R8);
            }
            Instruction::Add { lhs, rhs, dst } => {
                enc.mov_load_slot(BASE, *lhs, Reg::Rax);
                enc.mov_load_slot(BASE, *rhs, Reg::R8);
                enc.add_reg_reg(Reg::R8, Reg::Rax);
                enc.mov_store_slot(BASE, *dst, Reg::Rax);
            }
            Instruction::AddImm { lhs, rhs, dst } => {
                enc.mov_load_slot(BASE, *lhs, Reg::Rax);
                let imm = rhs.to_bytes()? as i64 as i32;
                enc.add_imm32(Reg::Rax, imm);
                enc.mov_store_slot(BASE, *dst, Reg::Rax);
            }
            Instruction::Mult { lhs, rhs, dst } => {
                enc.mov_load_slot(BASE, *lhs, Reg::Rax);
                enc.mov_load_slot(BASE, *rhs, Reg::R8);
                enc.imul_reg_reg(Reg::R8, Reg::Rax);
                enc.mov_store_slot(BASE, *dst, Reg::Rax);
            }
            Instruction::Cbr { loc, .. } => {
                if *loc != block.name {
                    return Err(Error::Unsupported {
                        block: block.name,
                        message: "the JIT only supports a Cbr back to its own block".into(),
                    });
                }
                let kind = last_cmp.ok_or_else(|| Error::Unsupported {
                    block: block.name,
                    message: "cbr with no preceding comparison".into(),
                })?;
                enc.jcc(kind, body_start);
            }
            Instruction::IWrite { src } => {
                enc.push(BASE);
                enc.sub_imm32(Reg::Rsp, 8);
                enc.mov_load_slot(BASE, *src, Reg::Rdi);
                enc.mov_imm64(Reg::Rax, super::trampoline::iwrite_trampoline as usize as u64);
                enc.call_reg(Reg::Rax);
                enc.add_imm32(Reg::Rsp, 8);
                enc.pop(BASE);
            }
            other => {
                return Err(Error::Unsupported {
                    block: block.name,
                    message: format!("instruction `{other}` is outside the JIT's supported subset"),
                })
            }
        }
    }

    enc.pop(Reg::Rbx);
    enc.pop(Reg::Rbp);
    enc.ret();

    let code = enc.into_bytes();
    if code.len() > PAGE_SIZE {
        return Err(Error::Resource {
            message: format!("compiled block {} ({} bytes) exceeds one code page", block.name, code.len()),
        });
    }
    trace!(block = %block.name, bytes = code.len(), "emitted machine code");

    let mut page = CodePage::new()?;
    unsafe {
        std::ptr::copy_nonoverlapping(code.as_ptr(), page.as_mut_ptr(), code.len());
    }
    Ok(CompiledBlock {
        page,
        body_start,
        len: code.len(),
    })
}

fn emit_cmp(enc: &mut Encoder, instr: &Instruction) -> Result<(), Error> {
    let (lhs, rhs) = match instr {
        Instruction::CmpGT { lhs, rhs, .. }
        | Instruction::CmpGE { lhs, rhs, .. }
        | Instruction::CmpLT { lhs, rhs, .. }
        | Instruction::CmpLE { lhs, rhs, .. } => (*lhs, *rhs),
        _ => unreachable!("emit_cmp called on a non-comparison instruction"),
    };
    enc.mov_load_slot(BASE, lhs, Reg::Rax);
    enc.mov_load_slot(BASE, rhs, Reg::R8);
    enc.cmp_reg_reg(Reg::R8, Reg::Rax);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::id;
    use crate::ir::instr::Instruction;
    use crate::ir::value::Value;

    fn block_with(instrs: Vec<Instruction>) -> Block {
        let mut func = crate::ir::program::Function::new(id("f"), 0, vec![]);
        let mut b = crate::ir::program::fresh_entry_block(&mut func);
        b.instrs = instrs;
        b
    }

    #[test]
    fn straight_line_block_compiles() {
        let block = block_with(vec![
            Instruction::Add { lhs: 0, rhs: 1, dst: 2 },
            Instruction::IWrite { src: 2 },
        ]);
        let mut jit = Jit::new();
        let compiled = jit.compile_cached(id("f"), &block).unwrap();
        assert!(compiled.len > 0);
    }

    #[test]
    fn prologue_and_epilogue_preserve_rbx_and_rbp() {
        let block = block_with(vec![Instruction::I2I { src: 0, dst: 1 }]);
        let compiled = compile_block(&block).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(compiled.page.as_ptr(), compiled.len) };
        assert_eq!(&bytes[..2], &[0x55, 0x53]); // push rbp; push rbx
        assert_eq!(&bytes[bytes.len() - 3..], &[0x5B, 0x5D, 0xC3]); // pop rbx; pop rbp; ret
    }

    #[test]
    fn non_self_branch_is_unsupported() {
        let block = block_with(vec![Instruction::Cbr { src: 0, loc: id("elsewhere") }]);
        let mut jit = Jit::new();
        assert!(matches!(jit.compile_cached(id("f"), &block), Err(Error::Unsupported { .. })));
    }

    #[test]
    fn mult_imm_is_unsupported() {
        let block = block_with(vec![Instruction::MultImm { lhs: 0, rhs: Value::Int(2), dst: 1 }]);
        let mut jit = Jit::new();
        assert!(matches!(jit.compile_cached(id("f"), &block), Err(Error::Unsupported { .. })));
    }

    #[test]
    fn second_compile_of_same_key_reuses_cache() {
        let block = block_with(vec![Instruction::I2I { src: 0, dst: 1 }]);
        let mut jit = Jit::new();
        let first_ptr = jit.compile_cached(id("f"), &block).unwrap().page.as_ptr();
        let second_ptr = jit.compile_cached(id("f"), &block).unwrap().page.as_ptr();
        assert_eq!(first_ptr, second_ptr);
    }

    #[test]
    fn unsupported_result_is_cached_not_recomputed() {
        let block = block_with(vec![Instruction::MultImm { lhs: 0, rhs: Value::Int(2), dst: 1 }]);
        let mut jit = Jit::new();
        let first = jit.compile_cached(id("f"), &block).unwrap_err();
        let second = jit.compile_cached(id("f"), &block).unwrap_err();
        assert_eq!(jit.cache.len(), 1);
        assert_eq!(first.to_string(), second.to_string());
    }
}
