//! Byte-level x86-64 emission: the fixed subset of opcodes this engine needs,
//! nothing more. Every primitive here corresponds to exactly one line of the
//! wire contract's encoding table.

use crate::ir::instr::CmpKind;

/// Hardware register numbering: RAX=0 .. R15=15. "Extended" (≥8) registers
/// need a REX.R/B bit to reach.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(dead_code)] // full hardware numbering per §4.G; this engine's codegen only needs a few
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Reg {
    fn num(self) -> u8 {
        self as u8
    }

    fn is_extended(self) -> bool {
        self.num() >= 8
    }

    fn low3(self) -> u8 {
        self.num() & 0x7
    }
}

/// The byte size of one flat register slot, and the offset of its `payload`
/// field within it. See the wire contract: `i * 16 + 8`.
pub const SLOT_SIZE: i32 = 16;
pub const PAYLOAD_OFFSET: i32 = 8;

fn slot_disp(slot: u32) -> i32 {
    slot as i32 * SLOT_SIZE + PAYLOAD_OFFSET
}

fn jcc_opcode(kind: CmpKind) -> u8 {
    match kind {
        CmpKind::Lt => 0x8C,
        CmpKind::Le => 0x8E,
        CmpKind::Gt => 0x8F,
        CmpKind::Ge => 0x8D,
    }
}

/// A forward-only byte cursor building one block's machine code.
#[derive(Default)]
pub struct Encoder {
    code: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Encoder::default()
    }

    pub fn offset(&self) -> usize {
        self.code.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.code
    }

    fn byte(&mut self, b: u8) {
        self.code.push(b);
    }

    fn dword(&mut self, v: i32) {
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    fn qword(&mut self, v: u64) {
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    /// REX.W always set (every primitive here is 64-bit); R from the `/r`
    /// register, B from the r/m register or opcode-embedded register.
    fn rex(&mut self, r_ext: bool, b_ext: bool) {
        let mut rex = 0x48;
        if r_ext {
            rex |= 0x4;
        }
        if b_ext {
            rex |= 0x1;
        }
        self.byte(rex);
    }

    pub fn mov_reg_reg(&mut self, src: Reg, dst: Reg) {
        self.rex(src.is_extended(), dst.is_extended());
        self.byte(0x89);
        self.byte(0xC0 | (src.low3() << 3) | dst.low3());
    }

    /// `mov dst, [base + slot*16 + 8]`.
    pub fn mov_load_slot(&mut self, base: Reg, slot: u32, dst: Reg) {
        self.rex(dst.is_extended(), base.is_extended());
        self.byte(0x8B);
        self.byte(0x80 | (dst.low3() << 3) | base.low3());
        self.dword(slot_disp(slot));
    }

    /// `mov [base + slot*16 + 8], src`.
    pub fn mov_store_slot(&mut self, base: Reg, slot: u32, src: Reg) {
        self.rex(src.is_extended(), base.is_extended());
        self.byte(0x89);
        self.byte(0x80 | (src.low3() << 3) | base.low3());
        self.dword(slot_disp(slot));
    }

    pub fn mov_imm64(&mut self, dst: Reg, imm: u64) {
        self.rex(false, dst.is_extended());
        self.byte(0xB8 | dst.low3());
        self.qword(imm);
    }

    pub fn add_reg_reg(&mut self, src: Reg, dst: Reg) {
        self.rex(src.is_extended(), dst.is_extended());
        self.byte(0x01);
        self.byte(0xC0 | (src.low3() << 3) | dst.low3());
    }

    pub fn add_imm32(&mut self, dst: Reg, imm: i32) {
        self.rex(false, dst.is_extended());
        self.byte(0x81);
        self.byte(0xC0 | dst.low3());
        self.dword(imm);
    }

    pub fn sub_imm32(&mut self, dst: Reg, imm: i32) {
        self.rex(false, dst.is_extended());
        self.byte(0x81);
        self.byte(0xE8 | dst.low3());
        self.dword(imm);
    }

    pub fn imul_reg_reg(&mut self, src: Reg, dst: Reg) {
        self.rex(dst.is_extended(), src.is_extended());
        self.byte(0x0F);
        self.byte(0xAF);
        self.byte(0xC0 | (dst.low3() << 3) | src.low3());
    }

    pub fn cmp_reg_reg(&mut self, src: Reg, dst: Reg) {
        self.rex(src.is_extended(), dst.is_extended());
        self.byte(0x39);
        self.byte(0xC0 | (src.low3() << 3) | dst.low3());
    }

    /// Conditional near jump of `kind` to `target_offset`, an absolute
    /// offset already written into this buffer (the recorded body-start).
    pub fn jcc(&mut self, kind: CmpKind, target_offset: usize) {
        self.byte(0x0F);
        self.byte(jcc_opcode(kind));
        let disp_pos = self.offset();
        self.dword(0);
        let after_disp = disp_pos + 4;
        let disp = target_offset as i64 - after_disp as i64;
        self.code[disp_pos..disp_pos + 4].copy_from_slice(&(disp as i32).to_le_bytes());
    }

    pub fn push(&mut self, reg: Reg) {
        if reg.is_extended() {
            self.byte(0x41);
        }
        self.byte(0x50 | reg.low3());
    }

    pub fn pop(&mut self, reg: Reg) {
        if reg.is_extended() {
            self.byte(0x41);
        }
        self.byte(0x58 | reg.low3());
    }

    /// `call reg` (indirect, `0xFF /2`).
    pub fn call_reg(&mut self, reg: Reg) {
        if reg.is_extended() {
            self.byte(0x41);
        }
        self.byte(0xFF);
        self.byte(0xD0 | reg.low3());
    }

    pub fn ret(&mut self) {
        self.byte(0xC3);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(CmpKind::Lt, 0x8C)]
    #[case(CmpKind::Le, 0x8E)]
    #[case(CmpKind::Gt, 0x8F)]
    #[case(CmpKind::Ge, 0x8D)]
    fn jcc_opcode_matches_table(#[case] kind: CmpKind, #[case] opcode: u8) {
        assert_eq!(jcc_opcode(kind), opcode);
    }

    #[test]
    fn mov_reg_reg_encodes_rex_w() {
        let mut e = Encoder::new();
        e.mov_reg_reg(Reg::Rax, Reg::R8);
        assert_eq!(e.into_bytes(), vec![0x49, 0x89, 0xC0]);
    }

    #[test]
    fn load_slot_computes_disp_from_slot_index() {
        let mut e = Encoder::new();
        e.mov_load_slot(Reg::Rdi, 2, Reg::Rax);
        let bytes = e.into_bytes();
        assert_eq!(&bytes[3..7], &(2i32 * 16 + 8).to_le_bytes());
    }

    #[test]
    fn jcc_disp_is_relative_to_byte_after_operand() {
        let mut e = Encoder::new();
        e.mov_reg_reg(Reg::Rax, Reg::R8); // 3 bytes, body starts at 0
        e.jcc(CmpKind::Lt, 0);
        let bytes = e.into_bytes();
        assert_eq!(bytes[3], 0x0F);
        assert_eq!(bytes[4], 0x8C);
        let disp = i32::from_le_bytes(bytes[5..9].try_into().unwrap());
        assert_eq!(disp, 0 - 9);
    }

    #[test]
    fn push_pop_extended_register_sets_rex_b() {
        let mut e = Encoder::new();
        e.push(Reg::R8);
        e.pop(Reg::R8);
        assert_eq!(e.into_bytes(), vec![0x41, 0x50, 0x41, 0x58]);
    }
}
