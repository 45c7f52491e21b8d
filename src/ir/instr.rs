//! The closed instruction set.

use derive_more::Display;

use crate::common::Id;
use crate::ir::value::{Register, Value};

/// A single IR instruction. Immutable once built; every block is a flat,
/// owned `Vec<Instruction>` with lifetimes tied to the owning [`crate::ir::Program`].
#[derive(Clone, Debug, Display)]
pub enum Instruction {
    /// `.data` section marker.
    #[display(".data")]
    Data,
    /// `.text` section marker.
    #[display(".text")]
    Text,
    /// `name = value`, only valid inside the data section.
    #[display("{name} = {value}")]
    Global { name: Id, value: Value },
    /// Opens a new function.
    #[display(".frame {name}, {size}, {}", params.iter().map(|r| format!("r{r}")).collect::<Vec<_>>().join(", "))]
    Frame {
        name: Id,
        size: u32,
        params: Vec<Register>,
    },
    /// Opens a new block.
    #[display("{name}:")]
    Label { name: Id },
    /// `register[dst] <- register[src]`.
    #[display("i2i    r{src} => r{dst}")]
    I2I { src: Register, dst: Register },
    /// `register[dst] <- value`.
    #[display("loadI  {value} => r{dst}")]
    LoadImm { value: Value, dst: Register },
    #[display("add    r{lhs}, r{rhs} => r{dst}")]
    Add {
        lhs: Register,
        rhs: Register,
        dst: Register,
    },
    #[display("addI   r{lhs}, {rhs} => r{dst}")]
    AddImm {
        lhs: Register,
        rhs: Value,
        dst: Register,
    },
    #[display("mult   r{lhs}, r{rhs} => r{dst}")]
    Mult {
        lhs: Register,
        rhs: Register,
        dst: Register,
    },
    #[display("multI  r{lhs}, {rhs} => r{dst}")]
    MultImm {
        lhs: Register,
        rhs: Value,
        dst: Register,
    },
    #[display("cmp_GT r{lhs}, r{rhs} => r{dst}")]
    CmpGT {
        lhs: Register,
        rhs: Register,
        dst: Register,
    },
    #[display("cmp_GE r{lhs}, r{rhs} => r{dst}")]
    CmpGE {
        lhs: Register,
        rhs: Register,
        dst: Register,
    },
    #[display("cmp_LT r{lhs}, r{rhs} => r{dst}")]
    CmpLT {
        lhs: Register,
        rhs: Register,
        dst: Register,
    },
    #[display("cmp_LE r{lhs}, r{rhs} => r{dst}")]
    CmpLE {
        lhs: Register,
        rhs: Register,
        dst: Register,
    },
    /// Branch to `loc` if `register[src]` is a nonzero `Int`; fall through otherwise.
    #[display("cbr    r{src} -> {loc}")]
    Cbr { src: Register, loc: Id },
    /// Leave the current frame.
    #[display("ret")]
    Ret,
    #[display("nop")]
    Nop,
    /// Print the `Int` in `register[src]` followed by a newline.
    #[display("iwrite r{src}")]
    IWrite { src: Register },
}

/// The four comparison kinds, shared between the instruction set and the
/// JIT's recorded "last compare" state (see [`crate::jit::compiler`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum CmpKind {
    #[display("LT")]
    Lt,
    #[display("LE")]
    Le,
    #[display("GT")]
    Gt,
    #[display("GE")]
    Ge,
}

impl Instruction {
    /// The comparison kind of a `CmpXX` instruction, if this is one.
    pub fn cmp_kind(&self) -> Option<CmpKind> {
        match self {
            Instruction::CmpLT { .. } => Some(CmpKind::Lt),
            Instruction::CmpLE { .. } => Some(CmpKind::Le),
            Instruction::CmpGT { .. } => Some(CmpKind::Gt),
            Instruction::CmpGE { .. } => Some(CmpKind::Ge),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_print_matches_grammar() {
        let i = Instruction::LoadImm {
            value: Value::Int(7),
            dst: 0,
        };
        assert_eq!(i.to_string(), "loadI  7 => r0");

        let cbr = Instruction::Cbr {
            src: 2,
            loc: crate::common::id("L"),
        };
        assert_eq!(cbr.to_string(), "cbr    r2 -> L");
    }
}
