//! Tagged scalars and the register namespace.

use derive_more::Display;

use crate::common::Id;
use crate::error::Error;

/// A non-negative register index. Registers are a dense namespace with no
/// per-name typing; slot `i` in the flat array is the [`Value::to_bytes`]
/// image of whatever value was last assigned to register `i`.
pub type Register = u32;

/// A tagged scalar.
///
/// `Int` and `Float` are the only variants arithmetic is defined over; `Str`
/// and `Loc` both carry owned text but differ in role (`Str` is a data-section
/// literal, `Loc` is a symbolic label usable only as a [`crate::ir::Instruction::Cbr`]
/// target).
#[derive(Clone, Debug, PartialEq, Display)]
pub enum Value {
    #[display("null")]
    Null,
    #[display("{_0}")]
    Int(i64),
    #[display("{_0}")]
    Float(f32),
    #[display("{_0:?}")]
    Str(String),
    #[display("{_0}")]
    Loc(Id),
}

impl Value {
    fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Loc(_) => "loc",
        }
    }

    fn type_error(&self, expected: &'static str) -> Error {
        Error::Type {
            expected,
            found: self.kind_name(),
        }
    }

    pub fn as_int(&self) -> Result<i64, Error> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(other.type_error("int")),
        }
    }

    pub fn as_float(&self) -> Result<f32, Error> {
        match self {
            Value::Float(f) => Ok(*f),
            other => Err(other.type_error("float")),
        }
    }

    pub fn as_string(&self) -> Result<&str, Error> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(other.type_error("str")),
        }
    }

    pub fn as_loc(&self) -> Result<Id, Error> {
        match self {
            Value::Loc(name) => Ok(*name),
            other => Err(other.type_error("loc")),
        }
    }

    /// C-style boolean: `Int(0)` is false, any other `Int` is true.
    fn as_bool_int(b: bool) -> Value {
        Value::Int(b as i64)
    }

    pub fn add(&self, other: &Value) -> Result<Value, Error> {
        Ok(Value::Int(self.as_int()?.wrapping_add(other.as_int()?)))
    }

    pub fn mult(&self, other: &Value) -> Result<Value, Error> {
        Ok(Value::Int(self.as_int()?.wrapping_mul(other.as_int()?)))
    }

    pub fn cmp_lt(&self, other: &Value) -> Result<Value, Error> {
        Ok(Self::as_bool_int(self.as_int()? < other.as_int()?))
    }

    pub fn cmp_le(&self, other: &Value) -> Result<Value, Error> {
        Ok(Self::as_bool_int(self.as_int()? <= other.as_int()?))
    }

    pub fn cmp_gt(&self, other: &Value) -> Result<Value, Error> {
        Ok(Self::as_bool_int(self.as_int()? > other.as_int()?))
    }

    pub fn cmp_ge(&self, other: &Value) -> Result<Value, Error> {
        Ok(Self::as_bool_int(self.as_int()? >= other.as_int()?))
    }

    /// The sole bridge between interpreter values and the JIT's flat register
    /// array: widens `Int` to 64 bits, bit-reinterprets `Float`, and faults on
    /// `Str`/`Loc`/`Null` rather than leaking a pointer into JITted code.
    pub fn to_bytes(&self) -> Result<u64, Error> {
        match self {
            Value::Int(i) => Ok(*i as u64),
            Value::Float(f) => Ok(f.to_bits() as u64),
            other => Err(other.type_error("int or float")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_bytes_widens_int() {
        assert_eq!(Value::Int(-1).to_bytes().unwrap(), u64::MAX);
        assert_eq!(Value::Int(7).to_bytes().unwrap(), 7);
    }

    #[test]
    fn to_bytes_reinterprets_float_bits() {
        let v = Value::Float(1.5);
        assert_eq!(v.to_bytes().unwrap(), (1.5f32).to_bits() as u64);
    }

    #[test]
    fn to_bytes_faults_on_non_numeric() {
        assert!(Value::Null.to_bytes().is_err());
        assert!(Value::Str("x".into()).to_bytes().is_err());
        assert!(Value::Loc(crate::common::id("L")).to_bytes().is_err());
    }

    #[test]
    fn arithmetic_requires_int_operands() {
        assert!(Value::Float(1.0).add(&Value::Int(1)).is_err());
    }

    #[test]
    fn cmp_boundaries() {
        let a = Value::Int(3);
        assert_eq!(a.cmp_lt(&a).unwrap(), Value::Int(0));
        assert_eq!(a.cmp_le(&a).unwrap(), Value::Int(1));
    }

    #[test]
    fn mult_wraps_on_overflow() {
        let max = Value::Int(i64::MAX);
        assert_eq!(max.mult(&Value::Int(2)).unwrap(), Value::Int(i64::MAX.wrapping_mul(2)));
    }
}
