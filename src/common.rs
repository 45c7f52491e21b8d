//! Common definitions that are shared between different parts of the engine.

// Use sorted maps for consistent output (iteration order follows key order,
// so two builds of the same program dump identically).
pub use std::collections::BTreeMap as Map;

/// Interned identifiers: function names, block names, global names.
///
/// Interning means two identifiers with the same text compare equal by
/// pointer, which is what lets `Register` (a plain integer) and `Id` live
/// side by side as cheap, `Copy`-able keys throughout the IR.
pub type Id = internment::Intern<String>;

/// Shorthand constructor for an [`Id`] from anything string-like.
pub fn id(s: impl Into<String>) -> Id {
    internment::Intern::new(s.into())
}
