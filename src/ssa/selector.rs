//! Name-class selectors.
//!
//! SSA construction runs in waves, one per class of storage location:
//! registers first, then local variables, then memory dereferences. The same
//! builder code serves every wave, parameterized by a [`NameClass`] predicate
//! that decides which locations the wave renames.

use crate::ir::{ExprArena, ExprId, ExprKind};

/// The class of storage locations a renaming wave processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameClass {
    /// Machine registers (`Reg`).
    Registers,
    /// Declared locals and arguments (`Var`).
    Variables,
    /// Memory dereferences (`Deref`), keyed by their canonicalized address.
    Derefs,
}

impl NameClass {
    /// The wave order of the SSA driver: registers, then variables, then
    /// dereferences. Between waves, known location registers (stack pointer,
    /// flags) are propagated so that the dereference wave sees canonical
    /// addresses.
    pub const WAVES: [Self; 3] = [Self::Registers, Self::Variables, Self::Derefs];

    /// Returns `true` if `id` is a location of this class.
    #[must_use]
    pub fn matches(self, arena: &ExprArena, id: ExprId) -> bool {
        match (self, arena.kind(id)) {
            (Self::Registers, Some(ExprKind::Reg(_)))
            | (Self::Variables, Some(ExprKind::Var(_)))
            | (Self::Derefs, Some(ExprKind::Deref)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_matching() {
        let mut a = ExprArena::new();
        let reg = a.reg("eax", 32);
        let var = a.var("local_8h", 32);
        let addr = a.reg("sp", 64);
        let deref = a.deref(addr, 64);
        let val = a.val(3, 32);

        assert!(NameClass::Registers.matches(&a, reg));
        assert!(!NameClass::Registers.matches(&a, var));
        assert!(NameClass::Variables.matches(&a, var));
        assert!(NameClass::Derefs.matches(&a, deref));
        assert!(!NameClass::Derefs.matches(&a, addr));
        assert!(!NameClass::Variables.matches(&a, val));
    }

    #[test]
    fn test_wave_order() {
        assert_eq!(
            NameClass::WAVES,
            [
                NameClass::Registers,
                NameClass::Variables,
                NameClass::Derefs
            ]
        );
    }
}
