//! The relational rank lattice.
//!
//! The six comparison relations form a lattice encoded by a 3-bit rank. Each
//! bit admits one of the three possible orderings of `x` and `y`:
//!
//! | bit | ordering |
//! |-----|----------|
//! | 001 | `x == y` |
//! | 010 | `x < y`  |
//! | 100 | `x > y`  |
//!
//! A relation holds iff the actual ordering's bit is set in its rank, so
//! `EQ=001`, `LT=010`, `LE=011`, `GT=100`, `GE=101`, `NE=110`, with `000`
//! never true and `111` always true. Disjunction, conjunction, equivalence,
//! and negation of comparisons over the *same* operands then reduce to
//! bitwise arithmetic on ranks:
//!
//! - `(x ⋈₁ y) || (x ⋈₂ y)` has rank `rank₁ | rank₂`
//! - `(x ⋈₁ y) && (x ⋈₂ y)` has rank `rank₁ & rank₂`
//! - `(x ⋈₁ y) == (x ⋈₂ y)` has rank `!(rank₁ ^ rank₂)`
//! - `!(x ⋈ y)` has rank `rank ^ 111`

use crate::ir::CmpOp;

/// Mask of all three ordering bits (`111`, always true).
pub const RANK_ALL: u8 = 0b111;

/// Result of mapping a combined rank back to a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOutcome {
    /// Rank `000`: the combined condition can never hold.
    Never,
    /// Rank `111`: the combined condition always holds.
    Always,
    /// Any other rank: the corresponding comparison operator.
    Cmp(CmpOp),
}

/// Returns the 3-bit rank of a comparison operator.
#[must_use]
pub const fn rank(op: CmpOp) -> u8 {
    match op {
        CmpOp::Eq => 0b001,
        CmpOp::Lt => 0b010,
        CmpOp::Le => 0b011,
        CmpOp::Gt => 0b100,
        CmpOp::Ge => 0b101,
        CmpOp::Ne => 0b110,
    }
}

/// Maps a rank back to its relational outcome.
///
/// Ranks above `111` are masked down; `000` and `111` map to the constant
/// outcomes.
#[must_use]
pub const fn from_rank(value: u8) -> RankOutcome {
    match value & RANK_ALL {
        0b000 => RankOutcome::Never,
        0b001 => RankOutcome::Cmp(CmpOp::Eq),
        0b010 => RankOutcome::Cmp(CmpOp::Lt),
        0b011 => RankOutcome::Cmp(CmpOp::Le),
        0b100 => RankOutcome::Cmp(CmpOp::Gt),
        0b101 => RankOutcome::Cmp(CmpOp::Ge),
        0b110 => RankOutcome::Cmp(CmpOp::Ne),
        _ => RankOutcome::Always,
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_rank_round_trip() {
        for op in CmpOp::iter() {
            assert_eq!(from_rank(rank(op)), RankOutcome::Cmp(op));
        }
    }

    #[test]
    fn test_disjunction_widens() {
        // (x < y) || (x == y)  ->  x <= y
        assert_eq!(
            from_rank(rank(CmpOp::Lt) | rank(CmpOp::Eq)),
            RankOutcome::Cmp(CmpOp::Le)
        );
        // (x < y) || (x > y)  ->  x != y
        assert_eq!(
            from_rank(rank(CmpOp::Lt) | rank(CmpOp::Gt)),
            RankOutcome::Cmp(CmpOp::Ne)
        );
        // (x <= y) || (x >= y) is always true
        assert_eq!(
            from_rank(rank(CmpOp::Le) | rank(CmpOp::Ge)),
            RankOutcome::Always
        );
    }

    #[test]
    fn test_conjunction_narrows() {
        // (x <= y) && (x >= y)  ->  x == y
        assert_eq!(
            from_rank(rank(CmpOp::Le) & rank(CmpOp::Ge)),
            RankOutcome::Cmp(CmpOp::Eq)
        );
        // (x < y) && (x > y) can never hold
        assert_eq!(
            from_rank(rank(CmpOp::Lt) & rank(CmpOp::Gt)),
            RankOutcome::Never
        );
    }

    #[test]
    fn test_negation_flips_all_bits() {
        assert_eq!(
            from_rank(rank(CmpOp::Lt) ^ RANK_ALL),
            RankOutcome::Cmp(CmpOp::Ge)
        );
        assert_eq!(
            from_rank(rank(CmpOp::Eq) ^ RANK_ALL),
            RankOutcome::Cmp(CmpOp::Ne)
        );
    }

    #[test]
    fn test_equivalence_of_relations() {
        // (x < y) == (x < y) is always true
        assert_eq!(
            from_rank(!(rank(CmpOp::Lt) ^ rank(CmpOp::Lt))),
            RankOutcome::Always
        );
        // (x < y) == (x >= y) can never hold
        assert_eq!(
            from_rank(!(rank(CmpOp::Lt) ^ rank(CmpOp::Ge))),
            RankOutcome::Never
        );
    }
}
