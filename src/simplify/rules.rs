//! The rewrite rule catalogue.
//!
//! Rules are partitioned by the arity of the node being rewritten (unary /
//! binary / comparison / ternary, plus the two ref/deref cancellations) and
//! tried in a fixed order. Every rule either returns a detached replacement
//! node or `None` ("did not fire"); the engine in [`super`] splices the
//! replacement in and keeps going.
//!
//! Constant folding is performed only when sign-safe: a right shift folds
//! only when the left constant's most-significant bit is clear, so the result
//! does not depend on whether the lifter meant a logical or an arithmetic
//! shift. All other folds are exact at the node's bit width.

use crate::{
    ir::{
        expr::{sign_extend, truncate},
        BinaryOp, CmpOp, ExprId, ExprKind, UnaryOp,
    },
    simplify::{
        relational::{from_rank, rank, RankOutcome, RANK_ALL},
        Simplifier,
    },
};

impl Simplifier<'_> {
    pub(crate) fn try_rules(&mut self, id: ExprId) -> Option<ExprId> {
        enum Arity {
            Unary(UnaryOp),
            Binary(BinaryOp),
            Cmp(CmpOp),
            TCond,
            Deref,
            AddrOf,
        }

        let arity = match self.arena.kind(id)? {
            ExprKind::Unary(op) => Arity::Unary(*op),
            ExprKind::Binary(op) => Arity::Binary(*op),
            ExprKind::Cmp(op) => Arity::Cmp(*op),
            ExprKind::TCond => Arity::TCond,
            ExprKind::Deref => Arity::Deref,
            ExprKind::AddrOf => Arity::AddrOf,
            _ => return None,
        };

        match arity {
            Arity::Unary(op) => self.reduce_unary(id, op),
            Arity::Binary(op) => self.reduce_binary(id, op),
            Arity::Cmp(op) => self.reduce_cmp(id, op),
            Arity::TCond => self.reduce_ternary(id),
            Arity::Deref => self.reduce_deref(id),
            Arity::AddrOf => self.reduce_addr_of(id),
        }
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    fn operand(&self, id: ExprId, index: usize) -> Option<ExprId> {
        self.arena.operands(id).get(index).copied()
    }

    fn signed(&self, id: ExprId) -> Option<i64> {
        self.arena.as_signed_val(id)
    }

    fn raw(&self, id: ExprId) -> Option<u64> {
        self.arena.as_val(id)
    }

    fn size(&self, id: ExprId) -> u32 {
        self.arena.size_of(id)
    }

    fn mk_val(&mut self, value: i64, size: u32) -> ExprId {
        self.arena.val_signed(value, size)
    }

    fn mk_raw(&mut self, bits: u64, size: u32) -> ExprId {
        self.arena.val(bits, size)
    }

    /// All-ones pattern at the given width.
    fn ones(size: u32) -> u64 {
        truncate(u64::MAX, size)
    }

    fn binary_parts(&self, id: ExprId) -> Option<(BinaryOp, ExprId, ExprId)> {
        if let ExprKind::Binary(op) = self.arena.kind(id)? {
            Some((*op, self.operand(id, 0)?, self.operand(id, 1)?))
        } else {
            None
        }
    }

    fn cmp_parts(&self, id: ExprId) -> Option<(CmpOp, ExprId, ExprId)> {
        if let ExprKind::Cmp(op) = self.arena.kind(id)? {
            Some((*op, self.operand(id, 0)?, self.operand(id, 1)?))
        } else {
            None
        }
    }

    // ------------------------------------------------------------------
    // Unary rules
    // ------------------------------------------------------------------

    fn reduce_unary(&mut self, id: ExprId, op: UnaryOp) -> Option<ExprId> {
        let a = self.operand(id, 0)?;
        let size = self.size(id);

        match op {
            UnaryOp::Neg => {
                if let Some(c) = self.signed(a) {
                    return Some(self.mk_val(c.wrapping_neg(), size));
                }
                // -(-x) -> x
                if matches!(self.arena.kind(a), Some(ExprKind::Unary(UnaryOp::Neg))) {
                    return self.hoist(a, 0);
                }
                None
            }
            UnaryOp::Not => {
                if let Some(bits) = self.raw(a) {
                    return Some(self.mk_raw(truncate(!bits, size), size));
                }
                // ~(~x) -> x
                if matches!(self.arena.kind(a), Some(ExprKind::Unary(UnaryOp::Not))) {
                    return self.hoist(a, 0);
                }
                None
            }
            UnaryOp::BoolNot => self.reduce_bool_not(id, a, size),
        }
    }

    fn reduce_bool_not(&mut self, _id: ExprId, a: ExprId, size: u32) -> Option<ExprId> {
        // !!x -> x
        if matches!(self.arena.kind(a), Some(ExprKind::Unary(UnaryOp::BoolNot))) {
            return self.hoist(a, 0);
        }

        // !0 -> 1, !nonzero -> 0
        if let Some(c) = self.signed(a) {
            return Some(self.mk_val(i64::from(c == 0), size));
        }

        // !(x <> y) -> complementary relation (rank XOR 111)
        if let Some((op, _, _)) = self.cmp_parts(a) {
            let left = self.hoist(a, 0)?;
            let right = self.hoist(a, 0)?;
            return Some(match from_rank(rank(op) ^ RANK_ALL) {
                RankOutcome::Never => self.mk_val(0, size),
                RankOutcome::Always => self.mk_val(1, size),
                RankOutcome::Cmp(flipped) => self.arena.cmp(flipped, left, right, size),
            });
        }

        if let Some((op, _, _)) = self.binary_parts(a) {
            match op {
                // deMorgan
                BinaryOp::BoolAnd | BinaryOp::BoolOr => {
                    let left = self.hoist(a, 0)?;
                    let right = self.hoist(a, 0)?;
                    let not_left = self.arena.unary(UnaryOp::BoolNot, left, size);
                    let not_right = self.arena.unary(UnaryOp::BoolNot, right, size);
                    let dual = if op == BinaryOp::BoolAnd {
                        BinaryOp::BoolOr
                    } else {
                        BinaryOp::BoolAnd
                    };
                    return Some(self.arena.binary(dual, not_left, not_right, size));
                }
                // !(x + y) -> x == -y
                BinaryOp::Add => {
                    let x = self.hoist(a, 0)?;
                    let y = self.hoist(a, 0)?;
                    let y_size = self.size(y);
                    let neg_y = match self.signed(y) {
                        Some(c) => {
                            self.arena.pluck(y, true);
                            self.mk_val(c.wrapping_neg(), y_size)
                        }
                        None => self.arena.unary(UnaryOp::Neg, y, y_size),
                    };
                    return Some(self.arena.cmp(CmpOp::Eq, x, neg_y, size));
                }
                // !(x - y) -> x == y
                BinaryOp::Sub => {
                    let x = self.hoist(a, 0)?;
                    let y = self.hoist(a, 0)?;
                    return Some(self.arena.cmp(CmpOp::Eq, x, y, size));
                }
                _ => {}
            }
        }

        None
    }

    // ------------------------------------------------------------------
    // Binary rules
    // ------------------------------------------------------------------

    fn reduce_binary(&mut self, id: ExprId, op: BinaryOp) -> Option<ExprId> {
        let left = self.operand(id, 0)?;
        let right = self.operand(id, 1)?;
        let size = self.size(id);

        // Constant folding first: both operands constant
        if let (Some(lc), Some(rc)) = (self.raw(left), self.raw(right)) {
            if let Some(bits) = fold_binary(op, lc, rc, size) {
                return Some(self.mk_raw(bits, size));
            }
        }

        // Identity and absorption rules against constant operands
        if let Some(result) = self.binary_constant_identities(id, op, left, right, size) {
            return Some(result);
        }

        // Rules over structurally equal operands
        if self.arena.structurally_equal(left, right) {
            match op {
                BinaryOp::Xor => return Some(self.mk_val(0, size)),
                BinaryOp::Sub => return Some(self.mk_val(0, size)),
                BinaryOp::And | BinaryOp::Or => return self.hoist(id, 0),
                _ => {}
            }
        }

        // (x >> c) << c -> x & ~((1 << c) - 1)
        if op == BinaryOp::Shl {
            if let (Some((BinaryOp::Shr, _, inner_amount)), Some(c)) =
                (self.binary_parts(left), self.signed(right))
            {
                if self.signed(inner_amount) == Some(c) && (0..i64::from(size)).contains(&c) {
                    let x = self.hoist(left, 0)?;
                    let mask = truncate(Self::ones(size) << c, size);
                    let mask_val = self.mk_raw(mask, size);
                    return Some(self.arena.binary(BinaryOp::And, x, mask_val, size));
                }
            }
        }

        // Sign correction: x + (-c) -> x - c, x - (-c) -> x + c
        if matches!(op, BinaryOp::Add | BinaryOp::Sub) {
            if let Some(c) = self.signed(right) {
                if c < 0 && c != i64::MIN {
                    let x = self.hoist(id, 0)?;
                    let flipped = if op == BinaryOp::Add {
                        BinaryOp::Sub
                    } else {
                        BinaryOp::Add
                    };
                    let positive = self.mk_val(-c, size);
                    return Some(self.arena.binary(flipped, x, positive, size));
                }
            }
        }

        // Reassociation: ((x op c1) op c0) -> x op (c1 op c0)
        if let Some(result) = self.reassociate(id, op, left, right, size) {
            return Some(result);
        }

        // Converged relational algebra over the same operands
        if self.converge && matches!(op, BinaryOp::BoolAnd | BinaryOp::BoolOr) {
            if let Some(result) = self.converge_pair(op, left, right, size) {
                return Some(result);
            }
        }

        None
    }

    #[allow(clippy::too_many_lines)]
    fn binary_constant_identities(
        &mut self,
        id: ExprId,
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
        size: u32,
    ) -> Option<ExprId> {
        let lc = self.signed(left);
        let rc = self.signed(right);
        let l_raw = self.raw(left);
        let r_raw = self.raw(right);
        let ones = Self::ones(size);

        match op {
            BinaryOp::Add => {
                if rc == Some(0) {
                    return self.hoist(id, 0);
                }
                if lc == Some(0) {
                    return self.hoist(id, 1);
                }
            }
            BinaryOp::Sub => {
                if rc == Some(0) {
                    return self.hoist(id, 0);
                }
            }
            BinaryOp::Mul => {
                if rc == Some(1) {
                    return self.hoist(id, 0);
                }
                if lc == Some(1) {
                    return self.hoist(id, 1);
                }
                if rc == Some(0) || lc == Some(0) {
                    return Some(self.mk_val(0, size));
                }
            }
            BinaryOp::Div => {
                if rc == Some(1) {
                    return self.hoist(id, 0);
                }
            }
            BinaryOp::Mod => {
                if rc == Some(1) {
                    return Some(self.mk_val(0, size));
                }
            }
            BinaryOp::Xor => {
                if rc == Some(0) {
                    return self.hoist(id, 0);
                }
                if lc == Some(0) {
                    return self.hoist(id, 1);
                }
                // x ^ 0xFF.. -> ~x
                if r_raw == Some(ones) {
                    let x = self.hoist(id, 0)?;
                    return Some(self.arena.unary(UnaryOp::Not, x, size));
                }
                if l_raw == Some(ones) {
                    let x = self.hoist(id, 1)?;
                    return Some(self.arena.unary(UnaryOp::Not, x, size));
                }
            }
            BinaryOp::And => {
                if rc == Some(0) || lc == Some(0) {
                    return Some(self.mk_val(0, size));
                }
                if r_raw == Some(ones) {
                    return self.hoist(id, 0);
                }
                if l_raw == Some(ones) {
                    return self.hoist(id, 1);
                }
            }
            BinaryOp::Or => {
                if rc == Some(0) {
                    return self.hoist(id, 0);
                }
                if lc == Some(0) {
                    return self.hoist(id, 1);
                }
                if r_raw == Some(ones) || l_raw == Some(ones) {
                    return Some(self.mk_raw(ones, size));
                }
            }
            BinaryOp::Shl => {
                if lc == Some(0) {
                    return Some(self.mk_val(0, size));
                }
                if rc == Some(0) {
                    return self.hoist(id, 0);
                }
            }
            BinaryOp::Shr => {
                if lc == Some(0) {
                    return Some(self.mk_val(0, size));
                }
                if rc == Some(0) {
                    return self.hoist(id, 0);
                }
            }
            _ => {}
        }
        None
    }

    /// `((x op c1) op c0) -> x op (c1 combined c0)` for associative bitwise
    /// and arithmetic chains. For mixed `Add`/`Sub` chains the inner operator
    /// is kept and the constants combine with `+` when inner and outer agree,
    /// `-` otherwise.
    fn reassociate(
        &mut self,
        _id: ExprId,
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
        size: u32,
    ) -> Option<ExprId> {
        let c0 = self.signed(right)?;
        let (inner_op, _inner_left, inner_right) = self.binary_parts(left)?;
        let c1 = self.signed(inner_right)?;

        let arithmetic = matches!(op, BinaryOp::Add | BinaryOp::Sub)
            && matches!(inner_op, BinaryOp::Add | BinaryOp::Sub);

        if arithmetic {
            let combined = if inner_op == op {
                c1.wrapping_add(c0)
            } else {
                c1.wrapping_sub(c0)
            };
            let x = self.hoist(left, 0)?;
            let c = self.mk_val(combined, size);
            return Some(self.arena.binary(inner_op, x, c, size));
        }

        if op.is_associative() && inner_op == op {
            let combined = fold_binary(op, self.raw(inner_right)?, self.raw(right)?, size)?;
            let x = self.hoist(left, 0)?;
            let c = self.mk_raw(combined, size);
            return Some(self.arena.binary(op, x, c, size));
        }

        None
    }

    /// `(x <>1 y) op (x <>2 y)` with `op` in `{&&, ||}` combines the relation
    /// ranks bitwise.
    fn converge_pair(
        &mut self,
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
        size: u32,
    ) -> Option<ExprId> {
        let (op1, a1, b1) = self.cmp_parts(left)?;
        let (op2, a2, b2) = self.cmp_parts(right)?;
        if !self.arena.structurally_equal(a1, a2) || !self.arena.structurally_equal(b1, b2) {
            return None;
        }

        let combined = if op == BinaryOp::BoolOr {
            rank(op1) | rank(op2)
        } else {
            rank(op1) & rank(op2)
        };

        Some(match from_rank(combined) {
            RankOutcome::Never => self.mk_val(0, size),
            RankOutcome::Always => self.mk_val(1, size),
            RankOutcome::Cmp(merged) => {
                let x = self.hoist(left, 0)?;
                let y = self.hoist(left, 0)?;
                self.arena.cmp(merged, x, y, size)
            }
        })
    }

    // ------------------------------------------------------------------
    // Comparison rules
    // ------------------------------------------------------------------

    fn reduce_cmp(&mut self, id: ExprId, op: CmpOp) -> Option<ExprId> {
        let left = self.operand(id, 0)?;
        let right = self.operand(id, 1)?;
        let size = self.size(id);

        // Comparison of two constants: equality relations fold exactly; the
        // ordered relations stay untouched (their result depends on
        // signedness the IR does not track).
        if let (Some(lc), Some(rc)) = (self.raw(left), self.raw(right)) {
            match op {
                CmpOp::Eq => return Some(self.mk_val(i64::from(lc == rc), size)),
                CmpOp::Ne => return Some(self.mk_val(i64::from(lc != rc), size)),
                _ => {}
            }
        }

        // (x +- c1) <> c2 -> x <> (c2 -+ c1)
        if let (Some((inner_op, _, inner_right)), Some(c2)) =
            (self.binary_parts(left), self.signed(right))
        {
            if matches!(inner_op, BinaryOp::Add | BinaryOp::Sub) {
                if let Some(c1) = self.signed(inner_right) {
                    let shifted = if inner_op == BinaryOp::Add {
                        c2.wrapping_sub(c1)
                    } else {
                        c2.wrapping_add(c1)
                    };
                    let x = self.hoist(left, 0)?;
                    let c_size = self.size(x);
                    let c = self.mk_val(shifted, c_size);
                    return Some(self.arena.cmp(op, x, c, size));
                }
            }
        }

        if op == CmpOp::Eq {
            // (x - y) == 0 -> x == y, (x + y) == 0 -> x == -y
            if self.signed(right) == Some(0) {
                if let Some((inner_op, _, _)) = self.binary_parts(left) {
                    match inner_op {
                        BinaryOp::Sub => {
                            let x = self.hoist(left, 0)?;
                            let y = self.hoist(left, 0)?;
                            return Some(self.arena.cmp(CmpOp::Eq, x, y, size));
                        }
                        BinaryOp::Add => {
                            let x = self.hoist(left, 0)?;
                            let y = self.hoist(left, 0)?;
                            let y_size = self.size(y);
                            let neg_y = self.arena.unary(UnaryOp::Neg, y, y_size);
                            return Some(self.arena.cmp(CmpOp::Eq, x, neg_y, size));
                        }
                        _ => {}
                    }
                }
            }

            // (x <>1 y) == (x <>2 y) -> rank equivalence
            if self.converge {
                if let (Some((op1, a1, b1)), Some((op2, a2, b2))) =
                    (self.cmp_parts(left), self.cmp_parts(right))
                {
                    if self.arena.structurally_equal(a1, a2)
                        && self.arena.structurally_equal(b1, b2)
                    {
                        let combined = !(rank(op1) ^ rank(op2));
                        return Some(match from_rank(combined) {
                            RankOutcome::Never => self.mk_val(0, size),
                            RankOutcome::Always => self.mk_val(1, size),
                            RankOutcome::Cmp(merged) => {
                                let x = self.hoist(left, 0)?;
                                let y = self.hoist(left, 0)?;
                                self.arena.cmp(merged, x, y, size)
                            }
                        });
                    }
                }
            }
        }

        None
    }

    // ------------------------------------------------------------------
    // Ternary and ref/deref rules
    // ------------------------------------------------------------------

    /// `TCond(const, t, f)` collapses to the selected branch.
    fn reduce_ternary(&mut self, id: ExprId) -> Option<ExprId> {
        let cond = self.operand(id, 0)?;
        let c = self.signed(cond)?;
        if c != 0 {
            self.hoist(id, 1)
        } else {
            self.hoist(id, 2)
        }
    }

    /// `*(&x) -> x`
    fn reduce_deref(&mut self, id: ExprId) -> Option<ExprId> {
        let addr = self.operand(id, 0)?;
        if matches!(self.arena.kind(addr), Some(ExprKind::AddrOf)) {
            return self.hoist(addr, 0);
        }
        None
    }

    /// `&(*x) -> x`
    fn reduce_addr_of(&mut self, id: ExprId) -> Option<ExprId> {
        let inner = self.operand(id, 0)?;
        if matches!(self.arena.kind(inner), Some(ExprKind::Deref)) {
            return self.hoist(inner, 0);
        }
        None
    }
}

/// Folds a binary operation over two constant bit patterns at the given
/// width. Returns `None` when the fold is not sign-safe (right shift of a
/// value with its top bit set) or undefined (division by zero).
fn fold_binary(op: BinaryOp, left: u64, right: u64, size: u32) -> Option<u64> {
    let ls = sign_extend(left, size);
    let rs = sign_extend(right, size);

    let result = match op {
        BinaryOp::Add => ls.wrapping_add(rs) as u64,
        BinaryOp::Sub => ls.wrapping_sub(rs) as u64,
        BinaryOp::Mul => ls.wrapping_mul(rs) as u64,
        BinaryOp::Div => ls.checked_div(rs)? as u64,
        BinaryOp::Mod => ls.checked_rem(rs)? as u64,
        BinaryOp::And => left & right,
        BinaryOp::Or => left | right,
        BinaryOp::Xor => left ^ right,
        BinaryOp::Shl => {
            if rs < 0 || rs >= i64::from(size.max(1)) {
                0
            } else {
                left << rs
            }
        }
        BinaryOp::Shr => {
            // Sign-safe only when the top bit is clear
            if size > 0 && size < 64 && (left >> (size - 1)) & 1 != 0 {
                return None;
            }
            if size == 64 && (left >> 63) != 0 {
                return None;
            }
            if rs < 0 || rs >= i64::from(size.max(1)) {
                0
            } else {
                left >> rs
            }
        }
        BinaryOp::BoolAnd => u64::from(ls != 0 && rs != 0),
        BinaryOp::BoolOr => u64::from(ls != 0 || rs != 0),
    };

    Some(truncate(result, size))
}
