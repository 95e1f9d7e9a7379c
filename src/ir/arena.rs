//! Expression arena: stable-index storage for the per-function expression
//! graph.
//!
//! All expression nodes of a function live in one [`ExprArena`]. Nodes are
//! addressed by [`ExprId`], a plain index; the tree structure (parent and
//! operand links) and the def-use cross-edges are all stored as ids, never as
//! owning pointers, which keeps the cyclic object graph of the IR safe to
//! mutate in place.
//!
//! # Link maintenance
//!
//! Three bidirectional links must stay consistent at all times:
//!
//! 1. parent pointer <-> operand list
//! 2. a use's `def` pointer <-> the definition's `uses` list
//! 3. an `Assign` destination's `IS_DEF` flag <-> its role as an entry in the
//!    SSA context
//!
//! Every structural operation here ([`replace`](ExprArena::replace),
//! [`pluck`](ExprArena::pluck), [`clone_expr`](ExprArena::clone_expr))
//! updates all affected links before returning. Passes never edit links
//! directly.
//!
//! # Slot lifecycle
//!
//! Deleting an expression tombstones its slot; slots are never reused. The
//! whole arena is dropped together with its function, which matches the
//! lifetime model of the pipeline (expressions are created by the lifter and
//! phi insertion, mutated by renaming, replaced by simplification, destroyed
//! by pruning).

use std::fmt;

use bitflags::bitflags;

use crate::ir::expr::{BinaryOp, CmpOp, Expr, ExprFlags, ExprKind, UnaryOp};

/// Unique identifier of an expression node within one [`ExprArena`].
///
/// A lightweight handle, valid for the lifetime of the owning arena. Ids of
/// deleted expressions remain allocated but refer to a dead slot; accessors
/// return `None` for them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(usize);

impl ExprId {
    /// Creates an identifier from a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

bitflags! {
    /// Selects which per-node attributes survive [`ExprArena::clone_expr`].
    ///
    /// Attributes not named here are always reset on the clone: the clone has
    /// no parent, no users, and is never a definition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CloneKeep: u8 {
        /// Keep the SSA subscript.
        const IDX = 1 << 0;
        /// Keep the definition link (the clone is registered as a use).
        const DEF = 1 << 1;
        /// Keep the no-alias marker.
        const SAFE = 1 << 2;
        /// Keep the weak-definition marker.
        const WEAK = 1 << 3;
    }
}

impl CloneKeep {
    /// The usual selection for copy propagation: the clone reads the same
    /// values as the original.
    #[must_use]
    pub const fn links() -> Self {
        Self::IDX.union(Self::DEF)
    }
}

/// Per-function expression store.
///
/// See the [module documentation](self) for the ownership and link model.
#[derive(Debug, Default)]
pub struct ExprArena {
    slots: Vec<Option<Expr>>,
}

impl ExprArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    fn alloc(&mut self, expr: Expr) -> ExprId {
        let id = ExprId::new(self.slots.len());
        self.slots.push(Some(expr));
        id
    }

    fn adopt(&mut self, parent: ExprId, operands: &[ExprId]) {
        for &op in operands {
            if let Some(e) = self.get_mut(op) {
                e.parent = Some(parent);
            }
        }
        if let Some(p) = self.get_mut(parent) {
            p.operands = operands.to_vec();
        }
    }

    // ------------------------------------------------------------------
    // Node constructors
    // ------------------------------------------------------------------

    /// Creates an integer constant of the given bit width.
    pub fn val(&mut self, value: u64, size: u32) -> ExprId {
        self.alloc(Expr::new(ExprKind::Val(crate::ir::expr::truncate(value, size)), size))
    }

    /// Creates a signed integer constant of the given bit width.
    pub fn val_signed(&mut self, value: i64, size: u32) -> ExprId {
        self.val(value as u64, size)
    }

    /// Creates a register reference.
    pub fn reg(&mut self, name: &str, size: u32) -> ExprId {
        self.alloc(Expr::new(ExprKind::Reg(name.to_string()), size))
    }

    /// Creates a local-variable reference.
    pub fn var(&mut self, name: &str, size: u32) -> ExprId {
        self.alloc(Expr::new(ExprKind::Var(name.to_string()), size))
    }

    /// Creates a memory dereference of `addr`.
    pub fn deref(&mut self, addr: ExprId, size: u32) -> ExprId {
        let id = self.alloc(Expr::new(ExprKind::Deref, size));
        self.adopt(id, &[addr]);
        id
    }

    /// Creates an address-of expression.
    pub fn addr_of(&mut self, inner: ExprId, size: u32) -> ExprId {
        let id = self.alloc(Expr::new(ExprKind::AddrOf, size));
        self.adopt(id, &[inner]);
        id
    }

    /// Creates a phi pseudo-operation over `args`.
    pub fn phi(&mut self, args: &[ExprId], size: u32) -> ExprId {
        let id = self.alloc(Expr::new(ExprKind::Phi, size));
        self.adopt(id, args);
        id
    }

    /// Creates a unary operation.
    pub fn unary(&mut self, op: UnaryOp, operand: ExprId, size: u32) -> ExprId {
        let id = self.alloc(Expr::new(ExprKind::Unary(op), size));
        self.adopt(id, &[operand]);
        id
    }

    /// Creates a binary operation.
    pub fn binary(&mut self, op: BinaryOp, left: ExprId, right: ExprId, size: u32) -> ExprId {
        let id = self.alloc(Expr::new(ExprKind::Binary(op), size));
        self.adopt(id, &[left, right]);
        id
    }

    /// Creates a comparison.
    pub fn cmp(&mut self, op: CmpOp, left: ExprId, right: ExprId, size: u32) -> ExprId {
        let id = self.alloc(Expr::new(ExprKind::Cmp(op), size));
        self.adopt(id, &[left, right]);
        id
    }

    /// Creates a ternary conditional `cond ? then : otherwise`.
    pub fn tcond(&mut self, cond: ExprId, then: ExprId, otherwise: ExprId, size: u32) -> ExprId {
        let id = self.alloc(Expr::new(ExprKind::TCond, size));
        self.adopt(id, &[cond, then, otherwise]);
        id
    }

    /// Creates a call of `callee` with `args`.
    pub fn call(&mut self, callee: ExprId, args: &[ExprId], size: u32) -> ExprId {
        let id = self.alloc(Expr::new(ExprKind::Call, size));
        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(callee);
        operands.extend_from_slice(args);
        self.adopt(id, &operands);
        id
    }

    /// Creates a named intrinsic applied to `args`.
    pub fn intrinsic(&mut self, name: &str, args: &[ExprId], size: u32) -> ExprId {
        let id = self.alloc(Expr::new(ExprKind::Intrinsic(name.to_string()), size));
        self.adopt(id, args);
        id
    }

    /// Creates an assignment `dst = src`, marking `dst` as a definition.
    ///
    /// The destination must be an assignable location (`Reg`, `Var`, or
    /// `Deref`); a non-assignable destination is a malformed-IR condition and
    /// is logged (and asserted in debug builds).
    pub fn assign(&mut self, dst: ExprId, src: ExprId) -> ExprId {
        let dst_is_location = self
            .get(dst)
            .is_some_and(|e| e.kind().is_location());
        debug_assert!(dst_is_location, "assignment destination must be Reg/Var/Deref");
        if !dst_is_location {
            log::warn!("assignment destination {dst} is not an assignable location");
        }

        let size = self.size_of(dst);
        let id = self.alloc(Expr::new(ExprKind::Assign, size));
        self.adopt(id, &[dst, src]);
        if let Some(e) = self.get_mut(dst) {
            e.flags.insert(ExprFlags::IS_DEF);
        }
        id
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Returns the expression behind `id`, or `None` if the slot is dead.
    #[must_use]
    pub fn get(&self, id: ExprId) -> Option<&Expr> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    /// Returns a mutable reference to the expression behind `id`.
    #[must_use]
    pub fn get_mut(&mut self, id: ExprId) -> Option<&mut Expr> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Returns `true` if the slot behind `id` still holds a live expression.
    #[must_use]
    pub fn is_live(&self, id: ExprId) -> bool {
        self.get(id).is_some()
    }

    /// Returns the node variant, or `None` for dead slots.
    #[must_use]
    pub fn kind(&self, id: ExprId) -> Option<&ExprKind> {
        self.get(id).map(Expr::kind)
    }

    /// Returns the operand list of `id` (empty for dead slots).
    #[must_use]
    pub fn operands(&self, id: ExprId) -> &[ExprId] {
        self.get(id).map_or(&[], Expr::operands)
    }

    /// Returns the parent expression of `id`.
    #[must_use]
    pub fn parent_of(&self, id: ExprId) -> Option<ExprId> {
        self.get(id).and_then(Expr::parent)
    }

    /// Returns the bit width of `id` (0 for dead slots).
    #[must_use]
    pub fn size_of(&self, id: ExprId) -> u32 {
        self.get(id).map_or(0, Expr::size)
    }

    /// Returns the constant bit pattern if `id` is a `Val`.
    #[must_use]
    pub fn as_val(&self, id: ExprId) -> Option<u64> {
        self.get(id).and_then(Expr::as_val)
    }

    /// Returns the sign-extended constant value if `id` is a `Val`.
    #[must_use]
    pub fn as_signed_val(&self, id: ExprId) -> Option<i64> {
        self.get(id).and_then(Expr::as_signed_val)
    }

    /// Sets the SSA subscript of `id`.
    pub fn set_idx(&mut self, id: ExprId, idx: Option<u32>) {
        if let Some(e) = self.get_mut(id) {
            e.idx = idx;
        }
    }

    /// Sets or clears flag bits on `id`.
    pub fn set_flags(&mut self, id: ExprId, flags: ExprFlags, on: bool) {
        if let Some(e) = self.get_mut(id) {
            e.flags.set(flags, on);
        }
    }

    /// Returns `true` if `id` carries all of the given flags.
    #[must_use]
    pub fn has_flags(&self, id: ExprId, flags: ExprFlags) -> bool {
        self.get(id).is_some_and(|e| e.flags.contains(flags))
    }

    /// Returns the ids of every live slot in the arena.
    pub fn live_ids(&self) -> impl Iterator<Item = ExprId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| ExprId::new(i)))
    }

    // ------------------------------------------------------------------
    // Def-use maintenance
    // ------------------------------------------------------------------

    /// Links `user` as a reader of definition `def`.
    ///
    /// Sets `user.def` and inserts `user` into `def.uses` (at most once, per
    /// the IR invariants).
    pub fn add_use(&mut self, def: ExprId, user: ExprId) {
        if let Some(u) = self.get_mut(user) {
            u.def = Some(def);
        }
        if let Some(d) = self.get_mut(def) {
            if !d.uses.contains(&user) {
                d.uses.push(user);
            }
        }
    }

    /// Unlinks `user` from definition `def`.
    pub fn remove_use(&mut self, def: ExprId, user: ExprId) {
        if let Some(d) = self.get_mut(def) {
            d.uses.retain(|&u| u != user);
        }
        if let Some(u) = self.get_mut(user) {
            if u.def == Some(def) {
                u.def = None;
            }
        }
    }

    // ------------------------------------------------------------------
    // Structural operations
    // ------------------------------------------------------------------

    /// Returns `id` and all live descendants in pre-order.
    #[must_use]
    pub fn subtree(&self, id: ExprId) -> Vec<ExprId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if !self.is_live(node) {
                continue;
            }
            result.push(node);
            for &op in self.operands(node).iter().rev() {
                stack.push(op);
            }
        }
        result
    }

    /// Appends `child` to the operand list of `parent`.
    ///
    /// `child` must be detached; used by phi relaxation when folding the
    /// arguments of a chained phi into its user.
    pub fn push_operand(&mut self, parent: ExprId, child: ExprId) {
        debug_assert!(self.parent_of(child).is_none(), "operand must be detached");
        if let Some(c) = self.get_mut(child) {
            c.parent = Some(parent);
        }
        if let Some(p) = self.get_mut(parent) {
            p.operands.push(child);
        }
    }

    /// Detaches the `index`-th operand of `parent` and returns it, parentless.
    ///
    /// Used by rewrite rules that hoist a child into the position of its
    /// parent before calling [`replace`](Self::replace).
    pub fn take_operand(&mut self, parent: ExprId, index: usize) -> Option<ExprId> {
        let taken = {
            let p = self.get_mut(parent)?;
            if index >= p.operands.len() {
                return None;
            }
            p.operands.remove(index)
        };
        if let Some(e) = self.get_mut(taken) {
            e.parent = None;
        }
        Some(taken)
    }

    /// Splices `new` into `old`'s parent slot and deletes `old`.
    ///
    /// `new` must be detached (no parent) and must not be a descendant of
    /// `old` - hoist shared children out with
    /// [`take_operand`](Self::take_operand) first. Every leaf remaining under
    /// `old` is unlinked from its definition before the subtree is
    /// tombstoned; `new` keeps whatever links its operands carry.
    ///
    /// Returns `new` for convenience. When `old` was a statement root, the
    /// caller is responsible for updating the statement's expression list.
    pub fn replace(&mut self, old: ExprId, new: ExprId) -> ExprId {
        debug_assert!(self.parent_of(new).is_none(), "replacement must be detached");

        let parent = self.parent_of(old);
        if let Some(p) = parent {
            if let Some(pe) = self.get_mut(p) {
                for slot in &mut pe.operands {
                    if *slot == old {
                        *slot = new;
                        break;
                    }
                }
            }
        }
        if let Some(e) = self.get_mut(new) {
            e.parent = parent;
        }
        self.release(old);
        new
    }

    /// Removes `e` from its parent's operand list.
    ///
    /// With `detach_uses` set, every node inside the subtree is first
    /// unlinked from its definition's users list (and any definitions inside
    /// lose their readers), then the whole subtree is deleted. Without it the
    /// expression stays alive and parentless - this is how a call with side
    /// effects is extracted out of a dead assignment.
    pub fn pluck(&mut self, id: ExprId, detach_uses: bool) {
        if let Some(p) = self.parent_of(id) {
            if let Some(pe) = self.get_mut(p) {
                pe.operands.retain(|&o| o != id);
            }
        }
        if let Some(e) = self.get_mut(id) {
            e.parent = None;
        }
        if detach_uses {
            self.release(id);
        }
    }

    /// Unlinks and tombstones `id` and every descendant.
    fn release(&mut self, id: ExprId) {
        for node in self.subtree(id) {
            let (def, uses) = {
                let Some(e) = self.get(node) else { continue };
                (e.def, e.uses.clone())
            };
            if let Some(d) = def {
                if let Some(de) = self.get_mut(d) {
                    de.uses.retain(|&u| u != node);
                }
            }
            for user in uses {
                if let Some(ue) = self.get_mut(user) {
                    if ue.def == Some(node) {
                        ue.def = None;
                    }
                }
            }
            self.slots[node.index()] = None;
        }
    }

    /// Deep-copies the subtree rooted at `id`.
    ///
    /// The clone is detached (no parent), carries no users, and is not a
    /// definition. `keep` selects which per-node attributes survive; when
    /// [`CloneKeep::DEF`] is kept, each cloned use is registered in its
    /// definition's users list.
    pub fn clone_expr(&mut self, id: ExprId, keep: CloneKeep) -> ExprId {
        let (kind, size, idx, def, flags, operands) = {
            let Some(e) = self.get(id) else {
                // Cloning a dead slot produces a harmless zero constant;
                // callers check liveness on the paths that matter.
                return self.val(0, 0);
            };
            (
                e.kind.clone(),
                e.size,
                e.idx,
                e.def,
                e.flags,
                e.operands.clone(),
            )
        };

        let cloned_ops: Vec<ExprId> = operands
            .iter()
            .map(|&op| self.clone_expr(op, keep))
            .collect();

        let mut expr = Expr::new(kind, size);
        if keep.contains(CloneKeep::IDX) {
            expr.idx = idx;
        }
        if keep.contains(CloneKeep::SAFE) && flags.contains(ExprFlags::SAFE) {
            expr.flags.insert(ExprFlags::SAFE);
        }
        if keep.contains(CloneKeep::WEAK) && flags.contains(ExprFlags::WEAK) {
            expr.flags.insert(ExprFlags::WEAK);
        }

        let cid = self.alloc(expr);
        self.adopt(cid, &cloned_ops);

        if keep.contains(CloneKeep::DEF) {
            if let Some(d) = def {
                self.add_use(d, cid);
            }
        }
        cid
    }

    // ------------------------------------------------------------------
    // Structure queries
    // ------------------------------------------------------------------

    /// Structural equality of two subtrees: same variants, widths,
    /// subscripts, and operand structure. Parent and def-use links are not
    /// compared.
    #[must_use]
    pub fn structurally_equal(&self, a: ExprId, b: ExprId) -> bool {
        let (Some(ea), Some(eb)) = (self.get(a), self.get(b)) else {
            return false;
        };
        if ea.kind != eb.kind || ea.size != eb.size || ea.idx != eb.idx {
            return false;
        }
        if ea.operands.len() != eb.operands.len() {
            return false;
        }
        ea.operands
            .iter()
            .zip(eb.operands.iter())
            .all(|(&x, &y)| self.structurally_equal(x, y))
    }

    /// Returns the SSA base name of a storage location: the register or
    /// variable name, or the rendered address for a dereference. `None` for
    /// anything that is not a location.
    #[must_use]
    pub fn base_name(&self, id: ExprId) -> Option<String> {
        match self.kind(id)? {
            ExprKind::Reg(name) | ExprKind::Var(name) => Some(name.clone()),
            ExprKind::Deref => {
                let addr = *self.operands(id).first()?;
                Some(format!("*({})", self.render(addr)))
            }
            _ => None,
        }
    }

    /// Returns the SSA key (`name_idx`) of a location, or the bare name when
    /// no subscript has been assigned yet.
    #[must_use]
    pub fn ssa_key(&self, id: ExprId) -> Option<String> {
        let base = self.base_name(id)?;
        match self.get(id).and_then(Expr::idx) {
            Some(idx) => Some(format!("{base}_{idx}")),
            None => Some(base),
        }
    }

    /// Renders the subtree rooted at `id` as pseudo-source text.
    ///
    /// This is the debugging / test representation; the real printer is a
    /// separate back-end.
    #[must_use]
    pub fn render(&self, id: ExprId) -> String {
        let mut out = String::new();
        self.write_expr(id, &mut out);
        out
    }

    fn write_expr(&self, id: ExprId, out: &mut String) {
        use std::fmt::Write;

        let Some(e) = self.get(id) else {
            out.push_str("<dead>");
            return;
        };
        match &e.kind {
            ExprKind::Val(bits) => {
                let v = e.as_signed_val().unwrap_or(0);
                if (-4096..=4096).contains(&v) {
                    let _ = write!(out, "{v}");
                } else {
                    let _ = write!(out, "0x{bits:x}");
                }
            }
            ExprKind::Reg(name) | ExprKind::Var(name) => {
                out.push_str(name);
                if let Some(idx) = e.idx {
                    let _ = write!(out, "_{idx}");
                }
            }
            ExprKind::Deref => {
                out.push_str("*(");
                if let Some(&addr) = e.operands.first() {
                    self.write_expr(addr, out);
                }
                out.push(')');
                if let Some(idx) = e.idx {
                    let _ = write!(out, "_{idx}");
                }
            }
            ExprKind::AddrOf => {
                out.push_str("&(");
                if let Some(&inner) = e.operands.first() {
                    self.write_expr(inner, out);
                }
                out.push(')');
            }
            ExprKind::Phi => {
                out.push_str("Phi(");
                for (i, &arg) in e.operands.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_expr(arg, out);
                }
                out.push(')');
            }
            ExprKind::Unary(op) => {
                out.push_str(op.symbol());
                out.push('(');
                if let Some(&operand) = e.operands.first() {
                    self.write_expr(operand, out);
                }
                out.push(')');
            }
            ExprKind::Binary(op) => self.write_infix(e, op.symbol(), out),
            ExprKind::Cmp(op) => self.write_infix(e, op.symbol(), out),
            ExprKind::TCond => {
                out.push('(');
                for (i, &operand) in e.operands.iter().enumerate() {
                    out.push_str(match i {
                        0 => "",
                        1 => " ? ",
                        _ => " : ",
                    });
                    self.write_expr(operand, out);
                }
                out.push(')');
            }
            ExprKind::Call => {
                let mut ops = e.operands.iter();
                if let Some(&callee) = ops.next() {
                    self.write_expr(callee, out);
                }
                out.push('(');
                for (i, &arg) in ops.enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_expr(arg, out);
                }
                out.push(')');
            }
            ExprKind::Intrinsic(name) => {
                out.push_str(name);
                out.push('(');
                for (i, &arg) in e.operands.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_expr(arg, out);
                }
                out.push(')');
            }
            ExprKind::Assign => {
                if let Some(&dst) = e.operands.first() {
                    self.write_expr(dst, out);
                }
                out.push_str(" = ");
                if let Some(&src) = e.operands.get(1) {
                    self.write_expr(src, out);
                }
            }
        }
    }

    fn write_infix(&self, e: &Expr, symbol: &str, out: &mut String) {
        out.push('(');
        if let Some(&left) = e.operands.first() {
            self.write_expr(left, out);
        }
        out.push(' ');
        out.push_str(symbol);
        out.push(' ');
        if let Some(&right) = e.operands.get(1) {
            self.write_expr(right, out);
        }
        out.push(')');
    }
}
