//! Per-function SSA bookkeeping.
//!
//! The context survives all renaming waves and optimizer passes of one
//! function. Its central table, `defs`, maps each stringified SSA name
//! (`name_subscript`) to the defining expression; the optimizer's selector
//! passes iterate this table in insertion order, snapshotting the key list
//! first because passes delete entries while iterating.

use rustc_hash::FxHashMap;

use crate::ir::ExprId;

/// A detected preserved-location pair: a callee-saved storage location whose
/// value at every function exit equals its value at entry.
#[derive(Debug, Clone)]
pub struct PreservedPair {
    /// Base name of the preserved location (e.g. `rbx`).
    pub name: String,
    /// The `idx = 0` definition holding the entry value.
    pub initial: ExprId,
    /// The definition whose value reaches the exits.
    pub restored: ExprId,
}

/// SSA state for one function.
#[derive(Debug, Default)]
pub struct SsaContext {
    /// SSA key (`name_idx`) to defining expression.
    defs: FxHashMap<String, ExprId>,
    /// Keys in first-insertion order; deleted keys are filtered on iteration.
    order: Vec<String>,
    /// Per-base-name subscript counter (the next definition gets `count + 1`).
    count: FxHashMap<String, u32>,
    /// Per-base-name subscript stack used during dominator-tree renaming.
    stack: FxHashMap<String, Vec<u32>>,
    /// Caller-saved pairs detected by preserved-location analysis.
    preserved: Vec<PreservedPair>,
}

impl SsaContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the SSA key of a name and subscript.
    #[must_use]
    pub fn key(name: &str, idx: u32) -> String {
        format!("{name}_{idx}")
    }

    /// Records `def` as the definition of `key`.
    pub fn insert_def(&mut self, key: String, def: ExprId) {
        if !self.defs.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.defs.insert(key, def);
    }

    /// Removes the definition entry for `key`.
    pub fn remove_def(&mut self, key: &str) {
        self.defs.remove(key);
    }

    /// Returns the definition registered for `key`.
    #[must_use]
    pub fn def(&self, key: &str) -> Option<ExprId> {
        self.defs.get(key).copied()
    }

    /// Returns the number of live definition entries.
    #[must_use]
    pub fn def_count(&self) -> usize {
        self.defs.len()
    }

    /// Returns a snapshot of the live keys in insertion order.
    ///
    /// Passes iterate this snapshot rather than the live map, because they
    /// insert and remove entries while running.
    #[must_use]
    pub fn def_keys(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|k| self.defs.contains_key(*k))
            .cloned()
            .collect()
    }

    /// Allocates the next subscript for `name` and pushes it on the rename
    /// stack.
    pub fn new_idx(&mut self, name: &str) -> u32 {
        let counter = self.count.entry(name.to_string()).or_insert(0);
        *counter += 1;
        let idx = *counter;
        self.stack.entry(name.to_string()).or_default().push(idx);
        idx
    }

    /// Returns the subscript currently reaching this point of the rename
    /// walk.
    #[must_use]
    pub fn top_idx(&self, name: &str) -> Option<u32> {
        self.stack.get(name).and_then(|s| s.last().copied())
    }

    /// Pushes an explicit subscript (used for the synthetic `idx = 0`
    /// definitions of implicit initialization).
    pub fn push_idx(&mut self, name: &str, idx: u32) {
        self.stack.entry(name.to_string()).or_default().push(idx);
    }

    /// Pops the innermost subscript of `name` when the rename walk leaves the
    /// defining block.
    pub fn pop_idx(&mut self, name: &str) {
        if let Some(stack) = self.stack.get_mut(name) {
            stack.pop();
        }
    }

    /// Clears the rename stacks between waves.
    pub fn clear_stacks(&mut self) {
        self.stack.clear();
    }

    /// Records a preserved-location pair.
    pub fn add_preserved(&mut self, pair: PreservedPair) {
        self.preserved.push(pair);
    }

    /// Returns the preserved-location pairs found so far.
    #[must_use]
    pub fn preserved(&self) -> &[PreservedPair] {
        &self.preserved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_keep_insertion_order() {
        let mut ctx = SsaContext::new();
        ctx.insert_def(SsaContext::key("eax", 1), ExprId::new(0));
        ctx.insert_def(SsaContext::key("ebx", 1), ExprId::new(1));
        ctx.insert_def(SsaContext::key("eax", 2), ExprId::new(2));

        assert_eq!(ctx.def_keys(), vec!["eax_1", "ebx_1", "eax_2"]);

        ctx.remove_def("ebx_1");
        assert_eq!(ctx.def_keys(), vec!["eax_1", "eax_2"]);
        assert_eq!(ctx.def_count(), 2);
    }

    #[test]
    fn test_subscript_allocation() {
        let mut ctx = SsaContext::new();
        assert_eq!(ctx.top_idx("eax"), None);

        assert_eq!(ctx.new_idx("eax"), 1);
        assert_eq!(ctx.new_idx("eax"), 2);
        assert_eq!(ctx.top_idx("eax"), Some(2));

        ctx.pop_idx("eax");
        assert_eq!(ctx.top_idx("eax"), Some(1));

        // A fresh definition after popping continues counting upward
        assert_eq!(ctx.new_idx("eax"), 3);
    }

    #[test]
    fn test_push_explicit_zero() {
        let mut ctx = SsaContext::new();
        ctx.push_idx("sp", 0);
        assert_eq!(ctx.top_idx("sp"), Some(0));
        // The next real definition is 1, not another 0
        assert_eq!(ctx.new_idx("sp"), 1);
    }
}
