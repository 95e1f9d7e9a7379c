//! Control-flow recovery.
//!
//! Prepares the (already optimized, subscript-free) IR for the printer by
//! recognizing source-level structure in the CFG. Three recognizers run in
//! sequence:
//!
//! 1. **Fall-throughs** - a pair of blocks joined by a single
//!    successor/predecessor edge is merged into one straight-line block
//! 2. **Loops** - natural loops found via back edges against the dominator
//!    tree; header, body, and exit are tagged
//! 3. **Conditions** - if/else and if-then diamonds (including nested forms)
//!
//! The result is a list of [`Scope`] annotations over block indices; the
//! back-end printer walks blocks in layout order and opens/closes brackets
//! according to these scopes.

use rustc_hash::FxHashSet;

use crate::{config::Config, ir::Function, utils::graph::NodeId, Result};

/// A recovered control-flow scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// A natural loop.
    Loop {
        /// Block index of the loop header.
        header: usize,
        /// Every block in the loop body, including the header.
        body: Vec<usize>,
        /// The block control falls to when the loop exits, if single.
        exit: Option<usize>,
    },
    /// An if/else or if-then region.
    Conditional {
        /// Block whose terminating branch opens the region.
        cond: usize,
        /// Blocks of the taken branch.
        then_body: Vec<usize>,
        /// Blocks of the not-taken branch (empty for if-then).
        else_body: Vec<usize>,
        /// The join block where both branches meet, if single.
        join: Option<usize>,
    },
}

/// Runs the three recognizers and returns the recovered scopes.
///
/// Fall-through merging mutates the block list; loop and condition
/// recognition are read-only. Condition recognition consults the loop set so
/// a loop back edge is not mistaken for an if.
///
/// # Errors
///
/// Returns an error if the function has no control flow graph.
pub fn recover(func: &mut Function, _config: &Config) -> Result<Vec<Scope>> {
    merge_fallthroughs(func)?;

    let loops = detect_loops(func)?;
    let conditionals = detect_conditionals(func, &loops)?;

    let mut scopes = loops;
    scopes.extend(conditionals);
    Ok(scopes)
}

/// Merges every block pair joined by a single successor/predecessor edge.
///
/// Returns the number of merges performed.
pub fn merge_fallthroughs(func: &mut Function) -> Result<usize> {
    let mut merges = 0;

    loop {
        let cfg = func.cfg()?;
        let entry = cfg.entry();

        let mut candidate: Option<(usize, usize)> = None;
        for node in cfg.graph().node_ids() {
            let succs: Vec<NodeId> = cfg.successors(node).collect();
            let [succ] = succs.as_slice() else { continue };
            if *succ == entry || *succ == node {
                continue;
            }
            if cfg.predecessors(*succ).count() != 1 {
                continue;
            }
            candidate = Some((node.index(), succ.index()));
            break;
        }

        let Some((head_idx, tail_idx)) = candidate else {
            return Ok(merges);
        };

        // Move the tail's statements into the head and adopt its successors
        let mut tail = func.blocks_mut().remove(tail_idx);
        let tail_stmts: Vec<_> = std::mem::take(tail.container_mut().stmts_mut());
        let was_exit = tail.is_exit();
        let (jump, fail, cases) = (tail.jump(), tail.fail(), tail.cases().to_vec());

        // The head may have shifted down by the removal
        let head_idx = if head_idx > tail_idx {
            head_idx - 1
        } else {
            head_idx
        };
        if let Some(head) = func.block_mut(head_idx) {
            head.container_mut().stmts_mut().extend(tail_stmts);
            head.set_jump(jump);
            head.set_fail(fail);
            head.set_cases(cases);
            if was_exit {
                head.set_exit(true);
            }
        }

        merges += 1;
        log::debug!(
            "{}: merged fall-through block 0x{:x}",
            func.name(),
            tail.addr()
        );
    }
}

/// Detects natural loops: for every back edge `n -> h` where `h` dominates
/// `n`, the body is every block reaching `n` without passing through `h`.
fn detect_loops(func: &Function) -> Result<Vec<Scope>> {
    let cfg = func.cfg()?;
    let dominators = cfg.dominators();
    let mut loops: Vec<(usize, FxHashSet<usize>)> = Vec::new();

    for node in cfg.graph().node_ids() {
        for succ in cfg.successors(node) {
            if !dominators.dominates(succ, node) {
                continue;
            }

            // Found back edge node -> succ
            let header = succ.index();
            let slot = match loops.iter().position(|(h, _)| *h == header) {
                Some(slot) => slot,
                None => {
                    let mut body = FxHashSet::default();
                    body.insert(header);
                    loops.push((header, body));
                    loops.len() - 1
                }
            };
            let body = &mut loops[slot].1;

            // Worklist over predecessors up to the header
            let mut worklist = vec![node.index()];
            while let Some(current) = worklist.pop() {
                if !body.insert(current) {
                    continue;
                }
                for pred in cfg.predecessors(NodeId::new(current)) {
                    if pred.index() != header && !body.contains(&pred.index()) {
                        worklist.push(pred.index());
                    }
                }
            }
        }
    }

    loops.sort_by_key(|(header, _)| *header);

    Ok(loops
        .into_iter()
        .map(|(header, body_set)| {
            let exit = cfg
                .successors(NodeId::new(header))
                .map(NodeId::index)
                .find(|idx| !body_set.contains(idx));
            let mut body: Vec<usize> = body_set.into_iter().collect();
            body.sort_unstable();
            Scope::Loop { header, body, exit }
        })
        .collect())
}

/// Detects if/else diamonds and if-then forms over two-way branches that are
/// not loop back edges.
fn detect_conditionals(func: &Function, loops: &[Scope]) -> Result<Vec<Scope>> {
    let cfg = func.cfg()?;
    let headers: FxHashSet<usize> = loops
        .iter()
        .filter_map(|s| match s {
            Scope::Loop { header, .. } => Some(*header),
            Scope::Conditional { .. } => None,
        })
        .collect();

    let mut result = Vec::new();

    for node in cfg.graph().node_ids() {
        let succs: Vec<usize> = cfg.successors(node).map(NodeId::index).collect();
        let [taken, fallthrough] = succs.as_slice() else {
            continue;
        };
        let (taken, fallthrough) = (*taken, *fallthrough);
        if headers.contains(&node.index()) || taken == fallthrough {
            continue;
        }

        let single_succ = |idx: usize| -> Option<usize> {
            let s: Vec<usize> = cfg.successors(NodeId::new(idx)).map(NodeId::index).collect();
            match s.as_slice() {
                [only] => Some(*only),
                _ => None,
            }
        };

        // if/else: both arms flow to the same join
        if let (Some(jt), Some(jf)) = (single_succ(taken), single_succ(fallthrough)) {
            if jt == jf {
                result.push(Scope::Conditional {
                    cond: node.index(),
                    then_body: vec![taken],
                    else_body: vec![fallthrough],
                    join: Some(jt),
                });
                continue;
            }
        }

        // if-then: one arm falls straight into the other successor
        if single_succ(taken) == Some(fallthrough) {
            result.push(Scope::Conditional {
                cond: node.index(),
                then_body: vec![taken],
                else_body: Vec::new(),
                join: Some(fallthrough),
            });
        } else if single_succ(fallthrough) == Some(taken) {
            result.push(Scope::Conditional {
                cond: node.index(),
                then_body: vec![fallthrough],
                else_body: Vec::new(),
                join: Some(taken),
            });
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BasicBlock, Statement};

    fn block(addr: u64, jump: Option<u64>, fail: Option<u64>) -> BasicBlock {
        let mut b = BasicBlock::new(addr);
        b.set_jump(jump);
        b.set_fail(fail);
        if jump.is_none() && fail.is_none() {
            b.set_exit(true);
        }
        b
    }

    #[test]
    fn test_fallthrough_chain_merges_to_one_block() {
        // 0 -> 1 -> 2, all single-edge
        let mut f = Function::new(0, "chain");
        f.add_block(block(0x0, Some(0x10), None));
        f.add_block(block(0x10, Some(0x20), None));
        f.add_block(block(0x20, None, None));

        for i in 0..3 {
            let dst = f.arena_mut().reg("eax", 32);
            let v = f.arena_mut().val(i, 32);
            let assign = f.arena_mut().assign(dst, v);
            f.block_mut(i as usize)
                .unwrap()
                .container_mut()
                .push(Statement::expr(0x10 * i, assign));
        }

        let merges = merge_fallthroughs(&mut f).unwrap();
        assert_eq!(merges, 2);
        assert_eq!(f.blocks().len(), 1);
        assert_eq!(f.block(0).unwrap().container().len(), 3);
        assert!(f.block(0).unwrap().is_exit());
        assert!(f.block(0).unwrap().has_no_successors());
    }

    #[test]
    fn test_join_block_is_not_merged() {
        // Diamond: the join has two predecessors and must survive
        let mut f = Function::new(0, "diamond");
        f.add_block(block(0x0, Some(0x10), Some(0x20)));
        f.add_block(block(0x10, Some(0x30), None));
        f.add_block(block(0x20, Some(0x30), None));
        f.add_block(block(0x30, None, None));

        let merges = merge_fallthroughs(&mut f).unwrap();
        assert_eq!(merges, 0);
        assert_eq!(f.blocks().len(), 4);
    }

    #[test]
    fn test_loop_detection() {
        // 0 -> 1 (header) -> 2 -> 1, 1 -> 3 (exit)
        let mut f = Function::new(0, "looped");
        f.add_block(block(0x0, Some(0x10), None));
        f.add_block(block(0x10, Some(0x20), Some(0x30)));
        f.add_block(block(0x20, Some(0x10), None));
        f.add_block(block(0x30, None, None));

        let scopes = detect_loops(&f).unwrap();
        assert_eq!(scopes.len(), 1);
        let Scope::Loop { header, body, exit } = &scopes[0] else {
            panic!("expected a loop scope");
        };
        assert_eq!(*header, 1);
        assert_eq!(body, &[1, 2]);
        assert_eq!(*exit, Some(3));
    }

    #[test]
    fn test_if_else_diamond_detection() {
        let mut f = Function::new(0, "diamond");
        f.add_block(block(0x0, Some(0x10), Some(0x20)));
        f.add_block(block(0x10, Some(0x30), None));
        f.add_block(block(0x20, Some(0x30), None));
        f.add_block(block(0x30, None, None));

        let scopes = recover(&mut f, &Config::default()).unwrap();
        assert_eq!(scopes.len(), 1);
        let Scope::Conditional {
            cond,
            then_body,
            else_body,
            join,
        } = &scopes[0]
        else {
            panic!("expected a conditional scope");
        };
        assert_eq!(*cond, 0);
        assert_eq!(then_body, &[1]);
        assert_eq!(else_body, &[2]);
        assert_eq!(*join, Some(3));
    }

    #[test]
    fn test_if_then_detection() {
        // 0 -> {1, 2}; 1 -> 2: then-arm only
        let mut f = Function::new(0, "ifthen");
        f.add_block(block(0x0, Some(0x10), Some(0x20)));
        f.add_block(block(0x10, Some(0x20), None));
        f.add_block(block(0x20, None, None));

        let scopes = recover(&mut f, &Config::default()).unwrap();
        assert_eq!(scopes.len(), 1);
        let Scope::Conditional {
            cond,
            then_body,
            else_body,
            join,
        } = &scopes[0]
        else {
            panic!("expected a conditional scope");
        };
        assert_eq!(*cond, 0);
        assert_eq!(then_body, &[1]);
        assert!(else_body.is_empty());
        assert_eq!(*join, Some(2));
    }

    #[test]
    fn test_loop_header_branch_is_not_a_conditional() {
        // The header's two-way branch belongs to the loop, not to an if
        let mut f = Function::new(0, "looped");
        f.add_block(block(0x0, Some(0x10), None));
        f.add_block(block(0x10, Some(0x20), Some(0x30)));
        f.add_block(block(0x20, Some(0x10), None));
        f.add_block(block(0x30, None, None));

        let scopes = recover(&mut f, &Config::default()).unwrap();
        let conditionals = scopes
            .iter()
            .filter(|s| matches!(s, Scope::Conditional { .. }))
            .count();
        assert_eq!(conditionals, 0);
        let loops = scopes
            .iter()
            .filter(|s| matches!(s, Scope::Loop { .. }))
            .count();
        assert_eq!(loops, 1);
    }
}
