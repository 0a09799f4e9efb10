//! ## ringswitch-core::dispatch
//! **Per-packet routing decision and staging**
//!
//! Dispatch only sets transient marks on leaves; it never touches rings or
//! buffers. Staging then walks the same tree once more and records the slot
//! against every marked leaf, clearing the mark as it goes. A frame that ends
//! up selecting nothing costs no queue mutation at all.

use tracing::trace;

use crate::jitter::JitterSource;
use crate::ring::RingId;
use crate::tree::{FanOut, Leaf, Role, RuleNode, TerminalNode};

/// Routes one frame through `rule`. Returns the number of leaves newly marked.
///
/// `None` is the DROP rule: nothing is marked.
pub fn dispatch(
    rule: Option<&mut RuleNode>,
    frame: &[u8],
    flow_hash: u32,
    jitter: &mut JitterSource,
) -> usize {
    match rule {
        Some(rule) => dispatch_rule(rule, frame, flow_hash, jitter),
        None => 0,
    }
}

fn dispatch_rule(
    rule: &mut RuleNode,
    frame: &[u8],
    flow_hash: u32,
    jitter: &mut JitterSource,
) -> usize {
    match rule.mode {
        FanOut::Share => {
            let count = rule.children.len();
            if count == 0 {
                return 0;
            }
            let pick = flow_hash.wrapping_add(jitter.draw()) as usize % count;
            trace!(source = %rule.source, pick, count, "share");
            visit(&mut rule.children[pick], frame, flow_hash, jitter)
        }
        FanOut::Copy => rule
            .children
            .iter_mut()
            .map(|child| visit(child, frame, flow_hash, jitter))
            .sum(),
        FanOut::Drop => 0,
    }
}

#[inline]
fn visit(
    node: &mut TerminalNode,
    frame: &[u8],
    flow_hash: u32,
    jitter: &mut JitterSource,
) -> usize {
    match &mut node.role {
        Role::Branch(rule) => dispatch_rule(rule, frame, flow_hash, jitter),
        Role::Leaf(leaf) => usize::from(mark(leaf, frame)),
    }
}

/// Marks the leaf if its filter passes. Re-marking is a no-op.
#[inline]
fn mark(leaf: &mut Leaf, frame: &[u8]) -> bool {
    if leaf.mark || !leaf.accepts(frame) {
        return false;
    }
    leaf.mark = true;
    true
}

/// Records `(ring, slot)` on every marked leaf below `rule` and clears the
/// marks. Returns the number of entries staged.
pub fn stage(rule: &mut RuleNode, ring: RingId, slot: u32) -> usize {
    let mut staged = 0;
    for child in rule.children.iter_mut() {
        match &mut child.role {
            Role::Branch(nested) => staged += stage(nested, ring, slot),
            Role::Leaf(leaf) if leaf.mark => {
                leaf.queue.push(ring, slot);
                leaf.mark = false;
                staged += 1;
            }
            Role::Leaf(_) => {}
        }
    }
    staged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FnGate;
    use crate::jitter::{JitterMode, JitterSettings};
    use crate::ring::PortId;
    use crate::tree::tests::{branch, leaf, rule};

    fn marked(rule: &RuleNode) -> Vec<String> {
        let mut out = Vec::new();
        for child in &rule.children {
            match &child.role {
                Role::Leaf(l) if l.mark => out.push(child.name.clone()),
                Role::Branch(nested) => out.extend(marked(nested)),
                _ => {}
            }
        }
        out
    }

    fn ring() -> RingId {
        RingId::rx(PortId(0), 0)
    }

    #[test]
    fn drop_marks_nothing() {
        let mut jitter = JitterSource::off();
        assert_eq!(dispatch(None, b"frame", 5, &mut jitter), 0);
    }

    #[test]
    fn share_picks_hash_mod_count() {
        let mut root = rule(
            FanOut::Share,
            vec![leaf("a", 1), leaf("b", 2), leaf("c", 3)],
        );
        let mut jitter = JitterSource::off();

        assert_eq!(dispatch(Some(&mut root), b"f", 7, &mut jitter), 1);
        assert_eq!(marked(&root), vec!["b"]);
    }

    #[test]
    fn share_recurses_into_branch() {
        let nested = rule(FanOut::Copy, vec![leaf("x", 3), leaf("y", 4)]);
        let mut root = rule(FanOut::Share, vec![leaf("a", 1), branch("b", 2, nested)]);
        let mut jitter = JitterSource::off();

        assert_eq!(dispatch(Some(&mut root), b"f", 1, &mut jitter), 2);
        assert_eq!(marked(&root), vec!["x", "y"]);
    }

    #[test]
    fn share_with_jitter_still_marks_exactly_one() {
        let mut root = rule(
            FanOut::Share,
            vec![leaf("a", 1), leaf("b", 2), leaf("c", 3)],
        );
        let mut jitter = JitterSource::new(JitterSettings {
            mode: JitterMode::Random,
            bound: 100,
            seed: 3,
        });
        for hash in 0..50 {
            assert_eq!(dispatch(Some(&mut root), b"f", hash, &mut jitter), 1);
            assert_eq!(stage(&mut root, ring(), hash), 1);
        }
        assert_eq!(root.staged(), 50);
    }

    #[test]
    fn copy_marks_every_child() {
        let mut root = rule(FanOut::Copy, vec![leaf("a", 1), leaf("b", 2)]);
        let mut jitter = JitterSource::off();
        assert_eq!(dispatch(Some(&mut root), b"f", 0, &mut jitter), 2);
    }

    #[test]
    fn rejecting_filter_blocks_mark() {
        let mut root = rule(FanOut::Copy, vec![leaf("a", 1), leaf("b", 2)]);
        root.attach_filter(&FnGate(|_: &[u8]| false), "a");
        let mut jitter = JitterSource::off();

        assert_eq!(dispatch(Some(&mut root), b"f", 0, &mut jitter), 1);
        assert_eq!(marked(&root), vec!["b"]);
    }

    #[test]
    fn repeated_mark_is_counted_once() {
        let mut root = rule(FanOut::Copy, vec![leaf("a", 1)]);
        let mut jitter = JitterSource::off();
        assert_eq!(dispatch(Some(&mut root), b"f", 0, &mut jitter), 1);
        assert_eq!(dispatch(Some(&mut root), b"f", 0, &mut jitter), 0);
        assert_eq!(stage(&mut root, ring(), 0), 1);
    }

    #[test]
    fn stage_records_and_clears_marks() {
        let nested = rule(FanOut::Copy, vec![leaf("x", 3)]);
        let mut root = rule(FanOut::Copy, vec![leaf("a", 1), branch("b", 2, nested)]);
        let mut jitter = JitterSource::off();

        dispatch(Some(&mut root), b"f", 0, &mut jitter);
        assert_eq!(stage(&mut root, ring(), 17), 2);
        assert!(marked(&root).is_empty());

        let x = root.find("x").unwrap().as_leaf().unwrap();
        assert_eq!(x.queue.entries()[0].slot, 17);
        assert_eq!(x.queue.entries()[0].ring, ring());
    }

    #[test]
    fn unmarked_tree_stages_nothing() {
        let mut root = rule(FanOut::Share, vec![leaf("a", 1), leaf("b", 2)]);
        assert_eq!(stage(&mut root, ring(), 3), 0);
        assert_eq!(root.staged(), 0);
    }
}
