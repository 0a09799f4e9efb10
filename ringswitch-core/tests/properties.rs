mod common;

use common::*;
use proptest::prelude::*;
use ringswitch_core::dispatch::{dispatch, stage};
use ringswitch_core::filter::FnGate;
use ringswitch_core::jitter::JitterSource;
use ringswitch_core::prelude::*;
use ringswitch_core::tree::{Role, StagingQueue};

/// Tree outline used to build arbitrary rule trees.
#[derive(Debug, Clone)]
enum Shape {
    Leaf,
    Rule(FanOut, Vec<Shape>),
}

fn fan_out() -> impl Strategy<Value = FanOut> {
    prop_oneof![Just(FanOut::Share), Just(FanOut::Copy)]
}

fn shape() -> impl Strategy<Value = Shape> {
    let leaf = Just(Shape::Leaf);
    leaf.prop_recursive(3, 24, 4, |inner| {
        (fan_out(), prop::collection::vec(inner, 1..4)).prop_map(|(m, c)| Shape::Rule(m, c))
    })
}

fn root_shape() -> impl Strategy<Value = (FanOut, Vec<Shape>)> {
    (fan_out(), prop::collection::vec(shape(), 1..5))
}

fn build(mode: FanOut, children: &[Shape], next: &mut u32) -> RuleNode {
    let mut rule = RuleNode::new(mode, &format!("r{next}"));
    for child in children {
        *next += 1;
        let name = format!("n{next}");
        let port = PortId(*next);
        let node = match child {
            Shape::Leaf => TerminalNode::leaf(name, port, StagingQueue::with_capacity(4).unwrap()),
            Shape::Rule(m, c) => TerminalNode {
                name,
                channel: port,
                role: Role::Branch(Box::new(build(*m, c, next))),
            },
        };
        rule.children.push(node);
    }
    rule
}

fn all_copy(rule: &RuleNode) -> bool {
    rule.mode == FanOut::Copy
        && rule
            .children
            .iter()
            .all(|c| c.nested().map_or(true, all_copy))
}

fn marked(rule: &RuleNode) -> Vec<usize> {
    rule.children
        .iter()
        .enumerate()
        .filter(|(_, c)| c.as_leaf().is_some_and(|l| l.mark))
        .map(|(i, _)| i)
        .collect()
}

fn leaf_names(rule: &RuleNode) -> Vec<String> {
    rule.children
        .iter()
        .flat_map(|c| match c.nested() {
            Some(nested) => leaf_names(nested),
            None => vec![c.name.clone()],
        })
        .collect()
}

fn ring() -> RingId {
    RingId::rx(PortId(0), 0)
}

proptest! {
    #[test]
    fn staged_never_exceeds_leaves((mode, children) in root_shape(), hash in any::<u32>()) {
        let mut root = build(mode, &children, &mut 0);
        let mut jitter = JitterSource::off();

        let marks = dispatch(Some(&mut root), b"frame", hash, &mut jitter);
        let staged = stage(&mut root, ring(), 0);

        prop_assert_eq!(marks, staged);
        prop_assert!(staged <= root.leaf_count());
        if all_copy(&root) {
            prop_assert_eq!(staged, root.leaf_count());
        }
        prop_assert!(staged >= 1);
    }

    #[test]
    fn share_marks_hash_mod_count(count in 1usize..16, hash in any::<u32>()) {
        let shapes = vec![Shape::Leaf; count];
        let mut root = build(FanOut::Share, &shapes, &mut 0);
        let mut jitter = JitterSource::off();

        prop_assert_eq!(dispatch(Some(&mut root), b"frame", hash, &mut jitter), 1);
        prop_assert_eq!(marked(&root), vec![hash as usize % count]);
    }

    #[test]
    fn rejecting_filters_stage_nothing((mode, children) in root_shape(), hash in any::<u32>()) {
        let mut root = build(mode, &children, &mut 0);
        let names = leaf_names(&root);
        let reject = FnGate(|_: &[u8]| false);
        for name in &names {
            root.attach_filter(&reject, name);
        }
        let mut jitter = JitterSource::off();

        prop_assert_eq!(dispatch(Some(&mut root), b"frame", hash, &mut jitter), 0);
        prop_assert_eq!(stage(&mut root, ring(), 0), 0);
    }

    #[test]
    fn drop_consumes_min_of_batch_and_space(pending in 0usize..15, batch in 1u16..20) {
        let (mut engine, _) = engine_with(settings(TransferMode::Swap), provider(16, 1));
        engine.link(IFACE, batch, None).unwrap();
        let frames: Vec<Vec<u8>> = (0..pending as u32).map(frame).collect();
        inject_all(&mut engine, 0, &frames);

        let cycle = engine.poll_once(&mut RuleTree::new()).unwrap();
        let expected = pending.min(usize::from(batch)) as u64;
        prop_assert_eq!(cycle.dropped, expected);
        prop_assert_eq!(cycle.packets, expected);
        prop_assert_eq!(engine.provider().rx_pending(IFACE, 0) as u64, pending as u64 - expected);
    }

    #[test]
    fn swap_and_copy_deliver_identical_bytes(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..400), 1..15),
        copies in 1usize..4,
        nested in any::<bool>(),
    ) {
        let frames: Vec<Vec<u8>> = payloads
            .iter()
            .enumerate()
            .map(|(i, p)| ringswitch_sim::traffic::udp_frame(flow(i as u32), p).to_vec())
            .collect();
        let leaves: Vec<String> = (0..copies).map(|i| format!("q{{{i}")).collect();

        let mut delivered = Vec::new();
        for transfer in [TransferMode::Swap, TransferMode::Copy] {
            let mut engine = linked(transfer, 16, 1);
            let mut tree = RuleTree::new();
            let source = if nested {
                engine.create_channel(&mut tree, IFACE, "p{0", FanOut::Share).unwrap();
                "p}0"
            } else {
                IFACE
            };
            for leaf in &leaves {
                engine.create_channel(&mut tree, source, leaf, FanOut::Copy).unwrap();
            }
            inject_all(&mut engine, 0, &frames);
            engine.poll_once(&mut tree).unwrap();
            engine.provider_mut().transmit_pending();

            let out: Vec<Vec<Vec<u8>>> = leaves
                .iter()
                .map(|leaf| {
                    engine
                        .provider()
                        .transmitted(leaf)
                        .iter()
                        .map(|b| b.to_vec())
                        .collect()
                })
                .collect();
            delivered.push(out);
        }

        for out in &delivered[0] {
            prop_assert_eq!(out, &frames);
        }
        prop_assert_eq!(&delivered[0], &delivered[1]);
    }

    #[test]
    fn saturation_discards_and_resets(pending in 1u32..15, retries in 0u32..5) {
        let mut settings = settings(TransferMode::Swap);
        settings.tx_retries = retries;
        let (mut engine, _) = engine_with(settings, provider(8, 2));
        engine.link(IFACE, 512, None).unwrap();
        let mut tree = RuleTree::new();
        engine.create_channel(&mut tree, IFACE, "p{0", FanOut::Copy).unwrap();
        engine.provider_mut().set_stalled("p{0", true).unwrap();

        let frames: Vec<Vec<u8>> = (0..pending).map(frame).collect();
        let split = frames.len().min(7);
        inject_all(&mut engine, 0, &frames[..split]);
        inject_all(&mut engine, 1, &frames[split..]);

        let cycle = engine.poll_once(&mut tree).unwrap();
        let fits = u64::from(pending.min(7));
        prop_assert_eq!(cycle.forwarded, fits);
        prop_assert_eq!(cycle.discarded, u64::from(pending) - fits);
        prop_assert_eq!(cycle.tx_syncs, if pending > 7 { u64::from(retries) } else { 0 });
        prop_assert_eq!(tree.staged(), 0);

        let next = engine.poll_once(&mut tree).unwrap();
        prop_assert_eq!(next.forwarded + next.discarded, 0);
    }

    #[test]
    fn peer_name_is_an_involution(name in "[a-z0-9:{}]{0,16}") {
        prop_assert_eq!(peer_name(&peer_name(&name)), name);
    }

    #[test]
    fn mode_conflict_never_mutates_tree(first in fan_out(), leaves in 1usize..4) {
        let second = match first {
            FanOut::Share => FanOut::Copy,
            _ => FanOut::Share,
        };
        let mut engine = linked(TransferMode::Swap, 16, 1);
        let mut tree = RuleTree::new();
        for i in 0..leaves {
            engine.create_channel(&mut tree, IFACE, &format!("p{{{i}"), first).unwrap();
        }
        let before = tree.to_string();
        let ports = engine.provider().open_ports();

        let root = engine.create_channel(&mut tree, IFACE, "q{0", second);
        prop_assert!(matches!(root, Err(SwitchError::SourceUnavailable(_))));

        engine.create_channel(&mut tree, "p}0", "r{0", first).unwrap();
        let after_nest = tree.to_string();
        let nested = engine.create_channel(&mut tree, "p}0", "r{1", second);
        prop_assert!(matches!(nested, Err(SwitchError::SourceUnavailable(_))));

        prop_assert_ne!(&before, &after_nest);
        prop_assert_eq!(tree.to_string(), after_nest);
        prop_assert_eq!(engine.provider().open_ports(), ports + 1);
    }
}
