//! ## ringswitch-core::tree
//! **Fan-out graph**
//!
//! A strict ownership hierarchy: a [`RuleNode`] owns its ordered children and
//! a branch owns exactly one nested rule. The root rule fans out from the
//! engine's own linked interface; a missing root means every frame is dropped.

use std::collections::TryReserveError;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::filter::FilterGate;
use crate::ring::{PortId, RingId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanOut {
    /// One child per frame, picked by flow hash.
    Share,
    /// Every child gets the frame.
    Copy,
    /// No child; represented by the absence of a rule.
    Drop,
}

/// Pipe peer of `name`: every `{` becomes `}` and vice versa.
pub fn peer_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '{' => '}',
            '}' => '{',
            other => other,
        })
        .collect()
}

/// A slot waiting for transfer to a leaf's channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagedSlot {
    pub ring: RingId,
    pub slot: u32,
}

/// Slots selected for one leaf during the current poll cycle.
///
/// Sized once for the largest number of RX slots a cycle can drain.
#[derive(Debug, Default)]
pub struct StagingQueue {
    entries: Vec<StagedSlot>,
}

impl StagingQueue {
    pub fn with_capacity(capacity: usize) -> Result<Self, TryReserveError> {
        let mut entries = Vec::new();
        entries.try_reserve_exact(capacity)?;
        Ok(Self { entries })
    }

    #[inline]
    pub fn push(&mut self, ring: RingId, slot: u32) {
        debug_assert!(
            self.entries.len() < self.entries.capacity(),
            "staging queue sized below one cycle of RX slots"
        );
        self.entries.push(StagedSlot { ring, slot });
    }

    /// Fill count.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn entries(&self) -> &[StagedSlot] {
        &self.entries
    }

    #[inline]
    pub fn reset(&mut self) {
        self.entries.clear();
    }
}

/// Delivery totals of one leaf.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeafCounters {
    pub forwarded: u64,
    pub discarded: u64,
}

#[derive(Debug)]
pub struct Leaf {
    pub filter: Option<Box<dyn FilterGate>>,
    pub queue: StagingQueue,
    /// Selected by the packet currently being dispatched.
    pub mark: bool,
    pub counters: LeafCounters,
}

impl Leaf {
    fn new(queue: StagingQueue) -> Self {
        Self {
            filter: None,
            queue,
            mark: false,
            counters: LeafCounters::default(),
        }
    }

    /// No filter means pass.
    #[inline]
    pub fn accepts(&self, frame: &[u8]) -> bool {
        self.filter.as_ref().map_or(true, |f| f.pass(frame))
    }
}

#[derive(Debug)]
pub enum Role {
    Leaf(Leaf),
    Branch(Box<RuleNode>),
}

/// Child of a rule: an output channel, either delivering (leaf) or fanning
/// out further (branch).
#[derive(Debug)]
pub struct TerminalNode {
    /// Endpoint name other rules and filters refer to.
    pub name: String,
    /// Output channel; stays open until teardown even once the node branches.
    pub channel: PortId,
    pub role: Role,
}

impl TerminalNode {
    pub fn leaf(name: String, channel: PortId, queue: StagingQueue) -> Self {
        Self {
            name,
            channel,
            role: Role::Leaf(Leaf::new(queue)),
        }
    }

    pub fn as_leaf(&self) -> Option<&Leaf> {
        match &self.role {
            Role::Leaf(leaf) => Some(leaf),
            Role::Branch(_) => None,
        }
    }

    pub fn as_leaf_mut(&mut self) -> Option<&mut Leaf> {
        match &mut self.role {
            Role::Leaf(leaf) => Some(leaf),
            Role::Branch(_) => None,
        }
    }

    pub fn nested(&self) -> Option<&RuleNode> {
        match &self.role {
            Role::Branch(rule) => Some(rule),
            Role::Leaf(_) => None,
        }
    }

    pub fn nested_mut(&mut self) -> Option<&mut RuleNode> {
        match &mut self.role {
            Role::Branch(rule) => Some(rule),
            Role::Leaf(_) => None,
        }
    }

    /// Makes room for one more child under this node. A leaf becomes a branch
    /// with `mode` only once the new rule's storage is allocated; on failure
    /// the node is left as it was.
    pub(crate) fn reserve_branch(&mut self, mode: FanOut) -> Result<(), TryReserveError> {
        match &mut self.role {
            Role::Branch(rule) => rule.children.try_reserve(1),
            Role::Leaf(_) => {
                let rule = RuleNode::with_room(mode, &self.name)?;
                self.role = Role::Branch(Box::new(rule));
                Ok(())
            }
        }
    }
}

#[derive(Debug)]
pub struct RuleNode {
    pub mode: FanOut,
    /// Interface this rule fans out from.
    pub source: String,
    /// Scan order for COPY and the order destinations are created in.
    pub children: Vec<TerminalNode>,
}

impl RuleNode {
    pub fn new(mode: FanOut, source: &str) -> Self {
        Self {
            mode,
            source: source.to_string(),
            children: Vec::new(),
        }
    }

    /// Empty rule with storage for its first child.
    pub(crate) fn with_room(mode: FanOut, source: &str) -> Result<Self, TryReserveError> {
        let mut rule = Self::new(mode, source);
        rule.children.try_reserve(1)?;
        Ok(rule)
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.children.len()
    }

    /// Depth-first search for the node called `name`, branches included.
    pub fn find(&self, name: &str) -> Option<&TerminalNode> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.nested().and_then(|rule| rule.find(name)) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut TerminalNode> {
        for child in self.children.iter_mut() {
            if child.name == name {
                return Some(child);
            }
            if let Role::Branch(rule) = &mut child.role {
                if let Some(found) = rule.find_mut(name) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Copies `filter` into every leaf called `name`. Returns how many leaves
    /// took it.
    pub fn attach_filter(&mut self, filter: &dyn FilterGate, name: &str) -> usize {
        let mut attached = 0;
        for child in self.children.iter_mut() {
            match &mut child.role {
                Role::Branch(rule) => attached += rule.attach_filter(filter, name),
                Role::Leaf(leaf) if child.name == name => {
                    leaf.filter = Some(filter.clone_gate());
                    attached += 1;
                }
                Role::Leaf(_) => {}
            }
        }
        attached
    }

    pub fn leaf_count(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.nested().map_or(1, RuleNode::leaf_count))
            .sum()
    }

    /// Visits every leaf depth-first, in child order.
    pub fn for_each_leaf<F: FnMut(&TerminalNode, &Leaf)>(&self, f: &mut F) {
        for child in &self.children {
            match &child.role {
                Role::Leaf(leaf) => f(child, leaf),
                Role::Branch(rule) => rule.for_each_leaf(f),
            }
        }
    }

    /// Total entries staged across every leaf below this rule.
    pub fn staged(&self) -> usize {
        self.children
            .iter()
            .map(|c| match &c.role {
                Role::Leaf(leaf) => leaf.queue.len(),
                Role::Branch(rule) => rule.staged(),
            })
            .sum()
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(
            f,
            "{:indent$}{} [{:?}, {} children]",
            "",
            self.source,
            self.mode,
            self.count(),
            indent = depth * 2
        )?;
        for child in &self.children {
            match &child.role {
                Role::Leaf(leaf) => writeln!(
                    f,
                    "{:indent$}-> {} ({}{})",
                    "",
                    child.name,
                    child.channel,
                    if leaf.filter.is_some() { ", filtered" } else { "" },
                    indent = (depth + 1) * 2
                )?,
                Role::Branch(rule) => rule.render(f, depth + 1)?,
            }
        }
        Ok(())
    }
}

/// The fan-out tree of one engine.
#[derive(Debug, Default)]
pub struct RuleTree {
    root: Option<RuleNode>,
}

impl RuleTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<&RuleNode> {
        self.root.as_ref()
    }

    pub fn root_mut(&mut self) -> Option<&mut RuleNode> {
        self.root.as_mut()
    }

    /// Fan-out applied to frames from the linked interface.
    pub fn mode(&self) -> FanOut {
        self.root.as_ref().map_or(FanOut::Drop, |r| r.mode)
    }

    pub fn find(&self, name: &str) -> Option<&TerminalNode> {
        self.root.as_ref().and_then(|r| r.find(name))
    }

    pub fn find_leaf(&self, name: &str) -> Option<&Leaf> {
        self.find(name).and_then(TerminalNode::as_leaf)
    }

    pub fn leaf_count(&self) -> usize {
        self.root.as_ref().map_or(0, RuleNode::leaf_count)
    }

    pub fn staged(&self) -> usize {
        self.root.as_ref().map_or(0, RuleNode::staged)
    }

    pub fn for_each_leaf<F: FnMut(&TerminalNode, &Leaf)>(&self, mut f: F) {
        if let Some(root) = &self.root {
            root.for_each_leaf(&mut f);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Root rule with room for one more child. The root is created only once
    /// its storage is allocated; a failed reservation leaves the tree as is.
    pub(crate) fn reserve_root(
        &mut self,
        mode: FanOut,
        source: &str,
    ) -> Result<&mut RuleNode, TryReserveError> {
        let root = match self.root.take() {
            Some(mut root) => {
                if let Err(e) = root.children.try_reserve(1) {
                    self.root = Some(root);
                    return Err(e);
                }
                root
            }
            None => RuleNode::with_room(mode, source)?,
        };
        Ok(self.root.insert(root))
    }

    pub(crate) fn take_root(&mut self) -> Option<RuleNode> {
        self.root.take()
    }
}

impl fmt::Display for RuleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            Some(root) => root.render(f, 0),
            None => writeln!(f, "(drop)"),
        }
    }
}
