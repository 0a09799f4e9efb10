//! ## ringswitch-core::builder
//! **Runtime construction of the switching pipeline**
//!
//! Linking binds the engine to an interface (or one of its hardware queues),
//! channel creation grows the fan-out tree one destination at a time, filters
//! are copied into leaves and teardown closes every channel depth-first.
//!
//! Tree mutation must not overlap with polling; nothing here locks the tree.

use tracing::{debug, info, instrument, warn};

use crate::engine::{LinkState, SwitchEngine};
use crate::error::SwitchError;
use crate::filter::FilterGate;
use crate::flush::TransferMode;
use crate::registry::QueueMode;
use crate::ring::{OpenFlags, PortId, RingProvider};
use crate::tree::{peer_name, FanOut, Role, RuleNode, RuleTree, StagingQueue, TerminalNode};

/// `unlink` target releasing every interface this engine owns.
pub const UNLINK_ALL: &str = "all";

impl<P: RingProvider> SwitchEngine<P> {
    /// Binds the engine to `name`. When another engine already holds the
    /// interface, `queue` must name the hardware queue to read.
    ///
    /// Returns the local handle.
    #[instrument(skip(self), fields(engine = %self.settings.name))]
    pub fn link(
        &mut self,
        name: &str,
        batch_size: u16,
        queue: Option<u16>,
    ) -> Result<PortId, SwitchError> {
        let owner = self.settings.name.clone();

        let shared = match self.registry.find(name) {
            None => {
                let global = self
                    .provider
                    .open(name, OpenFlags::global(self.settings.extra_bufs, queue), None)
                    .map_err(|source| SwitchError::ChannelOpen {
                        name: name.to_string(),
                        source,
                    })?;
                let mode = match queue {
                    Some(_) => QueueMode::HwQueues,
                    None => QueueMode::NoQueues,
                };
                if let Err(source) = self.registry.create(name, mode, global, &owner) {
                    self.provider.close(global);
                    return Err(SwitchError::BindingConflict {
                        iface: name.to_string(),
                        source,
                    });
                }
                self.globals.push((name.to_string(), global));
                global
            }
            Some(_) => {
                if queue.is_none() {
                    warn!("Qid not given, interface {name} is set to read from H/W queues");
                    return Err(SwitchError::QueueRequired(name.to_string()));
                }
                let binding = self
                    .registry
                    .retrieve_and_rebind(name, QueueMode::HwQueues, &owner)
                    .map_err(|source| {
                        warn!("Error in linking {name} to engine {owner}: {source}");
                        SwitchError::BindingConflict {
                            iface: name.to_string(),
                            source,
                        }
                    })?;
                binding.port
            }
        };

        if let Some(previous) = self.link.take() {
            debug!("Replacing link to {}", previous.name);
            self.provider.close(previous.local);
        }

        let local = self
            .provider
            .open(name, OpenFlags::local(queue), Some(shared))
            .map_err(|source| SwitchError::ChannelOpen {
                name: name.to_string(),
                source,
            })?;
        debug!(
            "zerocopy {}",
            if self.provider.shares_memory(shared, local) {
                "enabled"
            } else {
                "disabled"
            }
        );

        self.link = Some(LinkState {
            name: name.to_string(),
            local,
            batch_size,
        });

        if !self.settings.link_settle.is_zero() {
            info!("Wait for {:?} for phy reset", self.settings.link_settle);
            std::thread::sleep(self.settings.link_settle);
        }
        Ok(local)
    }

    /// Closes the local handle and releases `name`, or every interface owned
    /// by this engine when `name` is [`UNLINK_ALL`].
    #[instrument(skip(self), fields(engine = %self.settings.name))]
    pub fn unlink(&mut self, name: &str) {
        if let Some(link) = self.link.take() {
            self.provider.close(link.local);
        }

        let released = if name == UNLINK_ALL {
            self.registry.unregister_all(&self.settings.name)
        } else {
            self.registry
                .unregister(name, &self.settings.name)
                .into_iter()
                .collect()
        };

        for binding in released {
            if let Some(pos) = self
                .globals
                .iter()
                .position(|(n, p)| *n == binding.name && *p == binding.port)
            {
                let (_, port) = self.globals.swap_remove(pos);
                self.provider.close(port);
            }
            debug!("Released {}", binding.name);
        }
    }

    /// Adds a destination `dest` fanning out from `source` with `mode`.
    ///
    /// `source` is either the linked interface (the root rule) or the name of
    /// an existing node. A node that already fans out only accepts channels of
    /// the same mode; a mismatch is reported like an unknown source. The new
    /// leaf is named after the peer of `dest`.
    #[instrument(skip(self, tree), fields(engine = %self.settings.name))]
    pub fn create_channel(
        &mut self,
        tree: &mut RuleTree,
        source: &str,
        dest: &str,
        mode: FanOut,
    ) -> Result<PortId, SwitchError> {
        if mode == FanOut::Drop {
            return Err(SwitchError::InvalidMode(mode));
        }
        let (link_name, local) = match &self.link {
            Some(link) => (link.name.clone(), link.local),
            None => return Err(SwitchError::NotLinked),
        };
        let at_root = source == link_name;

        let attachable = if at_root {
            tree.root().map_or(true, |r| r.mode == mode)
        } else {
            tree.find(source).is_some_and(|node| match node.nested() {
                Some(rule) => rule.mode == mode,
                None => true,
            })
        };
        if !attachable {
            info!(
                "Pipelining failed, could not find an appropriate source ({source}) for engine {}",
                self.settings.name
            );
            return Err(SwitchError::SourceUnavailable(source.to_string()));
        }

        let queue = StagingQueue::with_capacity(self.staging_capacity(local))
            .map_err(|e| SwitchError::Allocation(e.to_string()))?;

        let port = self
            .provider
            .open(dest, OpenFlags::output(), Some(local))
            .map_err(|source| SwitchError::ChannelOpen {
                name: dest.to_string(),
                source,
            })?;

        // Storage is reserved before the tree changes shape.
        let reserved = if at_root {
            tree.reserve_root(mode, source).map(Some)
        } else {
            match tree.root_mut().and_then(|r| r.find_mut(source)) {
                Some(node) => match node.reserve_branch(mode) {
                    Ok(()) => Ok(node.nested_mut()),
                    Err(e) => Err(e),
                },
                None => Ok(None),
            }
        };
        let rule = match reserved {
            Ok(Some(rule)) => rule,
            Ok(None) => {
                self.provider.close(port);
                return Err(SwitchError::SourceUnavailable(source.to_string()));
            }
            Err(e) => {
                self.provider.close(port);
                return Err(SwitchError::Allocation(e.to_string()));
            }
        };
        rule.children
            .push(TerminalNode::leaf(peer_name(dest), port, queue));

        info!(
            "zerocopy for {} --> {dest} (index: {}) {}",
            rule.source,
            rule.count() - 1,
            if self.provider.shares_memory(local, port) {
                "enabled"
            } else {
                "disabled"
            }
        );
        if mode == FanOut::Copy && self.settings.transfer == TransferMode::Swap && rule.count() == 2 {
            debug!("COPY fan-out from {source}: payloads below it are copied, not swapped");
        }
        Ok(port)
    }

    /// Copies `filter` into every leaf named `iface`. Returns how many leaves
    /// took it.
    pub fn add_filter(&self, tree: &mut RuleTree, filter: &dyn FilterGate, iface: &str) -> usize {
        let attached = tree
            .root_mut()
            .map_or(0, |root| root.attach_filter(filter, iface));
        if attached == 0 {
            warn!("No leaf named {iface} to attach a filter to");
        } else {
            debug!("Filter attached to {attached} leaves named {iface}");
        }
        attached
    }

    /// Closes every channel of the tree, depth-first, and empties it.
    pub fn delete_all(&mut self, tree: &mut RuleTree) {
        if let Some(root) = tree.take_root() {
            let closed = close_channels(root, &mut self.provider);
            debug!("Closed {closed} channels");
        }
    }
}

fn close_channels<P: RingProvider + ?Sized>(rule: RuleNode, provider: &mut P) -> usize {
    let mut closed = 0;
    for child in rule.children {
        provider.close(child.channel);
        closed += 1;
        if let Role::Branch(nested) = child.role {
            closed += close_channels(*nested, provider);
        }
    }
    closed
}
