//! Packets waiting for missing data.
//!
//! Each held packet is filed under the one thing it waits for, so progress on that thing wakes
//! exactly the packets that can use it. The queue is bounded per sending address and in total.

use std::collections::{HashMap, HashSet};
use weft_core::{MemberId, MessageKind, MessageRef};
use weft_wire::Address;

/// What a held packet is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Awaiting {
    /// The public key of a member, from an identity or a grant.
    Key(MemberId),
    /// One specific message.
    Message(MessageRef),
    /// The next sequence number of `(member, kind)`.
    Sequence(MemberId, MessageKind),
    /// Any new authorize, revoke or dynamic-settings record.
    Permissions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HeldPacket {
    pub packet: Vec<u8>,
    pub source: Address,
    pub deadline_ms: u64,
}

/// Result of [`HeldQueue::hold`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HoldResult {
    Held,
    AlreadyHeld,
    /// The sender or the whole queue is at capacity; the packet was not kept.
    Full,
}

#[derive(Debug)]
pub(crate) struct HeldQueue {
    per_source: usize,
    limit: usize,
    waiting: HashMap<Awaiting, Vec<HeldPacket>>,
    packets: HashSet<Vec<u8>>,
    by_source: HashMap<Address, usize>,
}

impl HeldQueue {
    pub fn new(per_source: usize, limit: usize) -> Self {
        Self {
            per_source,
            limit,
            waiting: HashMap::new(),
            packets: HashSet::new(),
            by_source: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn hold(&mut self, awaiting: Awaiting, held: HeldPacket, now_ms: u64) -> HoldResult {
        if self.packets.contains(&held.packet) {
            return HoldResult::AlreadyHeld;
        }
        if self.len() >= self.limit || self.held_from(held.source) >= self.per_source {
            self.expire(now_ms);
        }
        if self.len() >= self.limit || self.held_from(held.source) >= self.per_source {
            return HoldResult::Full;
        }
        self.packets.insert(held.packet.clone());
        *self.by_source.entry(held.source).or_default() += 1;
        self.waiting.entry(awaiting).or_default().push(held);
        HoldResult::Held
    }

    /// Take every packet waiting for `awaiting`, oldest first.
    pub fn wake(&mut self, awaiting: &Awaiting) -> Vec<HeldPacket> {
        let woken = self.waiting.remove(awaiting).unwrap_or_default();
        for held in &woken {
            self.forget(held);
        }
        woken
    }

    /// Drop packets whose deadline has passed. Returns how many.
    pub fn expire(&mut self, now_ms: u64) -> usize {
        let mut expired = Vec::new();
        self.waiting.retain(|_, packets| {
            packets.retain(|held| {
                let keep = held.deadline_ms > now_ms;
                if !keep {
                    expired.push(held.clone());
                }
                keep
            });
            !packets.is_empty()
        });
        for held in &expired {
            self.forget(held);
        }
        expired.len()
    }

    fn held_from(&self, source: Address) -> usize {
        self.by_source.get(&source).copied().unwrap_or(0)
    }

    fn forget(&mut self, held: &HeldPacket) {
        self.packets.remove(&held.packet);
        if let Some(count) = self.by_source.get_mut(&held.source) {
            *count -= 1;
            if *count == 0 {
                self.by_source.remove(&held.source);
            }
        }
    }
}
