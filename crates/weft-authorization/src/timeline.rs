//! # Permission Timeline
//!
//! Append-only record of authorize, revoke and dynamic-settings messages for one community, with
//! the per-`(member, kind)` sequence floors that order them.
//!
//! ## Semantics
//!
//! - The community root holds every bit on every kind, always.
//! - A record authored at global time `g` is in force for messages with global time `> g`.
//! - For `(grantee, kind, bit)` at time `t`, the last in-force record by
//!   `(global time, sequence, issuer)` whose issuer held the issuing bit at its own global time
//!   decides. Records whose issuer lacked that bit are skipped.
//! - Decisions are derived on read and cached per queried global time. A decision at `t` only
//!   depends on records below `t`, so accepting a record at `g` discards the cached decisions
//!   above `g` and nothing else. Out-of-order acceptance never leaves stale state behind.
//! - Chains are resolved with an explicit stack; an arbitrarily long delegation chain costs heap,
//!   not call depth.

use crate::errors::{AcceptanceError, AuthorizationError, SequenceError};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use weft_core::{
    GlobalTime, MemberId, MessageCatalog, MessageKind, MessageRef, Permission, PermissionSet,
    PolicyType, ResolutionPolicy,
};
use weft_wire::{DestroyDegree, PolicySetting};

/// Author, global time and sequence number of an incoming sequenced message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorship {
    pub member: MemberId,
    pub global_time: GlobalTime,
    pub sequence: Option<u32>,
}

impl Authorship {
    pub fn reference(&self) -> MessageRef {
        MessageRef::new(self.member, self.global_time)
    }
}

/// Bits granted to or revoked from one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantTarget {
    pub grantee: MemberId,
    pub permissions: Vec<(MessageKind, PermissionSet)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct GrantRecord {
    issuer: MemberId,
    global_time: GlobalTime,
    sequence: u32,
    revoke: bool,
}

impl GrantRecord {
    fn order_key(&self) -> (GlobalTime, u32, MemberId) {
        (self.global_time, self.sequence, self.issuer)
    }

    fn reference(&self) -> MessageRef {
        MessageRef::new(self.issuer, self.global_time)
    }

    /// The query that decides whether this record's issuer was entitled to write it.
    fn issuer_query(&self) -> Query {
        let issuing = if self.revoke {
            Permission::Revoke
        } else {
            Permission::Authorize
        };
        (self.issuer, issuing, self.global_time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PolicyRecord {
    effective: GlobalTime,
    sequence: u32,
    member: MemberId,
    index: u8,
}

type GrantKey = (MemberId, MessageKind, Permission);

/// `(member, permission, global time)` on one kind.
type Query = (MemberId, Permission, GlobalTime);

/// Index of the deciding record for a query, `None` when no entitled record is in force.
type Decision = Option<usize>;

/// Resolved decisions keyed by the queried global time.
#[derive(Debug, Default)]
struct Decisions {
    by_time: BTreeMap<GlobalTime, HashMap<(MemberId, MessageKind, Permission), Decision>>,
}

impl Decisions {
    fn get(&self, kind: MessageKind, query: Query) -> Option<Decision> {
        let (member, permission, global_time) = query;
        self.by_time
            .get(&global_time)?
            .get(&(member, kind, permission))
            .copied()
    }

    fn insert(&mut self, kind: MessageKind, query: Query, decision: Decision) {
        let (member, permission, global_time) = query;
        self.by_time
            .entry(global_time)
            .or_default()
            .insert((member, kind, permission), decision);
    }

    /// Drop every decision that could depend on a record at `global_time`.
    fn discard_above(&mut self, global_time: GlobalTime) {
        if let Some(above) = global_time.checked_add(1) {
            self.by_time.split_off(&above);
        }
    }

    fn len(&self) -> usize {
        self.by_time.values().map(HashMap::len).sum()
    }
}

/// Unresolved query on the evaluation stack. `cursor` is one past the next record to examine.
struct Pending {
    query: Query,
    cursor: usize,
}

/// Permission and policy state of one community.
#[derive(Debug)]
pub struct Timeline {
    root: MemberId,
    catalog: Arc<MessageCatalog>,
    sequences: HashMap<(MemberId, MessageKind), u32>,
    grants: HashMap<GrantKey, Vec<GrantRecord>>,
    policies: HashMap<(MessageKind, PolicyType), Vec<PolicyRecord>>,
    destroyed_at: Option<(GlobalTime, DestroyDegree)>,
    decisions: Mutex<Decisions>,
}

impl Clone for Timeline {
    fn clone(&self) -> Self {
        Self {
            root: self.root,
            catalog: Arc::clone(&self.catalog),
            sequences: self.sequences.clone(),
            grants: self.grants.clone(),
            policies: self.policies.clone(),
            destroyed_at: self.destroyed_at,
            decisions: Mutex::new(Decisions::default()),
        }
    }
}

impl Timeline {
    pub fn new(root: MemberId, catalog: Arc<MessageCatalog>) -> Self {
        Self {
            root,
            catalog,
            sequences: HashMap::new(),
            grants: HashMap::new(),
            policies: HashMap::new(),
            destroyed_at: None,
            decisions: Mutex::new(Decisions::default()),
        }
    }

    pub fn root(&self) -> MemberId {
        self.root
    }

    pub fn catalog(&self) -> &MessageCatalog {
        &self.catalog
    }

    /// Highest accepted sequence number for `(member, kind)`, zero if none.
    pub fn highest_sequence(&self, member: &MemberId, kind: MessageKind) -> u32 {
        self.sequences.get(&(*member, kind)).copied().unwrap_or(0)
    }

    /// Whether `sequence` is exactly the next one for `(member, kind)`.
    pub fn check_sequence(
        &self,
        member: &MemberId,
        kind: MessageKind,
        sequence: u32,
    ) -> Result<(), SequenceError> {
        let floor = self.highest_sequence(member, kind);
        if sequence <= floor {
            return Err(SequenceError::Duplicate {
                member: *member,
                kind,
                sequence,
                floor,
            });
        }
        if sequence > floor + 1 {
            return Err(SequenceError::Gap {
                member: *member,
                kind,
                low: floor + 1,
                high: sequence - 1,
            });
        }
        Ok(())
    }

    /// Check and advance the sequence floor of `(member, kind)`.
    pub fn accept_sequence(
        &mut self,
        member: &MemberId,
        kind: MessageKind,
        sequence: u32,
    ) -> Result<(), SequenceError> {
        self.check_sequence(member, kind, sequence)?;
        self.sequences.insert((*member, kind), sequence);
        Ok(())
    }

    /// Global time of the earliest destroy-community record.
    pub fn destroyed_at(&self) -> Option<GlobalTime> {
        self.destroyed_at.map(|(at, _)| at)
    }

    pub fn check_destroyed(&self, global_time: GlobalTime) -> Result<(), AuthorizationError> {
        match self.destroyed_at {
            Some((destroyed_at, _)) if global_time > destroyed_at => {
                Err(AuthorizationError::Destroyed {
                    destroyed_at,
                    global_time,
                })
            }
            _ => Ok(()),
        }
    }

    /// Whether `member` holds `permission` on `kind` for a message at `global_time`.
    pub fn is_allowed(
        &self,
        member: &MemberId,
        kind: MessageKind,
        permission: Permission,
        global_time: GlobalTime,
    ) -> bool {
        self.holds(member, kind, permission, global_time)
    }

    /// Every bit `member` holds on `kind` at `global_time`.
    pub fn permissions(
        &self,
        member: &MemberId,
        kind: MessageKind,
        global_time: GlobalTime,
    ) -> PermissionSet {
        Permission::ALL
            .into_iter()
            .filter(|permission| self.holds(member, kind, *permission, global_time))
            .collect()
    }

    pub fn check_permission(
        &self,
        member: &MemberId,
        kind: MessageKind,
        permission: Permission,
        global_time: GlobalTime,
    ) -> Result<(), AuthorizationError> {
        if self.is_allowed(member, kind, permission, global_time) {
            Ok(())
        } else {
            Err(AuthorizationError::MissingPermission {
                member: *member,
                kind,
                permission,
                global_time,
            })
        }
    }

    /// Authority check for kinds whose payload carries no permission semantics of its own:
    /// application kinds follow their resolution policy, destroy-community needs permit.
    pub fn check_message(
        &self,
        member: &MemberId,
        kind: MessageKind,
        global_time: GlobalTime,
    ) -> Result<(), AuthorizationError> {
        self.check_destroyed(global_time)?;
        match kind {
            MessageKind::Application(_) => {
                if !self.catalog.contains(kind) {
                    return Err(AuthorizationError::UnknownKind(kind));
                }
                match self.resolve_policy(kind, PolicyType::Resolution, global_time) {
                    ResolutionPolicy::Public => Ok(()),
                    ResolutionPolicy::Linear => {
                        self.check_permission(member, kind, Permission::Permit, global_time)
                    }
                }
            }
            MessageKind::DestroyCommunity => {
                self.check_permission(member, kind, Permission::Permit, global_time)
            }
            _ => Ok(()),
        }
    }

    /// Accept an authorize message granting bits to each target.
    pub fn authorize(
        &mut self,
        author: Authorship,
        targets: &[GrantTarget],
    ) -> Result<(), AcceptanceError> {
        self.apply_grants(author, MessageKind::Authorize, targets, false)
    }

    /// Accept a revoke message removing bits from each target.
    pub fn revoke(
        &mut self,
        author: Authorship,
        targets: &[GrantTarget],
    ) -> Result<(), AcceptanceError> {
        self.apply_grants(author, MessageKind::Revoke, targets, true)
    }

    fn apply_grants(
        &mut self,
        author: Authorship,
        message_kind: MessageKind,
        targets: &[GrantTarget],
        revoke: bool,
    ) -> Result<(), AcceptanceError> {
        self.check_destroyed(author.global_time)?;
        let sequence = author
            .sequence
            .ok_or(AuthorizationError::Unsequenced(message_kind))?;
        self.check_sequence(&author.member, message_kind, sequence)?;

        let issuing = if revoke {
            Permission::Revoke
        } else {
            Permission::Authorize
        };
        for target in targets {
            for (kind, _) in &target.permissions {
                self.check_permission(&author.member, *kind, issuing, author.global_time)?;
            }
        }

        self.decisions.get_mut().discard_above(author.global_time);
        for target in targets {
            for (kind, permissions) in &target.permissions {
                for permission in permissions.iter() {
                    let record = GrantRecord {
                        issuer: author.member,
                        global_time: author.global_time,
                        sequence,
                        revoke,
                    };
                    let records = self
                        .grants
                        .entry((target.grantee, *kind, permission))
                        .or_default();
                    let at = records.partition_point(|r| r.order_key() <= record.order_key());
                    records.insert(at, record);
                }
                tracing::debug!(
                    issuer = %author.member,
                    grantee = %target.grantee,
                    kind = %kind,
                    bits = permissions.bits(),
                    revoke,
                    "permission record applied"
                );
            }
        }
        self.sequences
            .insert((author.member, message_kind), sequence);
        Ok(())
    }

    /// Accept a dynamic-settings message. Each setting takes effect at the record's global time + 1.
    pub fn apply_dynamic_settings(
        &mut self,
        author: Authorship,
        settings: &[PolicySetting],
    ) -> Result<(), AcceptanceError> {
        self.check_destroyed(author.global_time)?;
        let sequence = author
            .sequence
            .ok_or(AuthorizationError::Unsequenced(MessageKind::DynamicSettings))?;
        self.check_sequence(&author.member, MessageKind::DynamicSettings, sequence)?;

        for setting in settings {
            let meta = self
                .catalog
                .get(setting.kind)
                .ok_or(AuthorizationError::UnknownKind(setting.kind))?;
            if usize::from(setting.index) >= meta.resolution.len() {
                return Err(AuthorizationError::InvalidPolicyIndex {
                    kind: setting.kind,
                    index: setting.index,
                }
                .into());
            }
            self.check_permission(
                &author.member,
                setting.kind,
                Permission::Authorize,
                author.global_time,
            )?;
        }

        for setting in settings {
            let records = self
                .policies
                .entry((setting.kind, setting.policy_type))
                .or_default();
            records.push(PolicyRecord {
                effective: author.global_time.saturating_add(1),
                sequence,
                member: author.member,
                index: setting.index,
            });
            records.sort_by_key(|record| (record.effective, record.sequence, record.member));
        }
        self.sequences
            .insert((author.member, MessageKind::DynamicSettings), sequence);
        Ok(())
    }

    /// Active resolution policy of `kind` at `global_time`.
    pub fn resolve_policy(
        &self,
        kind: MessageKind,
        policy_type: PolicyType,
        global_time: GlobalTime,
    ) -> ResolutionPolicy {
        let Some(meta) = self.catalog.get(kind) else {
            return ResolutionPolicy::Public;
        };
        let index = self
            .policies
            .get(&(kind, policy_type))
            .and_then(|records| {
                records
                    .iter()
                    .rev()
                    .find(|record| record.effective <= global_time)
            })
            .map_or(0, |record| usize::from(record.index));
        meta.resolution
            .get(index)
            .copied()
            .unwrap_or_else(|| meta.default_resolution())
    }

    /// Accept a destroy-community message. Later messages are rejected from here on.
    pub fn destroy(
        &mut self,
        member: &MemberId,
        global_time: GlobalTime,
        degree: DestroyDegree,
    ) -> Result<(), AuthorizationError> {
        self.check_message(member, MessageKind::DestroyCommunity, global_time)?;
        let earliest = match self.destroyed_at {
            Some((at, _)) if at <= global_time => return Ok(()),
            _ => (global_time, degree),
        };
        tracing::info!(
            member = %member,
            global_time,
            degree = ?degree,
            "community destroyed"
        );
        self.destroyed_at = Some(earliest);
        Ok(())
    }

    /// Authorize records connecting `member` to the root for `permission` on `kind` at
    /// `global_time`, leaf first and without duplicates. `None` when the bit is not held; empty
    /// for the root itself.
    pub fn proof_chain(
        &self,
        member: &MemberId,
        kind: MessageKind,
        permission: Permission,
        global_time: GlobalTime,
    ) -> Option<Vec<MessageRef>> {
        let mut decisions = self.decisions.lock();
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut query = (*member, permission, global_time);
        while query.0 != self.root {
            let record = self.deciding_record(kind, query, &mut decisions)?;
            if record.revoke {
                return None;
            }
            if seen.insert(record.reference()) {
                chain.push(record.reference());
            }
            query = (record.issuer, Permission::Authorize, record.global_time);
        }
        Some(chain)
    }

    /// Number of cached permission decisions.
    pub fn cached_decisions(&self) -> usize {
        self.decisions.lock().len()
    }

    fn holds(
        &self,
        member: &MemberId,
        kind: MessageKind,
        permission: Permission,
        global_time: GlobalTime,
    ) -> bool {
        if *member == self.root {
            return true;
        }
        let mut decisions = self.decisions.lock();
        self.deciding_record(kind, (*member, permission, global_time), &mut decisions)
            .is_some_and(|record| !record.revoke)
    }

    fn records(
        &self,
        member: &MemberId,
        kind: MessageKind,
        permission: Permission,
    ) -> &[GrantRecord] {
        self.grants
            .get(&(*member, kind, permission))
            .map_or(&[][..], Vec::as_slice)
    }

    /// Last in-force record for `query` whose issuer was entitled to write it.
    fn deciding_record(
        &self,
        kind: MessageKind,
        query: Query,
        decisions: &mut Decisions,
    ) -> Option<&GrantRecord> {
        let index = self.decide(kind, query, decisions)?;
        self.records(&query.0, kind, query.1).get(index)
    }

    /// Whether the decision for `query` leaves the bit held. The root always holds.
    fn grants_bit(&self, kind: MessageKind, query: Query, decision: Decision) -> bool {
        query.0 == self.root
            || decision
                .and_then(|index| self.records(&query.0, kind, query.1).get(index))
                .is_some_and(|record| !record.revoke)
    }

    /// One past the last record for `query` authored strictly before its global time.
    fn in_force(&self, kind: MessageKind, query: Query) -> usize {
        let (member, permission, global_time) = query;
        self.records(&member, kind, permission)
            .partition_point(|record| record.global_time < global_time)
    }

    /// Resolve `query` depth-first without recursion. Every issuer query sits at a strictly lower
    /// global time than the record it entitles, so the stack always drains.
    fn decide(&self, kind: MessageKind, query: Query, decisions: &mut Decisions) -> Decision {
        if let Some(decision) = decisions.get(kind, query) {
            return decision;
        }
        let mut stack = vec![Pending {
            query,
            cursor: self.in_force(kind, query),
        }];
        while let Some(top) = stack.last_mut() {
            let records = self.records(&top.query.0, kind, top.query.1);
            let mut unresolved = None;
            let mut decision = None;
            while top.cursor > 0 {
                let issuer = records[top.cursor - 1].issuer_query();
                let entitled = if issuer.0 == self.root {
                    Some(true)
                } else {
                    decisions
                        .get(kind, issuer)
                        .map(|found| self.grants_bit(kind, issuer, found))
                };
                match entitled {
                    Some(true) => {
                        decision = Some(top.cursor - 1);
                        break;
                    }
                    Some(false) => top.cursor -= 1,
                    None => {
                        unresolved = Some(issuer);
                        break;
                    }
                }
            }
            if let Some(issuer) = unresolved {
                let cursor = self.in_force(kind, issuer);
                stack.push(Pending {
                    query: issuer,
                    cursor,
                });
                continue;
            }
            let resolved = top.query;
            decisions.insert(kind, resolved, decision);
            stack.pop();
        }
        decisions.get(kind, query).flatten()
    }
}
