//! # Undo Ledger
//!
//! Retraction without deletion. Targets stay in the store with an undone flag; the ledger keeps
//! every undo record so later proofs and resynchronization can still see both sides.
//!
//! - At most one undo-own per target, signed by the target's author.
//! - Any number of undo-others, each needing the undo bit on the target kind at its own global time.
//! - Sequence ordering is checked before content, so a redelivered undo is ignored rather than
//!   reported as a conflicting retraction.

use crate::errors::{AcceptanceError, AuthorizationError, UndoViolation};
use crate::timeline::{Authorship, Timeline};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use weft_core::{MessageKind, MessageRef, Permission};

/// Message being retracted, as looked up in the store by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoTarget {
    pub reference: MessageRef,
    pub kind: MessageKind,
}

/// One accepted undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoRecord {
    pub undo: MessageRef,
    pub target: MessageRef,
    /// `true` for undo-own, `false` for undo-other.
    pub own: bool,
}

/// Accepted undo records, indexed by target.
#[derive(Debug, Clone, Default)]
pub struct UndoLedger {
    by_target: HashMap<MessageRef, Vec<UndoRecord>>,
    own: HashMap<MessageRef, MessageRef>,
}

impl UndoLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept an undo-own signed by `author` against `target`.
    pub fn undo_own(
        &mut self,
        timeline: &mut Timeline,
        author: Authorship,
        target: UndoTarget,
    ) -> Result<UndoRecord, AcceptanceError> {
        let sequence = Self::sequence_of(author, MessageKind::UndoOwn)?;
        timeline.check_sequence(&author.member, MessageKind::UndoOwn, sequence)?;
        timeline.check_destroyed(author.global_time)?;

        if target.reference.member != author.member {
            return Err(UndoViolation::NotOwner {
                undoer: author.member,
                target: target.reference,
            }
            .into());
        }
        self.check_undoable(timeline, target.kind)?;
        if let Some(existing) = self.own.get(&target.reference) {
            return Err(UndoViolation::Duplicate {
                target: target.reference,
                existing: *existing,
            }
            .into());
        }

        timeline.accept_sequence(&author.member, MessageKind::UndoOwn, sequence)?;
        let record = UndoRecord {
            undo: author.reference(),
            target: target.reference,
            own: true,
        };
        self.own.insert(target.reference, record.undo);
        self.push(record);
        Ok(record)
    }

    /// Accept an undo-other signed by `author` against `target`.
    pub fn undo_other(
        &mut self,
        timeline: &mut Timeline,
        author: Authorship,
        target: UndoTarget,
    ) -> Result<UndoRecord, AcceptanceError> {
        let sequence = Self::sequence_of(author, MessageKind::UndoOther)?;
        timeline.check_sequence(&author.member, MessageKind::UndoOther, sequence)?;
        timeline.check_destroyed(author.global_time)?;

        self.check_undoable(timeline, target.kind)?;
        timeline.check_permission(
            &author.member,
            target.kind,
            Permission::Undo,
            author.global_time,
        )?;

        timeline.accept_sequence(&author.member, MessageKind::UndoOther, sequence)?;
        let record = UndoRecord {
            undo: author.reference(),
            target: target.reference,
            own: false,
        };
        self.push(record);
        Ok(record)
    }

    pub fn is_undone(&self, target: &MessageRef) -> bool {
        self.by_target.contains_key(target)
    }

    /// Every undo record against `target`, in acceptance order.
    pub fn undos_of(&self, target: &MessageRef) -> &[UndoRecord] {
        self.by_target.get(target).map_or(&[], Vec::as_slice)
    }

    fn push(&mut self, record: UndoRecord) {
        tracing::debug!(
            undo = %record.undo,
            target = %record.target,
            own = record.own,
            "undo accepted"
        );
        self.by_target.entry(record.target).or_default().push(record);
    }

    fn check_undoable(&self, timeline: &Timeline, kind: MessageKind) -> Result<(), UndoViolation> {
        if timeline.catalog().is_undoable(kind) {
            Ok(())
        } else {
            Err(UndoViolation::NotUndoable(kind))
        }
    }

    fn sequence_of(author: Authorship, kind: MessageKind) -> Result<u32, AuthorizationError> {
        author.sequence.ok_or(AuthorizationError::Unsequenced(kind))
    }
}
