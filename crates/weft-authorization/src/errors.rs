//! Rejection reasons of the permission timeline and undo ledger.

use weft_core::{
    Disposition, GlobalTime, MemberId, MessageKind, MessageRef, Permission, ProtocolErrorCode,
    WeftError,
};

/// Signer lacks a permission, or the community no longer accepts the message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    #[error("{member} lacks {permission} on {kind} at global time {global_time}")]
    MissingPermission {
        member: MemberId,
        kind: MessageKind,
        permission: Permission,
        global_time: GlobalTime,
    },

    #[error("community destroyed at global time {destroyed_at}, message claims {global_time}")]
    Destroyed {
        destroyed_at: GlobalTime,
        global_time: GlobalTime,
    },

    #[error("{kind} has no policy variant {index}")]
    InvalidPolicyIndex { kind: MessageKind, index: u8 },

    #[error("{0} is not in the catalog")]
    UnknownKind(MessageKind),

    #[error("{0} must carry a sequence number")]
    Unsequenced(MessageKind),
}

impl ProtocolErrorCode for AuthorizationError {
    fn code(&self) -> &'static str {
        match self {
            AuthorizationError::MissingPermission { .. } => "authorization_missing_permission",
            AuthorizationError::Destroyed { .. } => "authorization_destroyed",
            AuthorizationError::InvalidPolicyIndex { .. } => "authorization_invalid_policy",
            AuthorizationError::UnknownKind(_) => "authorization_unknown_kind",
            AuthorizationError::Unsequenced(_) => "authorization_unsequenced",
        }
    }

    fn disposition(&self) -> Disposition {
        match self {
            AuthorizationError::MissingPermission { .. } => Disposition::RequestProof,
            _ => Disposition::Drop,
        }
    }
}

impl From<AuthorizationError> for WeftError {
    fn from(err: AuthorizationError) -> Self {
        WeftError::authorization(err.to_string())
    }
}

/// Sequence number out of order for `(member, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    /// Sequences `low..=high` have not been seen yet.
    #[error("{member} {kind}: missing sequences {low}..={high}")]
    Gap {
        member: MemberId,
        kind: MessageKind,
        low: u32,
        high: u32,
    },

    /// Sequence at or below the accepted floor.
    #[error("{member} {kind}: sequence {sequence} already covered by {floor}")]
    Duplicate {
        member: MemberId,
        kind: MessageKind,
        sequence: u32,
        floor: u32,
    },
}

impl ProtocolErrorCode for SequenceError {
    fn code(&self) -> &'static str {
        match self {
            SequenceError::Gap { .. } => "sequence_gap",
            SequenceError::Duplicate { .. } => "sequence_duplicate",
        }
    }

    fn disposition(&self) -> Disposition {
        match self {
            SequenceError::Gap { .. } => Disposition::RequestSequence,
            SequenceError::Duplicate { .. } => Disposition::Ignore,
        }
    }
}

impl From<SequenceError> for WeftError {
    fn from(err: SequenceError) -> Self {
        match err {
            SequenceError::Gap { .. } => WeftError::sequence_gap(err.to_string()),
            SequenceError::Duplicate { .. } => WeftError::sequence_duplicate(err.to_string()),
        }
    }
}

/// Rejected undo. No state changes when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UndoViolation {
    #[error("{target} already undone by {existing}")]
    Duplicate {
        target: MessageRef,
        existing: MessageRef,
    },

    #[error("{undoer} cannot undo-own {target}, which it did not sign")]
    NotOwner { undoer: MemberId, target: MessageRef },

    #[error("{0} is not undoable")]
    NotUndoable(MessageKind),

    #[error("undo target {0} is not in the store")]
    TargetUnknown(MessageRef),
}

impl ProtocolErrorCode for UndoViolation {
    fn code(&self) -> &'static str {
        match self {
            UndoViolation::Duplicate { .. } => "undo_duplicate",
            UndoViolation::NotOwner { .. } => "undo_not_owner",
            UndoViolation::NotUndoable(_) => "undo_not_undoable",
            UndoViolation::TargetUnknown(_) => "undo_target_unknown",
        }
    }

    fn disposition(&self) -> Disposition {
        match self {
            UndoViolation::TargetUnknown(_) => Disposition::RequestMessage,
            _ => Disposition::Drop,
        }
    }
}

impl From<UndoViolation> for WeftError {
    fn from(err: UndoViolation) -> Self {
        WeftError::undo(err.to_string())
    }
}

/// Any reason an authored message is not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcceptanceError {
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error(transparent)]
    Undo(#[from] UndoViolation),
}

impl ProtocolErrorCode for AcceptanceError {
    fn code(&self) -> &'static str {
        match self {
            AcceptanceError::Authorization(err) => err.code(),
            AcceptanceError::Sequence(err) => err.code(),
            AcceptanceError::Undo(err) => err.code(),
        }
    }

    fn disposition(&self) -> Disposition {
        match self {
            AcceptanceError::Authorization(err) => err.disposition(),
            AcceptanceError::Sequence(err) => err.disposition(),
            AcceptanceError::Undo(err) => err.disposition(),
        }
    }
}

impl From<AcceptanceError> for WeftError {
    fn from(err: AcceptanceError) -> Self {
        match err {
            AcceptanceError::Authorization(err) => err.into(),
            AcceptanceError::Sequence(err) => err.into(),
            AcceptanceError::Undo(err) => err.into(),
        }
    }
}
