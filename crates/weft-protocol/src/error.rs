//! Rejections raised by the message layer itself, before any engine sees the message.

use weft_core::{
    Disposition, GlobalTime, MemberId, MessageKind, MessageRef, ProtocolErrorCode, WeftError,
};
use weft_wire::{Address, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("no public key known for signer {0}")]
    UnknownSigner(MemberId),

    #[error("signature by {0} does not verify")]
    BadSignature(MemberId),

    #[error("global time {global_time} is beyond the acceptable bound {bound}")]
    FutureGlobalTime {
        global_time: GlobalTime,
        bound: GlobalTime,
    },

    #[error("{0} already stored")]
    AlreadyStored(MessageRef),

    #[error("collections cannot nest")]
    NestedCollection,

    #[error("{0} must be signed by a community member")]
    Unsigned(MessageKind),

    #[error("held packet limit reached for {0}")]
    HoldOverflow(Address),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProtocolErrorCode for DispatchError {
    fn code(&self) -> &'static str {
        match self {
            DispatchError::UnknownSigner(_) => "dispatch_unknown_signer",
            DispatchError::BadSignature(_) => "dispatch_bad_signature",
            DispatchError::FutureGlobalTime { .. } => "dispatch_future_global_time",
            DispatchError::AlreadyStored(_) => "dispatch_already_stored",
            DispatchError::NestedCollection => "dispatch_nested_collection",
            DispatchError::Unsigned(_) => "dispatch_unsigned",
            DispatchError::HoldOverflow(_) => "dispatch_hold_overflow",
            DispatchError::Store(err) => err.code(),
        }
    }

    fn disposition(&self) -> Disposition {
        match self {
            DispatchError::UnknownSigner(_) => Disposition::RequestIdentity,
            DispatchError::AlreadyStored(_) => Disposition::Ignore,
            _ => Disposition::Drop,
        }
    }
}

impl From<DispatchError> for WeftError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::UnknownSigner(_) | DispatchError::BadSignature(_) => {
                WeftError::crypto(err.to_string())
            }
            DispatchError::Store(err) => err.into(),
            _ => WeftError::invalid(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispositions() {
        let member = MemberId::from_seed(3);
        assert_eq!(
            DispatchError::UnknownSigner(member).disposition(),
            Disposition::RequestIdentity
        );
        assert_eq!(
            DispatchError::AlreadyStored(MessageRef::new(member, 4)).disposition(),
            Disposition::Ignore
        );
        assert_eq!(DispatchError::NestedCollection.disposition(), Disposition::Drop);
        assert_eq!(
            DispatchError::HoldOverflow(Address::NULL).disposition(),
            Disposition::Drop
        );
        assert_eq!(
            DispatchError::Store(StoreError::Backend("disk".into())).code(),
            "store_backend"
        );
    }
}
