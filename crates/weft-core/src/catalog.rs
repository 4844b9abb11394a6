//! Per-community message catalog.
//!
//! The catalog records, for every kind a community understands, how it is synchronized and which
//! resolution policies it may switch between. Built-in kinds are always present; communities
//! register their application kinds on top.

use crate::errors::{Result, WeftError};
use crate::kind::MessageKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default sync priority of built-in and application kinds.
pub const DEFAULT_PRIORITY: u8 = 128;

/// Global-time order in which a kind is offered during sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SyncDirection {
    #[default]
    Ascending,
    Descending,
}

/// Who may author messages of a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionPolicy {
    /// Any member.
    Public,
    /// Members holding the permit bit, proven by an authorize chain.
    Linear,
}

/// Policy families addressable by dynamic-settings records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyType {
    Resolution,
}

impl PolicyType {
    pub fn tag(self) -> u8 {
        match self {
            PolicyType::Resolution => 0x72,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x72 => Some(PolicyType::Resolution),
            _ => None,
        }
    }
}

/// Catalog entry for one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMeta {
    pub kind: MessageKind,
    pub name: String,
    /// Higher priorities are offered first during sync.
    pub priority: u8,
    pub direction: SyncDirection,
    pub undoable: bool,
    pub sequenced: bool,
    /// Ordered resolution variants; index 0 is the compiled-in default.
    pub resolution: Vec<ResolutionPolicy>,
}

impl MessageMeta {
    /// Application kind with default priority, ascending sync, undoable, unsequenced and
    /// `Linear` resolution.
    pub fn application(tag: u8, name: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Application(tag),
            name: name.into(),
            priority: DEFAULT_PRIORITY,
            direction: SyncDirection::Ascending,
            undoable: true,
            sequenced: false,
            resolution: vec![ResolutionPolicy::Linear],
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_direction(mut self, direction: SyncDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_sequence(mut self) -> Self {
        self.sequenced = true;
        self
    }

    pub fn with_undoable(mut self, undoable: bool) -> Self {
        self.undoable = undoable;
        self
    }

    pub fn with_resolution(mut self, variants: Vec<ResolutionPolicy>) -> Self {
        self.resolution = variants;
        self
    }

    /// Compiled-in resolution policy.
    pub fn default_resolution(&self) -> ResolutionPolicy {
        self.resolution
            .first()
            .copied()
            .unwrap_or(ResolutionPolicy::Public)
    }

    fn builtin(kind: MessageKind) -> Self {
        let priority = match kind {
            MessageKind::Identity => 16,
            MessageKind::DestroyCommunity => 192,
            MessageKind::DynamicSettings => 191,
            _ => DEFAULT_PRIORITY,
        };
        Self {
            kind,
            name: kind.name().to_string(),
            priority,
            direction: SyncDirection::Ascending,
            undoable: false,
            sequenced: kind.is_sequenced_builtin(),
            resolution: vec![ResolutionPolicy::Public],
        }
    }
}

/// Kinds known to one community.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCatalog {
    entries: BTreeMap<MessageKind, MessageMeta>,
}

impl MessageCatalog {
    /// Catalog containing only the built-in kinds.
    pub fn with_builtins() -> Self {
        let entries = MessageKind::BUILTIN
            .into_iter()
            .map(|kind| (kind, MessageMeta::builtin(kind)))
            .collect();
        Self { entries }
    }

    /// Register an application kind.
    pub fn register(&mut self, meta: MessageMeta) -> Result<()> {
        if !meta.kind.is_application() {
            return Err(WeftError::invalid(format!(
                "{} is a built-in kind",
                meta.kind
            )));
        }
        if meta.resolution.is_empty() {
            return Err(WeftError::invalid(format!(
                "{} declares no resolution policy",
                meta.name
            )));
        }
        if self.entries.contains_key(&meta.kind) {
            return Err(WeftError::invalid(format!(
                "{} is already registered",
                meta.kind
            )));
        }
        self.entries.insert(meta.kind, meta);
        Ok(())
    }

    /// Builder form of [`MessageCatalog::register`].
    pub fn with(mut self, meta: MessageMeta) -> Result<Self> {
        self.register(meta)?;
        Ok(self)
    }

    pub fn get(&self, kind: MessageKind) -> Option<&MessageMeta> {
        self.entries.get(&kind)
    }

    pub fn contains(&self, kind: MessageKind) -> bool {
        self.entries.contains_key(&kind)
    }

    /// Whether messages of `kind` carry a sequence number on the wire.
    pub fn is_sequenced(&self, kind: MessageKind) -> bool {
        self.entries
            .get(&kind)
            .map_or(kind.is_sequenced_builtin(), |meta| meta.sequenced)
    }

    pub fn is_undoable(&self, kind: MessageKind) -> bool {
        self.entries.get(&kind).is_some_and(|meta| meta.undoable)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageMeta> {
        self.entries.values()
    }
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self::with_builtins()
    }
}
