//! Configuration for the Weft message layer.
//!
//! Every section has a `Default` matching the protocol's stock behaviour; a TOML document only
//! needs to name the values it overrides.
//!
//! ```toml
//! [sync]
//! response_byte_limit = 10240
//!
//! [walker]
//! response_timeout_ms = 30000
//! ```

use crate::errors::{Result, WeftError};
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeftConfig {
    pub wire: WireConfig,
    pub sync: SyncConfig,
    pub walker: WalkerConfig,
    pub resolver: ResolverConfig,
    pub timeline: TimelineConfig,
}

impl WeftConfig {
    /// Parse a TOML document, filling unspecified values with defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: WeftConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engines cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.wire.signature_length == 0 {
            return Err(WeftError::invalid("wire.signature_length must be positive"));
        }
        if self.walker.response_timeout_ms == 0 {
            return Err(WeftError::invalid(
                "walker.response_timeout_ms must be positive",
            ));
        }
        if self.resolver.identity_limit == 0 {
            return Err(WeftError::invalid("resolver.identity_limit must be positive"));
        }
        if self.resolver.held_per_source > self.resolver.held_limit {
            return Err(WeftError::invalid(
                "resolver.held_per_source cannot exceed resolver.held_limit",
            ));
        }
        Ok(())
    }
}

/// Codec settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireConfig {
    /// Length of the trailing signature in bytes.
    pub signature_length: usize,
    /// Largest payload accepted or produced.
    pub max_payload: usize,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            signature_length: 64,
            max_payload: u16::MAX as usize,
        }
    }
}

/// Synchronization matcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Bytes this node is willing to send in answer to one sync request.
    pub response_byte_limit: usize,
    /// Kinds at or below this priority are never offered.
    pub min_sync_priority: u8,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            response_byte_limit: 5 * 1024,
            min_sync_priority: 32,
        }
    }
}

/// Walker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    /// How long an outgoing introduction request waits for its response.
    pub response_timeout_ms: u64,
    /// How long a completed exchange is retained to accept the puncture.
    pub cleanup_delay_ms: u64,
    /// How long a candidate stays eligible after it was last heard from.
    pub candidate_lifetime_ms: u64,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 10_500,
            cleanup_delay_ms: 4_500,
            candidate_lifetime_ms: 57_500,
        }
    }
}

/// Resolver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Responder-side byte cap for one missing-sequence answer.
    pub sequence_response_cap: usize,
    /// Identity records returned per missing-identity request.
    pub identity_limit: usize,
    /// How long an outgoing missing-* request suppresses duplicates. Packets held for the
    /// answer are dropped after the same delay.
    pub request_timeout_ms: u64,
    /// Packets held per sending address while their missing data is fetched.
    pub held_per_source: usize,
    /// Packets held in total.
    pub held_limit: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            sequence_response_cap: 64 * 1024,
            identity_limit: 10,
            request_timeout_ms: 10_000,
            held_per_source: 64,
            held_limit: 1024,
        }
    }
}

/// Permission timeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// How far ahead of the local global time an incoming message may claim to be.
    pub acceptable_global_time_margin: u64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            acceptable_global_time_margin: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_defaults() {
        let config = WeftConfig::default();
        assert_eq!(config.wire.signature_length, 64);
        assert_eq!(config.sync.min_sync_priority, 32);
        assert_eq!(config.walker.response_timeout_ms, 10_500);
        assert_eq!(config.walker.cleanup_delay_ms, 4_500);
        assert_eq!(config.resolver.identity_limit, 10);
        assert_eq!(config.resolver.held_per_source, 64);
        assert_eq!(config.resolver.held_limit, 1024);
    }

    #[test]
    fn test_rejects_per_source_hold_above_total() {
        let err = WeftConfig::from_toml_str("[resolver]
held_per_source = 10
held_limit = 5
")
            .unwrap_err();
        assert_matches!(err, WeftError::Invalid { .. });
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = WeftConfig::from_toml_str(
            r#"
            [walker]
            response_timeout_ms = 30000
            "#,
        )
        .unwrap();
        assert_eq!(config.walker.response_timeout_ms, 30_000);
        assert_eq!(config.walker.cleanup_delay_ms, 4_500);
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn test_rejects_zero_signature_length() {
        let err = WeftConfig::from_toml_str("[wire]\nsignature_length = 0\n").unwrap_err();
        assert_matches!(err, WeftError::Invalid { .. });
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(WeftConfig::from_toml_str("[sync\n").is_err());
    }
}
