//! Weft Testing Infrastructure
//!
//! In-memory collaborators and builders shared by the integration tests of every Weft crate:
//! a `MessageStore`, deterministic `CryptoEffects`, a SHA-1 bloom filter, and a factory that
//! produces signed packets.
//!
//! ```toml
//! [dev-dependencies]
//! weft-testkit = { path = "../weft-testkit" }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

pub mod bloom;
pub mod builders;
pub mod crypto;
pub mod store;

pub use bloom::Sha1Bloom;
pub use builders::{member_key, stored, test_catalog, MessageFactory, FEED, PRESENCE, TEXT};
pub use crypto::DeterministicCrypto;
pub use store::MemoryStore;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Seeded RNG for reproducible walker and window tests.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Install a `tracing` fmt subscriber writing through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
