//! Adapters over the authority lists that keep result-set badges in step.

pub mod blacklist;
pub mod blocked_word;

pub use blacklist::BlacklistSyncGateway;
pub use blocked_word::BlockedWordSyncGateway;
