//! Domain types for the property game ledger.
//!
//! This module provides:
//! - Primitives: UnixSecs, Wallet, TxSignature
//! - The Action fact type and its kinds
//! - Derived aggregates (player stats, ownership rows)
//! - The static property catalog
//! - The raw transaction envelope fetched from the chain

pub mod action;
pub mod aggregate;
pub mod catalog;
pub mod primitives;
pub mod transaction;

pub use action::{Action, ActionKind};
pub use aggregate::{
    LeaderboardEntry, LeaderboardStats, LeaderboardType, OwnershipRow, PlayerAggregate,
    PlayerRanks, PropertyStats,
};
pub use catalog::{Catalog, CatalogError, Property, PropertySet};
pub use primitives::{TxSignature, UnixSecs, Wallet};
pub use transaction::RawTransaction;
