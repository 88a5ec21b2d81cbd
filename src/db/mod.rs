//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization and schema
//! - SQLite pragma configuration
//! - Repository layer over the action log and derived tables

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{LastActionTimes, Repository};
