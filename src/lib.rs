//! # tiercache
//!
//! A two-tier, frequency-aware key/value cache: a bounded, in-memory
//! "active" tier with per-entry TTL sits in front of an unbounded,
//! file-backed "dormant" tier. An LFU (least-frequently-used) engine moves
//! entries across the tier boundary so the active tier holds the hottest
//! keys, while the dormant tier absorbs overflow and survives process
//! restarts.
//!
//! ## Quick start
//!
//! ```rust
//! use tiercache::{CacheConfig, CacheController};
//! use tempfile::tempdir;
//!
//! let dir = tempdir().unwrap();
//! let config = CacheConfig::default()
//!     .with_capacity(2)
//!     .with_dormant_path(dir.path().join("dormant.json"));
//!
//! let (cache, _events) = CacheController::<String, i32>::initialize(config, None);
//! cache.add("a".to_string(), 1);
//! cache.add("b".to_string(), 2);
//! cache.add("c".to_string(), 3); // active tier is full, "c" overflows to dormant
//!
//! assert_eq!(cache.get(&"c".to_string()), Some(3));
//! cache.dispose();
//! ```
//!
//! ## Modules
//!
//! - [`entry`] — the unit of cached data (`EntryRecord`).
//! - [`key`] — the `CacheKey`/`CacheValue` bounds generic cache instances
//!   are built over.
//! - [`config`] — `CacheConfig`, the plain configuration struct.
//! - [`error`] — internal error taxonomy (`DormantError`) and `CacheEvent`.
//! - [`timer`] — the per-key one-shot `ExpiryTimer`.
//! - [`active`] — the bounded, concurrent active tier (`ActiveTier`).
//! - [`dormant`] — the `DormantStore` trait and its default file-backed
//!   implementation (`FileDormantStore`).
//! - [`lfu`] — the LFU promotion/demotion decision procedure (`LFUEngine`).
//! - [`cleaner`] — the periodic dormant-tier compaction task (`Cleaner`).
//! - [`controller`] — the public facade (`CacheController`).
//! - [`registry`] — an optional process-wide registry of named instances.

pub mod active;
pub mod cleaner;
pub mod config;
pub mod controller;
pub mod dormant;
pub mod entry;
pub mod error;
pub mod key;
pub mod lfu;
pub mod registry;
pub mod timer;

pub use config::CacheConfig;
pub use controller::CacheController;
pub use dormant::{DormantStore, FileDormantStore};
pub use entry::EntryRecord;
pub use error::{CacheEvent, DormantError};
pub use key::{CacheKey, CacheValue};
pub use lfu::LFUEngine;
