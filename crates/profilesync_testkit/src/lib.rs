//! # profilesync testkit
//!
//! Test utilities for profilesync.
//!
//! This crate provides:
//! - A primary/remote pair of file-backed SQLite stores in a temp directory
//! - Changelog triggers standing in for the primary's write path
//! - Fault injection for stores and connectors
//! - Property-based generators for profiles
//!
//! ## Usage
//!
//! ```rust,ignore
//! use profilesync_testkit::prelude::*;
//!
//! #[test]
//! fn local_insert_reaches_remote() {
//!     let pair = TestPair::new();
//!     let mut primary = pair.open_primary();
//!     insert_profile(&mut primary, &sample_profile("p1", 0)).unwrap();
//!     let report = pair.orchestrator().run_cycle();
//!     assert_eq!(report.pushed, 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use profilesync_engine::profiles::{
        count_profiles, delete_profile, find_profile, insert_profile, load_profiles,
        update_profile,
    };
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
