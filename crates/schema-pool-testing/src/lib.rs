//! # schema-pool-testing
//!
//! Test infrastructure for schema-pool.
//!
//! This crate provides an in-memory driver with scripted connect outcomes
//! and controllable connection health, plus fixtures for partition settings
//! and fatal-error recording. No database is required.
//!
//! ## Example
//!
//! ```rust,ignore
//! use schema_pool::Registry;
//! use schema_pool_testing::{MockDriver, RecordingHook, TestPartition};
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_gives_up_after_retries() {
//!     let recorder = RecordingHook::new();
//!     let registry = Registry::builder(MockDriver::builder().always_fail().build())
//!         .on_fatal(recorder.hook())
//!         .build();
//!
//!     assert!(registry.get_connection(&TestPartition::new("sales")).await.is_err());
//!     assert_eq!(registry.driver().connect_count(), 4);
//!     assert_eq!(recorder.count(), 1);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock_driver;

pub use fixtures::{RecordingHook, TestPartition};
pub use mock_driver::{ConnectOutcome, Health, MockConnection, MockDriver, MockDriverBuilder};
