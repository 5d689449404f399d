//! On-disk pool state for glossa.
//!
//! The storage engine exclusively owns the filesystem tree under the pool
//! root. Every file is published with write-temp-then-rename, directory
//! creation is idempotent, and identical content deduplicates, so any
//! number of independent processes can share one pool.

pub mod layout;
pub mod migrate;
pub mod pool;
pub mod validate;

pub use crate::layout::PoolLayout;
pub use crate::migrate::{migrate_all, migrate_v0_to_v1, MigrateOptions, MigrateOutcome, MigrateReport};
pub use crate::pool::{Pool, SaveReceipt, SaveRequest, SchemaVersion};
pub use crate::validate::{validate_all, validate_function, ValidationReport};
