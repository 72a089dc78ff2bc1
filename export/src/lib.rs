//! Transform-and-load pipeline for vendor session exports.
//!
//! Session files are decomposed into six flat record types, staged as CSV in an object store,
//! and loaded into date-partitioned warehouse tables through short-lived external tables.

pub mod decompose;
pub mod driver;
pub mod encryption;
pub mod error;
pub mod files;
pub mod ledger;
pub mod loader;
mod macros;
pub mod schema;
pub mod store;
pub mod transform;
pub mod types;
pub mod vendor;
pub mod warehouse;
