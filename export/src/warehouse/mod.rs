mod base;
pub mod bigquery;
pub mod memory;
pub mod naming;

pub use base::*;
