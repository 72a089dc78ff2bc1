mod base;
pub mod memory;
pub mod paths;
pub mod s3;

pub use base::*;
