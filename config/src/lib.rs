//! Configuration loading and shared configuration types for the session exporter.

mod load;

pub mod environment;
pub mod shared;

pub use load::*;
