mod exporter;
mod gcp;
mod store;
mod transform;
mod vendor;
mod warehouse;

pub use exporter::*;
pub use gcp::*;
pub use store::*;
pub use transform::*;
pub use vendor::*;
pub use warehouse::*;
