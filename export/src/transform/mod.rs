mod stage;
mod writer;

pub use stage::*;
pub use writer::*;
