mod date;
mod record_type;
mod rows;
mod session;

pub use date::*;
pub use record_type::*;
pub use rows::*;
pub use session::*;
