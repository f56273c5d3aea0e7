//! Tool argument and HTTP response types.

mod requests;
mod responses;

pub use requests::*;
pub use responses::*;
