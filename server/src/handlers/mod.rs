//! HTTP request handlers.

mod health;
mod tools;

pub use health::*;
pub use tools::*;
