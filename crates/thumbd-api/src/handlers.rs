//! Request handlers.

pub mod health;
pub mod thumbnail;

pub use health::*;
pub use thumbnail::*;
