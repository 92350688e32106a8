pub mod core;
mod front;

pub use crate::core::daemon;
pub use crate::front::client;
