mod cli;
mod ops;

pub use cli::client;
