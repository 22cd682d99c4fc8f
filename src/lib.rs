pub mod analyzers;
pub mod cache;
pub mod clean;
pub mod config;
pub mod convert;
pub mod error;
pub mod loader;
pub mod output;
pub mod server;
pub mod service;
pub mod table;

pub use error::{DataError, Result};
