pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod server;
pub mod service;
pub mod utils;

pub use config::Config;
pub use error::{AppError, InitError, StoreError};
