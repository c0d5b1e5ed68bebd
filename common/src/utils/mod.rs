pub mod error;
pub mod modal;
pub mod config;

pub use config::Config;
pub use error::{Result, ApiError};
