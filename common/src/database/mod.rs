pub mod manager;
pub mod connection;

pub use manager::ConnectionManager;
pub use connection::{DbPool, create_pool, ping, run_migrations};
