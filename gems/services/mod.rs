pub mod artisans;
pub mod assistant;
pub mod auth;
pub mod content;
pub mod events;
pub mod products;
