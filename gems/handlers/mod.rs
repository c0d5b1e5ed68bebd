pub mod artisans;
pub mod assistant;
pub mod auth;
pub mod content;
pub mod events;
pub mod health;
pub mod products;
pub mod users;
