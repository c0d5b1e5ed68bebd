pub mod artisan;
pub mod assistant;
pub mod auth;
pub mod event;
pub mod marketing;
pub mod product;
pub mod user;
