pub mod repository;
pub mod store;
pub mod types;
