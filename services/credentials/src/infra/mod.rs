pub mod cache;
pub mod db;
pub mod durable;
pub mod ephemeral;
pub mod hybrid;
