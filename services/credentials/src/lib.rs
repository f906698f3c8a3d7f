pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod state;
pub mod sweeper;
pub mod token;
pub mod usecase;
