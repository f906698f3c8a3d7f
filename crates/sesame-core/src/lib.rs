//! Shared plumbing for Sesame services: tracing setup and environment parsing.

pub mod config;
pub mod tracing;
