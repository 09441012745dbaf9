//! # herald-core
//!
//! Core types, traits, configuration, and error handling for Herald.

pub mod config;
pub mod error;
pub mod event;
pub mod job;
pub mod phone;
pub mod template;
pub mod traits;
