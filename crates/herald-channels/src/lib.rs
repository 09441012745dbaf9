//! # herald-channels
//!
//! Messaging transport integrations for Herald.

pub mod whatsapp;
