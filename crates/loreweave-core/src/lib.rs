//! Loreweave Core — shared domain abstractions.
//!
//! This crate defines the fundamental types and traits that the sync engine
//! is built on: the syncable entity model, per-campaign integration state,
//! the external document wire model, the error type, and the repository and
//! client abstractions. It contains no infrastructure code.

pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod external;
pub mod integration;
pub mod notify;
pub mod queue;
pub mod repository;
pub mod scope;
