//! Purchase order approval workflow engine.
//!
//! This crate implements the purchase order lifecycle: a multi-tier review
//! state machine (employee → assistant manager → manager, with optional
//! finance / general-manager / procurement routing), transactional
//! persistence of orders and their line items, an append-only audit trail,
//! and best-effort push notification fan-out on every transition.
//!
//! The crate is transport-agnostic. Callers invoke workflow operations with
//! a verified [`auth::Actor`] and receive either the updated purchase order
//! aggregate or a typed [`errors::ServiceError`].
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod external;
pub mod logging;
pub mod migrator;
pub mod services;

pub use auth::{Actor, UserRole};
pub use errors::ServiceError;
