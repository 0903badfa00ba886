//! Common library for the DealDrop services
//!
//! This crate provides shared functionality used by the `auth` and `api`
//! services: configuration, logging, PostgreSQL connectivity, the cache
//! abstraction, session and lockout tracking, rate limiting, the audit
//! trail, input validators, password and token helpers, and the HTTP
//! envelope and error types.

pub mod audit;
pub mod auth;
pub mod cache;
pub mod database;
pub mod error;
pub mod http;
pub mod logging;
pub mod password;
pub mod rate_limit;
pub mod session;
pub mod settings;
pub mod token;
pub mod validation;

pub use error::{DatabaseError, DatabaseResult};
