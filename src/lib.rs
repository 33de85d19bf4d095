//! # Chocoboard
//!
//! A small community bulletin board: topics with one optional attachment,
//! secret topics readable only with their key, user accounts with profile
//! images, password reset through a mailed one-time code, and search.
//!
//! ## Architecture
//!
//! - **Axum** serves server-rendered pages (askama templates)
//! - **SQLx** talks to SQLite with plain parameterized SQL
//! - **Tokio** runs the server and the background cleanup tasks
//!
//! ## Core Components
//!
//! - [`config`]: layered configuration (embedded defaults, files, environment)
//! - [`db`]: schema bootstrap
//! - [`error`]: the application error type and its HTTP rendering
//! - [`session`]: server-side sessions, flash messages and login extractors
//! - [`password`]: Argon2 hashing, verification codes, temporary passwords
//! - [`uploads`]: upload allow-lists, content checks and the upload directory
//! - [`mail`]: pluggable transports for reset codes
//! - [`pagination`]: page arithmetic for the listing
//! - [`routes`]: page handlers and the router
//! - [`middleware`]: security headers, rate limiting, request validation
//! - [`metrics`]: activity counters
//! - [`state`]: shared application state
//! - [`templates`]: page templates
//! - [`types`]: database rows and form payloads

pub mod config;
pub mod db;
pub mod error;
pub mod mail;
pub mod metrics;
pub mod middleware;
pub mod pagination;
pub mod password;
pub mod routes;
pub mod session;
pub mod state;
pub mod templates;
pub mod types;
pub mod uploads;

#[cfg(test)]
mod tests;
