//! Integration and unit tests for Chocoboard.
//!
//! ## Test Modules
//!
//! - **support**: the in-process app, cookie-keeping client and multipart builder
//! - **config_tests**: configuration loading and validation
//! - **error_tests**: error rendering and conversions
//! - **db_tests**: schema bootstrap and constraints
//! - **health_api_tests**: liveness, readiness, metrics and version endpoints
//! - **auth_api_tests**: registration, login, account lookup, password reset and change
//! - **topic_api_tests**: listing, reading, secret topics, attachments and search
//! - **user_api_tests**: profiles, profile images and account deletion
//!
//! Individual modules can be run with:
//! ```bash
//! cargo test topic_api_tests
//! ```

pub mod support;
pub mod config_tests;
pub mod error_tests;
pub mod db_tests;
