//! Ferry Server Library
//!
//! Control plane in front of a session-authenticated messaging platform.
//! The server binary is in main.rs; the library is exposed for tests.
//!
//! # Modules
//!
//! - `auth`: interactive login handshake state machine
//! - `supervisor`: the single shared platform connection
//! - `transfer`: upload/download relay through local staging
//! - `platform`: client trait and the local filesystem backend
//! - `routes`: HTTP surface

pub mod auth;
pub mod config;
pub mod error;
pub mod html;
pub mod platform;
pub mod routes;
pub mod session;
pub mod state;
pub mod supervisor;
pub mod transfer;

pub use config::Config;
pub use error::{GatewayError, Result};
pub use state::AppState;
