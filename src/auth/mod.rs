//! Authentication core: credentials, tokens, sessions, and the service that ties them together.
//!
//! Everything here is transport-agnostic; `crate::api` adapts it to HTTP.

pub mod config;
pub mod crypto;
pub mod email;
pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod repo;
pub mod service;
pub mod token;

pub use config::AuthConfig;
pub use error::{AuthError, RepositoryError};
pub use service::{AuthResponse, AuthService, CleanupReport};
pub use token::{TokenClaims, TokenCodec, TokenKind};
