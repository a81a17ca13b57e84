//! Core types and shared logic for Bloom.
//!
//! This crate holds what the server and the CLI share:
//! - Application configuration
//! - The OAuth token cipher and PKCE helpers
//! - Provider identifiers
//! - Pure view-model shaping (captions, calendars, boxplots)
//! - Storage object naming

pub mod cipher;
pub mod config;
pub mod error;
pub mod naming;
pub mod pkce;
pub mod provider;
pub mod summary;

pub use cipher::{CipherError, EncryptionKey, TokenCipher};
pub use error::{Error, Result};
pub use pkce::PkceChallenge;
pub use provider::OAuthProvider;
pub use summary::BoxplotStats;
