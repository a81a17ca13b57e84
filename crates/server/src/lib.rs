//! Bloom web application server.
//!
//! This crate provides the HTTP surface:
//! - Session cookie authentication against the identity service
//! - Server-rendered phenotype, trait, gene and expression pages
//! - JSON API endpoints, including the GitLab OAuth (PKCE) flow
//! - Signed object downloads for the filesystem storage backend

pub mod analytics;
pub mod auth;
pub mod error;
pub mod gitlab;
pub mod handlers;
pub mod html;
pub mod identity;
pub mod metrics;
pub mod routes;
pub mod state;

pub use auth::{CurrentUser, TraceId};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
