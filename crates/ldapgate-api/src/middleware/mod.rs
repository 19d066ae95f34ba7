//! Request middleware

pub mod auth;

pub use auth::{basic_auth, AuthenticatedUser};
