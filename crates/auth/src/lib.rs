//! `kejani-auth` — pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it signs and
//! verifies bearer tokens and evaluates role membership, nothing else.

pub mod roles;
pub mod token;

pub use roles::RoleSet;
pub use token::{Claims, TokenCodec, TokenError};
