//! Cryptography utilities for Ldapgate

pub mod hash;

pub use hash::*;
