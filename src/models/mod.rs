//! Data models for console operators.
//!
//! The session core deals in a single person-shaped entity: the
//! administrator operating the console. End users of the dating
//! application never appear here.

pub mod admin;

pub use admin::{Identity, Role};
