//! API Module
//!
//! HTTP surface of the cache service.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
