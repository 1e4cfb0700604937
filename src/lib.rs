//! Cmdgate command protocol library.
//!
//! Exposes the protocol core, the built-in command set and the host
//! adapters for the binary and for integration testing.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod rpc;

mod error;

pub use error::{Error, Result};
