//! Veil node library
//!
//! Configuration and the inspection helpers used by the `veil-node` binary.

pub mod config;
pub mod inspect;
