//! modweave host library
//!
//! This module exports the building blocks of the host binary for testing purposes.

pub mod bootstrap;
pub mod config;
