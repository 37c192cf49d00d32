//! # eawatch Common Library
//!
//! Shared code for the eawatch environmental monitoring services:
//! - Error types used across clients, stores and the pipeline
//! - Great-circle geometry helpers

pub mod error;
pub mod geo;

pub use error::{Error, Result};
