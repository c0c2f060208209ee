#![forbid(unsafe_code)]

//! Shared vocabulary for the xades workspace: the error type, algorithm
//! identifiers and XML namespace/element names.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Result};
