//! Command layer for the CDM mapper.

#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod logging;
pub mod summary;
pub mod types;
