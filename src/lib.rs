//! marketdesk library
//!
//! Market price operations with technical indicators, served through a
//! two-tier expiring cache. Exposed as a library for the binary and the
//! integration tests.

pub mod admin;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod indicators;
pub mod logging;
pub mod prices;
