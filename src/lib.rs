#![forbid(unsafe_code)]

//! Library backing the tubescribe binaries: a sequential channel transcript
//! scraper with flat-file persistence and a polling job controller.
//!
//! The heavy lifting (channel enumeration, caption retrieval) is delegated to
//! external services behind the traits in [`sources`]; everything else is
//! plain iteration and file IO.

pub mod config;
pub mod job;
pub mod pipeline;
pub mod sanitize;
pub mod security;
pub mod sources;
pub mod store;
