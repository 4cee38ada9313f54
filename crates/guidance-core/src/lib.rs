//! # guidance-core
//!
//! Foundation shared by the guidance crates.
//!
//! - **Logging**: `tracing` subscriber setup for binaries embedding the engine
//! - **Test capture**: an in-memory layer for asserting on emitted events

#![deny(unsafe_code)]

pub mod logging;
