//! # Core Module
//!
//! Concurrency primitives shared by every part of the streaming core.
//!
//! ## Key Components
//! - `MtResource`: Thread-safe reference-counted resource with read-write locking

pub mod mt_resource;

pub use mt_resource::MtResource;
