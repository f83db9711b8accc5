//! Embedded static HTML served by the viewer page.
//!
//! Kept as `&'static str` so it ships inside the binary without filesystem
//! lookups.

pub mod index;
