//! Shared decern-gate data models consumed by the core library and client crates.

pub mod diff;
pub mod reference;
pub mod revision;

pub use diff::*;
pub use reference::*;
pub use revision::*;
