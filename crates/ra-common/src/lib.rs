//! Role Access Common
//!
//! Infrastructure shared by the Role Access crates and binaries.

pub mod logging;

pub use logging::{init_default_logging, init_logging};
