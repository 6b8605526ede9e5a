//! Service Layer
//!
//! Business logic kept out of the HTTP handlers.

mod change_processor;

pub use change_processor::*;
