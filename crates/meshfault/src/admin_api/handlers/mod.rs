//! Admin API request handlers.

pub mod faults;
pub mod rules;
pub mod system;
