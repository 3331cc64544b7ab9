//! Core building blocks shared by every component: typed identifiers,
//! the store error taxonomy, and runtime configuration.

pub mod config;
pub mod errors;
pub mod ids;
