//! Kurator Common Library
//!
//! Shared infrastructure for the kurator workspace members. Currently this
//! is the logging setup every binary goes through; anything else that more
//! than one crate needs ends up here.

pub mod logging;
