//! Connection driver and accept loop.

pub mod connection;
pub mod listener;
pub mod stats;
