//! Linux daemon for the `gptp` library
//!
//! Every domain of the configuration runs in its own task, on software
//! timestamped UDP sockets. See [`daemon::run`] for the entry point.

pub mod clock;
pub mod config;
pub mod daemon;
pub mod logging;
pub mod nvram;
pub mod stats;
pub mod transport;
pub mod worker;
