//! General datastructures as defined by IEEE 802.1AS
//!
//! Messages are kept as structured records. Encoding them for a particular
//! transport is left to the user of the library.

pub mod common;
pub mod messages;
