//! Common data structures that are used throughout the protocol

mod clock_identity;
mod clock_quality;
mod port_identity;

pub use clock_identity::ClockIdentity;
pub use clock_quality::ClockQuality;
pub use port_identity::PortIdentity;
