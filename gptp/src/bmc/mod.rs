//! Best master clock algorithm
//!
//! Every port keeps the best grandmaster information it received
//! ([`ReceivedInfo`]). The domain collects these and decides the role of all
//! of its ports at once ([`bmca::decide`]).

pub(crate) mod bmca;
pub(crate) mod dataset_comparison;
pub(crate) mod foreign_master;

pub use dataset_comparison::{PriorityVector, SystemIdentity};
pub use foreign_master::AnnounceDataset;
pub(crate) use foreign_master::ReceivedInfo;
