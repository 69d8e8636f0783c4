//! A sans-IO implementation of the IEEE 802.1AS generalized precision time
//! protocol (gPTP), the time synchronization protocol of Time-Sensitive
//! Networking.
//!
//! # Device interfaces
//! `gptp` does not do any IO itself and works without the standard library.
//! The user provides the clocks, through the [`Clock`] and [`ClockProvider`]
//! traits, and moves messages between the network and the [`Engine`].
//!
//! Every `handle_*` method of the [`Engine`] returns a list of actions. These
//! are messages to send, timers to reset and [`Notification`]s of changes in
//! the state of the engine. Event messages are sent together with a
//! [`TimestampContext`], which has to be handed back with the transmit
//! timestamp of the message.
//!
//! On Linux, the `gptp-linux` crate provides a daemon built on these
//! interfaces.
//!
//! # Structure
//! * An [`Engine`] owns up to [`MAX_DOMAINS`](config::MAX_DOMAINS) domains.
//! * A [`Domain`] owns its ports and the clock it steers. It runs the best
//!   master clock algorithm and feeds offsets into a [`PiServo`].
//! * Every port measures the delay to its link peer and, depending on its
//!   role, sends or receives time.

#![no_std]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

mod bmc;
mod clock;
pub mod config;
pub(crate) mod datastructures;
mod domain;
mod engine;
pub mod lifecycle;
pub mod observability;
mod overlay_clock;
pub(crate) mod port;
pub mod servo;
pub mod time;

pub use bmc::{AnnounceDataset, PriorityVector, SystemIdentity};
pub use clock::{Clock, ClockProvider};
pub use datastructures::{
    common::{ClockIdentity, ClockQuality, PortIdentity},
    messages::{
        AnnounceMessage, FollowUpMessage, Header, Message, MessageBody, MessageType,
        PDelayReqMessage, PDelayRespFollowUpMessage, PDelayRespMessage, SyncMessage,
    },
};
pub use domain::{Domain, DomainAction, Notification, OPERATIONAL_LOCK_SAMPLES};
pub use engine::{Engine, EngineAction, EngineError, PathDelaySeeds};
pub use overlay_clock::OverlayClock;
pub use port::{PortAction, PortActionIterator, PortTimer, TimestampContext};
pub use servo::PiServo;
