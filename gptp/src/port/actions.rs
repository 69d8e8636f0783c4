use core::iter::Fuse;

use arrayvec::ArrayVec;

use crate::datastructures::{common::PortIdentity, messages::Message};

/// Identification of a message that should be sent out.
///
/// The caller receives this from a [`PortAction::SendEvent`] and should return
/// it with [`Engine::handle_send_timestamp`](`crate::Engine::handle_send_timestamp`)
/// once the transmit timestamp of that message is known.
///
/// This type is non-copy and non-clone on purpose to ensure a single
/// [`handle_send_timestamp`](`crate::Engine::handle_send_timestamp`) per
/// [`SendEvent`](`PortAction::SendEvent`).
#[derive(Debug)]
pub struct TimestampContext {
    pub(super) inner: TimestampContextInner,
}

#[derive(Debug)]
pub(super) enum TimestampContextInner {
    Sync {
        id: u16,
    },
    ReverseSync {
        id: u16,
    },
    PDelayReq {
        id: u16,
    },
    PDelayResp {
        id: u16,
        requestor_identity: PortIdentity,
    },
}

/// The timers of a port
///
/// On expiry, pass the timer to
/// [`Engine::handle_timer`](`crate::Engine::handle_timer`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PortTimer {
    Announce,
    Sync,
    Pdelay,
    AnnounceReceipt,
    SyncReceipt,
    ReverseSync,
}

impl PortTimer {
    /// All timers, in a fixed order
    pub const ALL: [PortTimer; 6] = [
        PortTimer::Announce,
        PortTimer::Sync,
        PortTimer::Pdelay,
        PortTimer::AnnounceReceipt,
        PortTimer::SyncReceipt,
        PortTimer::ReverseSync,
    ];
}

/// An action a port needs the user to perform
#[derive(Debug)]
#[must_use]
#[allow(missing_docs)] // Explaining the fields as well as the variants does not add value
pub enum PortAction {
    /// Send a time-critical message
    ///
    /// Once the message is sent and the transmit timestamp known the user
    /// should return the given [`TimestampContext`] using
    /// [`Engine::handle_send_timestamp`](`crate::Engine::handle_send_timestamp`).
    SendEvent {
        context: TimestampContext,
        message: Message,
    },
    /// Send a general message
    ///
    /// For a message sent this way no timestamp needs to be captured.
    SendGeneral { message: Message },
    /// Expire the [`PortTimer::Announce`] timer in `duration` from now
    ResetAnnounceTimer { duration: core::time::Duration },
    /// Expire the [`PortTimer::Sync`] timer in `duration` from now
    ResetSyncTimer { duration: core::time::Duration },
    /// Expire the [`PortTimer::Pdelay`] timer in `duration` from now
    ResetPdelayTimer { duration: core::time::Duration },
    /// Expire the [`PortTimer::AnnounceReceipt`] timer in `duration` from now
    ResetAnnounceReceiptTimer { duration: core::time::Duration },
    /// Expire the [`PortTimer::SyncReceipt`] timer in `duration` from now
    ResetSyncReceiptTimer { duration: core::time::Duration },
    /// Expire the [`PortTimer::ReverseSync`] timer in `duration` from now
    ResetReverseSyncTimer { duration: core::time::Duration },
}

impl PortAction {
    /// The timer this action resets, and when it should expire
    pub fn timer(&self) -> Option<(PortTimer, core::time::Duration)> {
        match self {
            PortAction::SendEvent { .. } | PortAction::SendGeneral { .. } => None,
            PortAction::ResetAnnounceTimer { duration } => Some((PortTimer::Announce, *duration)),
            PortAction::ResetSyncTimer { duration } => Some((PortTimer::Sync, *duration)),
            PortAction::ResetPdelayTimer { duration } => Some((PortTimer::Pdelay, *duration)),
            PortAction::ResetAnnounceReceiptTimer { duration } => {
                Some((PortTimer::AnnounceReceipt, *duration))
            }
            PortAction::ResetSyncReceiptTimer { duration } => {
                Some((PortTimer::SyncReceipt, *duration))
            }
            PortAction::ResetReverseSyncTimer { duration } => {
                Some((PortTimer::ReverseSync, *duration))
            }
        }
    }
}

const MAX_ACTIONS: usize = 4;

/// An Iterator over [`PortAction`]s
///
/// These are returned by the ports when ever the library needs the user to
/// perform actions to the system.
///
/// **Guarantees to end user:** Any set of actions will only ever contain a
/// single event send
#[derive(Debug)]
#[must_use]
pub struct PortActionIterator {
    internal: Fuse<<ArrayVec<PortAction, MAX_ACTIONS> as IntoIterator>::IntoIter>,
}

impl PortActionIterator {
    /// Get an empty Iterator
    ///
    /// This can for example be used to have a default value in chained `if`
    /// statements.
    pub fn empty() -> Self {
        Self {
            internal: ArrayVec::new().into_iter().fuse(),
        }
    }

    pub(crate) fn from(list: ArrayVec<PortAction, MAX_ACTIONS>) -> Self {
        Self {
            internal: list.into_iter().fuse(),
        }
    }
}

impl Iterator for PortActionIterator {
    type Item = PortAction;

    fn next(&mut self) -> Option<Self::Item> {
        self.internal.next()
    }
}
