use crate::config::QueueOptions;
use crate::message::Message;

/// Why a message is being written to queue storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreCase {
    /// First enqueue.
    New,
    /// Returned by a consumer, bookkeeping updated.
    Requeue,
    /// Returned by a consumer, bookkeeping untouched.
    RequeueSilent,
}

/// Shared ephemeral-storage policy embedded in every reliability-offering
/// adapter.
///
/// Centralizes the enqueue dispatch: when ephemeral storage is disabled
/// there is nothing to move a requeued message *out of*, so every store
/// follows the new-message path. Bookkeeping updates are independent of
/// that dispatch and always apply.
#[derive(Debug, Clone, Copy)]
pub struct EphemeralPolicy {
    disabled: bool,
    max_size: Option<u64>,
}

impl EphemeralPolicy {
    pub fn new(options: &QueueOptions) -> Self {
        Self {
            disabled: options.ephemeral_disabled,
            max_size: options.ephemeral_max_size,
        }
    }

    /// Whether ephemeral storage is maintained at all.
    pub fn enabled(&self) -> bool {
        !self.disabled
    }

    /// Whether a `take` must short-circuit because the in-flight cap is
    /// reached. Always false when ephemeral storage is disabled or the cap
    /// is unbounded.
    pub fn cap_reached(&self, current: u64) -> bool {
        !self.disabled && self.max_size.is_some_and(|cap| current >= cap)
    }

    /// Resolve the storage path for a store operation.
    pub(crate) fn resolve(&self, case: StoreCase) -> StoreCase {
        if self.disabled {
            StoreCase::New
        } else {
            case
        }
    }

    /// The copy of `msg` that actually lands in queue storage for the given
    /// case.
    pub(crate) fn bookkeep(&self, msg: &Message, case: StoreCase, now: u64) -> Message {
        match case {
            StoreCase::Requeue => msg.requeued(now),
            StoreCase::New | StoreCase::RequeueSilent => msg.clone(),
        }
    }
}
