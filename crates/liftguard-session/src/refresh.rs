//! Single-flight refresh bookkeeping.
//!
//! At most one refresh runs per manager. The first caller that needs one
//! spawns it and parks a [`Shared`] handle here; everyone who arrives while
//! it's in flight awaits a clone of that same handle, so they all observe
//! one outcome and the backend sees one refresh call.

use futures_util::future::{BoxFuture, Shared};

/// Cloneable handle to the outcome of an in-flight refresh.
pub(crate) type RefreshHandle = Shared<BoxFuture<'static, Option<String>>>;

pub(crate) enum RefreshState {
    Idle,
    Refreshing {
        /// Distinguishes this refresh from later ones.
        id: u64,
        handle: RefreshHandle,
    },
}

impl RefreshState {
    /// The in-flight handle, if a refresh is running.
    pub(crate) fn in_flight(&self) -> Option<RefreshHandle> {
        match self {
            Self::Idle => None,
            Self::Refreshing { handle, .. } => Some(handle.clone()),
        }
    }

    pub(crate) fn is_refreshing(&self) -> bool {
        matches!(self, Self::Refreshing { .. })
    }

    /// Back to `Idle`, but only if refresh `id` is the one recorded.
    pub(crate) fn finish(&mut self, id: u64) {
        if matches!(self, Self::Refreshing { id: current, .. } if *current == id) {
            *self = Self::Idle;
        }
    }
}
