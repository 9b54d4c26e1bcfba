//! The capability seam between the mix engine and the model it synchronizes.
//!
//! A model that wants to participate in push-style mixing implements
//! [`PushMixable`]; anything else cannot be registered with the mixer at
//! all. The mixer treats arguments and diffs as opaque byte strings and
//! forwards them over the wire untouched.
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::Result;

/// Push-mix capability presented by a model at registration time.
///
/// The callbacks are synchronous and serialize into owned buffers, so the
/// model lock wrapped around them is never held across network I/O.
pub trait PushMixable: Send + Sync + 'static {
    /// Serialize the pull argument this node would hand a peer: a
    /// description of the delta shape it wants back.
    fn get_argument(&self) -> Result<Vec<u8>>;

    /// Serialize the diff this node's model produces for a peer's
    /// pull argument.
    fn pull(&self, argument: &[u8]) -> Result<Vec<u8>>;

    /// Apply a peer's diff to the local model.
    fn push(&mut self, diff: &[u8]) -> Result<()>;
}

/// Shared handle to the mixable behind the externally owned model lock.
///
/// Read mode serializes the pull-family callbacks, write mode the push
/// callback. The lock itself belongs to whoever constructed the model;
/// the mixer only borrows it.
pub type SharedModel = Arc<RwLock<dyn PushMixable>>;
