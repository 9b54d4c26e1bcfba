//! Quillon: push-style model synchronization for distributed online
//! learners.
//!
//! Each node in a learner fleet mutates a local model while serving
//! traffic. The push mixer periodically exchanges incremental deltas with
//! peers so the fleet converges toward a shared view without centralized
//! coordination.
pub mod api;
pub mod candidate;
pub mod cli;
pub mod error;
pub mod membership;
pub mod mixable;
pub mod mixer;
pub mod model;
pub mod peer_client;
pub mod registry;
pub mod server;
pub mod settings;
pub mod wire;

pub use error::{QuillonError, Result};
pub use mixable::{PushMixable, SharedModel};
pub use mixer::PushMixer;
pub use server::MixServer;
