//! The weight-vector model served by the Quillon daemon.
//!
//! `AveragedWeights` is a dense vector of learner weights. Local traffic
//! applies additive deltas; mixing with a peer averages the two vectors
//! elementwise, which pulls the fleet toward a shared view without any
//! node being authoritative.
use serde::{Deserialize, Serialize};

use crate::error::{QuillonError, Result};
use crate::mixable::PushMixable;

/// Pull argument: the delta shape the requester wants back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PullArgument {
    pub dimensions: usize,
}

/// Diff exchanged between peers: a full weight snapshot to average in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightDiff {
    pub weights: Vec<f64>,
}

#[derive(Clone, Debug)]
pub struct AveragedWeights {
    weights: Vec<f64>,
    local_updates: u64,
}

impl AveragedWeights {
    pub fn new(dimensions: usize) -> Self {
        Self {
            weights: vec![0.0; dimensions],
            local_updates: 0,
        }
    }

    pub fn with_weights(weights: Vec<f64>) -> Self {
        Self {
            weights,
            local_updates: 0,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn local_updates(&self) -> u64 {
        self.local_updates
    }

    /// Apply a local training update: add the delta elementwise.
    pub fn apply_update(&mut self, delta: &[f64]) -> Result<()> {
        if delta.len() != self.weights.len() {
            return Err(QuillonError::Mixable(format!(
                "update has {} dimensions, model has {}",
                delta.len(),
                self.weights.len()
            )));
        }
        for (weight, d) in self.weights.iter_mut().zip(delta) {
            *weight += d;
        }
        self.local_updates += 1;
        Ok(())
    }

    fn check_dimensions(&self, dimensions: usize) -> Result<()> {
        if dimensions != self.weights.len() {
            return Err(QuillonError::Mixable(format!(
                "peer model has {} dimensions, ours has {}",
                dimensions,
                self.weights.len()
            )));
        }
        Ok(())
    }
}

impl PushMixable for AveragedWeights {
    fn get_argument(&self) -> Result<Vec<u8>> {
        let argument = PullArgument {
            dimensions: self.weights.len(),
        };
        postcard::to_allocvec(&argument)
            .map_err(|e| QuillonError::Mixable(format!("failed to encode pull argument: {}", e)))
    }

    fn pull(&self, argument: &[u8]) -> Result<Vec<u8>> {
        let argument: PullArgument = postcard::from_bytes(argument)
            .map_err(|e| QuillonError::Mixable(format!("undecodable pull argument: {}", e)))?;
        self.check_dimensions(argument.dimensions)?;

        let diff = WeightDiff {
            weights: self.weights.clone(),
        };
        postcard::to_allocvec(&diff)
            .map_err(|e| QuillonError::Mixable(format!("failed to encode diff: {}", e)))
    }

    fn push(&mut self, diff: &[u8]) -> Result<()> {
        let diff: WeightDiff = postcard::from_bytes(diff)
            .map_err(|e| QuillonError::Mixable(format!("undecodable diff: {}", e)))?;
        self.check_dimensions(diff.weights.len())?;

        for (weight, incoming) in self.weights.iter_mut().zip(&diff.weights) {
            *weight = (*weight + incoming) / 2.0;
        }
        Ok(())
    }
}
