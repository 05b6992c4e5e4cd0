use std::collections::HashSet;

use crate::models::geo::{FeatureCollection, GeocodeResponse};

/// Accumulates the features of every tool result answering the current query.
///
/// Each [`begin_query`](Self::begin_query) opens a new epoch. Only calls
/// registered during the active epoch may contribute, and each of them at most
/// once, so a result from a superseded query can never leak into the overlay.
/// Features are not deduplicated: the merged count is the sum of every
/// contribution in the epoch.
#[derive(Debug, Default)]
pub struct FeatureAggregator {
    epoch: u64,
    calls: HashSet<String>,
    features: FeatureCollection,
}

impl FeatureAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything accumulated so far and open a fresh epoch
    pub fn begin_query(&mut self) -> u64 {
        self.epoch += 1;
        self.calls.clear();
        self.features = FeatureCollection::default();
        self.epoch
    }

    /// Tag a call as belonging to the active epoch
    pub fn register_call<S: Into<String>>(&mut self, call_id: S) {
        self.calls.insert(call_id.into());
    }

    pub fn is_active(&self, call_id: &str) -> bool {
        self.calls.contains(call_id)
    }

    /// Merge a tool result into the scope.
    ///
    /// Returns the merged collection when the result changed it. Results from
    /// calls outside the active epoch and failed results are ignored.
    pub fn add_tool_result(
        &mut self,
        call_id: &str,
        response: &GeocodeResponse,
    ) -> Option<&FeatureCollection> {
        if !self.calls.remove(call_id) {
            tracing::debug!(call_id, epoch = self.epoch, "dropping result outside the active query");
            return None;
        }

        match response {
            GeocodeResponse::Success { features, .. } => {
                self.features.features.extend(features.iter().cloned());
                Some(&self.features)
            }
            GeocodeResponse::Failure { .. } => None,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn features(&self) -> &FeatureCollection {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
