//! Per-context tracking data, addressable only by the owning tracker.

use crate::core::simplify::SimpleActionContext;
use crate::core::types::{TrackingData, TrackingPatch};
use crate::runtime::context::{ActionContext, DataBag, DataKey};

/// Anything exposing the data bag of a step-chain.
pub trait HasDataBag {
    fn data_bag(&self) -> &DataBag;
}

impl HasDataBag for ActionContext {
    fn data_bag(&self) -> &DataBag {
        &self.data
    }
}

impl HasDataBag for SimpleActionContext {
    fn data_bag(&self) -> &DataBag {
        &self.data
    }
}

/// Store keyed by a freshly minted [`DataKey`], so independently configured
/// trackers never see each other's records in a shared bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalStore {
    key: DataKey,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore {
    pub fn new() -> Self {
        Self {
            key: DataKey::mint(),
        }
    }

    pub fn key(&self) -> DataKey {
        self.key
    }

    pub fn get(&self, ctx: &impl HasDataBag) -> Option<TrackingData> {
        ctx.data_bag().get::<TrackingData>(self.key)
    }

    /// Merge `patch` into the stored record, creating it if absent.
    pub fn set(&self, ctx: &impl HasDataBag, patch: TrackingPatch) -> TrackingData {
        let bag = ctx.data_bag();
        let merged = bag.update(self.key, |data: &mut TrackingData| {
            patch.apply(data);
            *data
        });
        merged.unwrap_or_else(|| {
            let data = patch.into_data();
            bag.insert(self.key, data);
            data
        })
    }
}
