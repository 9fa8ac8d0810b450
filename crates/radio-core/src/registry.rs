//! Slot-indexed station registry.
//!
//! Owned by the coordination context and mutated only there, so it carries no
//! lock. Late logo results from other threads reach it as events, never
//! directly.

use tracing::debug;

use crate::error::RegistryError;
use crate::fetcher::FetchOutcome;
use crate::station::{StationId, StationRecord};

/// Result of [`StationRegistry::update_logo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoUpdate {
    /// The logo was stored (or recorded as unavailable).
    Applied,
    /// The slot no longer holds the station the fetch was issued for.
    Stale,
    /// The station's logo was already settled; nothing changed.
    AlreadySettled,
}

pub struct StationRegistry {
    slots: Vec<Option<StationRecord>>,
    next_id: u64,
}

impl StationRegistry {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: vec![None; slot_count],
            next_id: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bind `record` to `slot`, replacing whatever was there.
    ///
    /// The record is stamped with a fresh [`StationId`], which callers must
    /// quote back in [`update_logo`](Self::update_logo).
    pub fn assign(
        &mut self,
        slot: usize,
        mut record: StationRecord,
    ) -> Result<StationId, RegistryError> {
        let capacity = self.capacity();
        let entry = self
            .slots
            .get_mut(slot)
            .ok_or(RegistryError::SlotOutOfRange { slot, capacity })?;
        let id = StationId(self.next_id);
        self.next_id += 1;
        record.id = id;
        *entry = Some(record);
        Ok(id)
    }

    pub fn get(&self, slot: usize) -> Option<&StationRecord> {
        self.slots.get(slot)?.as_ref()
    }

    /// Settle the remote logo of the station `station` in `slot`.
    ///
    /// A failed outcome clears the pending flag and leaves the station without
    /// artwork. Results for a slot that has since been reassigned, or for a
    /// station whose logo is already settled, are ignored.
    pub fn update_logo(
        &mut self,
        slot: usize,
        station: StationId,
        outcome: &FetchOutcome,
    ) -> LogoUpdate {
        let Some(record) = self.slots.get_mut(slot).and_then(Option::as_mut) else {
            return LogoUpdate::Stale;
        };
        if record.id != station {
            debug!(
                "registry: slot {} now holds {}, dropping logo for {}",
                slot, record.id, station
            );
            return LogoUpdate::Stale;
        }
        if !record.logo_pending {
            return LogoUpdate::AlreadySettled;
        }
        record.logo_pending = false;
        record.resolved_logo = outcome.as_ref().ok().cloned();
        LogoUpdate::Applied
    }

    /// Occupied slots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &StationRecord)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, s)| s.as_ref().map(|r| (slot, r)))
    }
}
