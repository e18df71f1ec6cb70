use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::models::soundboard::{RemoteSound, SoundboardSlot, SLOT_COUNT};

/// A slot whose rendered state changed during a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotChange {
    pub ordinal: usize,
    pub slot: SoundboardSlot,
}

/// Fixed-capacity table of soundboard positions.
///
/// Positions are sticky: a sound keeps its ordinal for as long as the remote
/// snapshot keeps listing it, because each ordinal maps to a fixed container
/// in the viewer UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotTable {
    slots: [SoundboardSlot; SLOT_COUNT],
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slots(slots: [SoundboardSlot; SLOT_COUNT]) -> Self {
        Self { slots }
    }

    pub fn slots(&self) -> &[SoundboardSlot] {
        &self.slots
    }

    pub fn get(&self, ordinal: usize) -> Option<&SoundboardSlot> {
        self.slots.get(ordinal)
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(|s| !s.is_empty())
    }

    pub fn occupied(&self) -> impl Iterator<Item = (usize, &SoundboardSlot)> {
        self.slots.iter().enumerate().filter(|(_, s)| !s.is_empty())
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied().count()
    }

    pub fn find_by_name(&self, name: &str) -> Option<(usize, &SoundboardSlot)> {
        self.occupied().find(|(_, s)| s.name == name)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.find_by_name(name).is_some()
    }

    pub fn owned_by<'a>(
        &'a self,
        user_id: &'a str,
    ) -> impl Iterator<Item = (usize, &'a SoundboardSlot)> + 'a {
        self.occupied().filter(move |(_, s)| s.owner_id == user_id)
    }

    /// Merge an authoritative remote snapshot into the table.
    ///
    /// Returns one change per ordinal whose contents differ afterwards, in
    /// ascending ordinal order.
    pub fn reconcile(&mut self, remote: &[RemoteSound]) -> Vec<SlotChange> {
        let incoming: Vec<SoundboardSlot> = remote
            .iter()
            .filter_map(|sound| {
                let slot = SoundboardSlot::from_remote(sound);
                if slot.is_none() {
                    tracing::warn!(
                        "ignoring incomplete soundboard sound (id {:?}, name {:?})",
                        sound.sound_id,
                        sound.name
                    );
                }
                slot
            })
            .collect();

        let present: HashSet<String> = incoming.iter().map(|s| s.sound_id.clone()).collect();
        let positions: HashMap<String, usize> = self
            .occupied()
            .map(|(ordinal, s)| (s.sound_id.clone(), ordinal))
            .collect();

        let mut next = self.slots.clone();
        let mut touched = BTreeSet::new();
        // Only ordinals free before this snapshot can take new sounds.
        let mut free: VecDeque<usize> = (0..SLOT_COUNT).filter(|&o| next[o].is_empty()).collect();
        let mut seen = HashSet::new();

        for slot in incoming {
            if !seen.insert(slot.sound_id.clone()) {
                continue;
            }
            if let Some(&ordinal) = positions.get(&slot.sound_id) {
                if next[ordinal] != slot {
                    next[ordinal] = slot;
                    touched.insert(ordinal);
                }
                continue;
            }
            match free.pop_front() {
                Some(ordinal) => {
                    next[ordinal] = slot;
                    touched.insert(ordinal);
                }
                None => {
                    tracing::debug!("soundboard full, dropping sound {}", slot.sound_id);
                }
            }
        }

        for (ordinal, slot) in self.occupied() {
            if !present.contains(slot.sound_id.as_str()) {
                next[ordinal] = SoundboardSlot::default();
                touched.insert(ordinal);
            }
        }

        let changes = touched
            .into_iter()
            .filter(|&o| next[o] != self.slots[o])
            .map(|ordinal| SlotChange {
                ordinal,
                slot: next[ordinal].clone(),
            })
            .collect();

        self.slots = next;
        changes
    }
}
