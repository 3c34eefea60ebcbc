use crate::model::{Status, SubmissionKey, SubmissionRecord};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Per-key state: the last value the system of record agreed to, plus every
/// optimistic flip that is still waiting for an answer (keyed by sequence).
#[derive(Debug, Clone, Default)]
struct Slot {
    confirmed: Status,
    confirmed_seq: u64,
    in_flight: BTreeMap<u64, Status>,
}

impl Slot {
    fn current(&self) -> Status {
        self.in_flight
            .values()
            .next_back()
            .copied()
            .unwrap_or(self.confirmed)
    }
}

/// Handle for one optimistic flip that has been applied locally but not yet
/// answered by the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingToggle {
    pub key: SubmissionKey,
    pub seq: u64,
    pub previous: Status,
    pub next: Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleOutcome {
    /// Value visible to readers after settling.
    pub status: Status,
    /// Last value the system of record agreed to.
    pub confirmed: Status,
    /// The confirmed value moved because of this settlement.
    pub newly_confirmed: bool,
    /// A rejection moved the visible value back.
    pub rolled_back: bool,
    /// A later flip on the same key is still outstanding.
    pub superseded: bool,
}

/// The SubmissionRecord store: absence of a key means `pending`.
#[derive(Debug, Default)]
pub struct SubmissionStore {
    slots: HashMap<SubmissionKey, Slot>,
    next_seq: u64,
}

impl SubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_confirmed<I>(records: I) -> Self
    where
        I: IntoIterator<Item = SubmissionRecord>,
    {
        let mut store = Self::new();
        for r in records {
            store.load_confirmed(r);
        }
        store
    }

    pub fn status(&self, key: &SubmissionKey) -> Status {
        self.slots.get(key).map(Slot::current).unwrap_or_default()
    }

    pub fn confirmed_status(&self, key: &SubmissionKey) -> Status {
        self.slots.get(key).map(|s| s.confirmed).unwrap_or_default()
    }

    /// Replace the confirmed value (snapshot from the system of record).
    /// Outstanding optimistic flips stay visible on top of it, but the
    /// snapshot outranks any confirmation for a flip begun before it.
    pub fn load_confirmed(&mut self, record: SubmissionRecord) {
        let key = record.key();
        let snapshot_seq = self.next_seq;
        let slot = self.slots.entry(key).or_default();
        slot.confirmed = record.status;
        slot.confirmed_seq = slot.confirmed_seq.max(snapshot_seq);
    }

    pub fn total_in_flight(&self) -> usize {
        self.slots.values().map(|s| s.in_flight.len()).sum()
    }

    /// Flip the visible value immediately. A second call before the first
    /// settles flips the already-flipped value, never a stale snapshot.
    pub fn begin_toggle(&mut self, key: SubmissionKey) -> PendingToggle {
        self.next_seq += 1;
        let seq = self.next_seq;
        let slot = self.slots.entry(key.clone()).or_default();
        let previous = slot.current();
        let next = previous.flip();
        slot.in_flight.insert(seq, next);
        PendingToggle {
            key,
            seq,
            previous,
            next,
        }
    }

    /// Apply the system of record's answer for one flip.
    ///
    /// Confirmations advance the confirmed value only if they are newer than
    /// the last one applied. A rejection drops the flip; the visible value then
    /// falls back to the newest flip still outstanding, else to the confirmed
    /// value. Settling the same flip twice is a no-op.
    pub fn settle(&mut self, pending: &PendingToggle, accepted: bool) -> SettleOutcome {
        let slot = self.slots.entry(pending.key.clone()).or_default();
        let before = slot.current();

        let was_outstanding = slot.in_flight.remove(&pending.seq).is_some();
        let newly_confirmed = was_outstanding && accepted && pending.seq > slot.confirmed_seq;
        if newly_confirmed {
            slot.confirmed = pending.next;
            slot.confirmed_seq = pending.seq;
        }

        let after = slot.current();
        SettleOutcome {
            status: after,
            confirmed: slot.confirmed,
            newly_confirmed,
            rolled_back: !accepted && before != after,
            superseded: slot.in_flight.keys().any(|s| *s > pending.seq),
        }
    }

    /// Current (optimistic) view of every known record.
    pub fn records(&self) -> impl Iterator<Item = SubmissionRecord> + '_ {
        self.slots.iter().map(|(k, slot)| SubmissionRecord {
            student_id: k.student_id.clone(),
            subject_id: k.subject_id.clone(),
            submission_type: k.submission_type,
            status: slot.current(),
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
