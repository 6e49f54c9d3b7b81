//! The single owned state container behind [`SyncEngine`](crate::engine::SyncEngine).
//!
//! All mutations go through [`Store::apply`]. For every key the store keeps the
//! last confirmed value and the writes still in flight, each tagged with a
//! monotonic sequence number. The visible value is the newest write that has
//! not failed, so a failed write rolls back to exactly what was there before
//! it, even when several writes on the same key overlap.

use std::collections::{BTreeMap, HashMap};

use crate::models::{Bundle, SyncKey, SyncValue};

#[derive(Debug, Clone)]
pub enum Action {
    /// Seed from the local cache before anything has been fetched.
    Hydrate(Bundle),
    /// A full fetch from `load`: always replaces confirmed values.
    Loaded { bundle: Bundle, snapshot: String },
    /// A full fetch from `poll`: replaces only when `snapshot` differs from the
    /// last applied one.
    Polled { bundle: Bundle, snapshot: String },
    /// An optimistic write was issued.
    Begin { seq: u64, value: SyncValue },
    /// The gateway accepted write `seq`.
    Confirm { key: SyncKey, seq: u64 },
    /// The gateway rejected write `seq`.
    Reject { key: SyncKey, seq: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    /// Confirmed values were replaced by fetched ones.
    pub replaced: bool,
    /// Keys whose visible value changed.
    pub changed: Vec<SyncKey>,
}

#[derive(Debug, Default)]
struct Writes {
    confirmed_seq: u64,
    pending: BTreeMap<u64, SyncValue>,
}

#[derive(Debug, Default)]
pub struct Store {
    confirmed: Bundle,
    visible: Bundle,
    writes: HashMap<SyncKey, Writes>,
    snapshot: Option<String>,
    next_seq: u64,
}

impl Store {
    pub fn new(initial: Bundle) -> Self {
        let mut store = Self::default();
        store.apply(Action::Hydrate(initial));
        store
    }

    pub fn visible(&self) -> &Bundle {
        &self.visible
    }

    pub fn confirmed(&self) -> &Bundle {
        &self.confirmed
    }

    pub fn snapshot(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }

    pub fn pending(&self, key: SyncKey) -> usize {
        self.writes.get(&key).map_or(0, |w| w.pending.len())
    }

    /// Reserve the sequence number for the next `Begin`.
    pub fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    pub fn apply(&mut self, action: Action) -> Transition {
        match action {
            Action::Hydrate(bundle) => {
                self.confirmed = bundle;
                self.refresh_all(false)
            }
            Action::Loaded { bundle, snapshot } => {
                self.confirmed = bundle;
                self.snapshot = Some(snapshot);
                self.refresh_all(true)
            }
            Action::Polled { bundle, snapshot } => {
                if self.snapshot.as_deref() == Some(snapshot.as_str()) {
                    return Transition::default();
                }
                self.confirmed = bundle;
                self.snapshot = Some(snapshot);
                self.refresh_all(true)
            }
            Action::Begin { seq, value } => {
                let key = value.key();
                self.writes.entry(key).or_default().pending.insert(seq, value);
                self.refresh_one(key)
            }
            Action::Confirm { key, seq } => {
                let writes = self.writes.entry(key).or_default();
                if let Some(value) = writes.pending.remove(&seq) {
                    if seq > writes.confirmed_seq {
                        writes.confirmed_seq = seq;
                        self.confirmed.set(value);
                        // The last fetch no longer matches what the server holds.
                        self.snapshot = None;
                    }
                }
                self.refresh_one(key)
            }
            Action::Reject { key, seq } => {
                if let Some(writes) = self.writes.get_mut(&key) {
                    writes.pending.remove(&seq);
                }
                self.refresh_one(key)
            }
        }
    }

    fn visible_value(&self, key: SyncKey) -> SyncValue {
        self.writes
            .get(&key)
            .and_then(|w| {
                w.pending
                    .iter()
                    .next_back()
                    .filter(|(seq, _)| **seq > w.confirmed_seq)
                    .map(|(_, value)| value.clone())
            })
            .unwrap_or_else(|| self.confirmed.get(key))
    }

    fn refresh_one(&mut self, key: SyncKey) -> Transition {
        let value = self.visible_value(key);
        let mut transition = Transition::default();
        if self.visible.get(key) != value {
            self.visible.set(value);
            transition.changed.push(key);
        }
        transition
    }

    fn refresh_all(&mut self, replaced: bool) -> Transition {
        let mut transition = Transition {
            replaced,
            changed: Vec::new(),
        };
        for key in SyncKey::ALL {
            transition.changed.extend(self.refresh_one(key).changed);
        }
        transition
    }
}
