//! Reconciliation of fetched snapshots into the view-model store.
//!
//! [`reconcile`] is the value-level merge: previous store plus snapshot in, new store
//! plus an ordered list of effects out. [`SyncEngine`] owns the live store and adds
//! the sequencing that keeps a slow, older fetch from overwriting a newer one.

use crate::permissions::{evaluate, ActionStates};
use crate::store::{Field, Session, ViewEntry, ViewStore};
use log::debug;
use shared::{ActionKind, ReleaseCatalog, ServerId, ServerRecord, Snapshot};

/// A change rendering must apply, in the order it was emitted.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Create {
        uuid: ServerId,
        record: Box<ServerRecord>,
        actions: ActionStates,
    },
    Update {
        uuid: ServerId,
        field: Field,
        value: String,
    },
    ButtonState {
        uuid: ServerId,
        kind: ActionKind,
        enabled: bool,
    },
    Remove {
        uuid: ServerId,
    },
    RemoveAll,
}

impl Effect {
    pub fn uuid(&self) -> Option<&ServerId> {
        match self {
            Effect::Create { uuid, .. }
            | Effect::Update { uuid, .. }
            | Effect::ButtonState { uuid, .. }
            | Effect::Remove { uuid } => Some(uuid),
            Effect::RemoveAll => None,
        }
    }
}

/// Merges `snapshot` into a copy of `previous`.
///
/// `catalog` is `None` until the release catalog has loaded; existing `upgrade`
/// indicators are then left as they are.
pub fn reconcile(
    previous: &ViewStore,
    snapshot: &Snapshot,
    catalog: Option<&ReleaseCatalog>,
) -> (ViewStore, Vec<Effect>) {
    let mut store = previous.clone();
    let effects = apply_snapshot(&mut store, snapshot, catalog);
    (store, effects)
}

fn apply_snapshot(
    store: &mut ViewStore,
    snapshot: &Snapshot,
    catalog: Option<&ReleaseCatalog>,
) -> Vec<Effect> {
    let servers = match snapshot {
        Snapshot::Unauthenticated => {
            let already_signed_out =
                store.session() == Session::Unauthenticated && store.is_empty();
            store.clear();
            store.set_session(Session::Unauthenticated);

            return if already_signed_out {
                Vec::new()
            } else {
                vec![Effect::RemoveAll]
            };
        }
        Snapshot::Fleet(servers) => servers,
    };

    store.set_session(Session::Authenticated);
    let mut effects = Vec::new();

    for (uuid, record) in servers {
        match store.get_mut(uuid) {
            Some(entry) => update_entry(entry, record, catalog, &mut effects),
            None => {
                // Keyed by the snapshot key so the removal sweep below agrees
                let mut entry = ViewEntry::new(record, catalog);
                entry.uuid = uuid.clone();
                effects.push(Effect::Create {
                    uuid: uuid.clone(),
                    record: Box::new(record.clone()),
                    actions: entry.actions.clone(),
                });
                store.insert(entry);
            }
        }
    }

    let gone: Vec<ServerId> = store
        .ids()
        .filter(|uuid| !servers.contains_key(*uuid))
        .cloned()
        .collect();

    for uuid in gone {
        store.remove(&uuid);
        effects.push(Effect::Remove { uuid });
    }

    effects
}

fn update_entry(
    entry: &mut ViewEntry,
    record: &ServerRecord,
    catalog: Option<&ReleaseCatalog>,
    effects: &mut Vec<Effect>,
) {
    for field in Field::ALL {
        let value = field.render(record);
        if entry.fields.get(&field) == Some(&value) {
            continue;
        }

        effects.push(Effect::Update {
            uuid: entry.uuid.clone(),
            field,
            value: value.clone(),
        });
        entry.fields.insert(field, value);
    }

    for (kind, enabled) in evaluate(record, catalog) {
        if entry.actions.insert(kind, enabled) != Some(enabled) {
            effects.push(Effect::ButtonState {
                uuid: entry.uuid.clone(),
                kind,
                enabled,
            });
        }
    }
}

/// Owner of the live view-model store.
///
/// Every fetch gets a sequence number when it is issued. A result is applied only if
/// its number is above everything applied (or superseded) so far.
#[derive(Debug)]
pub struct SyncEngine {
    store: ViewStore,
    catalog: Option<ReleaseCatalog>,
    next_sequence: u64,
    floor: Option<u64>,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self {
            store: ViewStore::new(),
            catalog: None,
            next_sequence: 1,
            floor: None,
        }
    }

    pub fn store(&self) -> &ViewStore {
        &self.store
    }

    pub fn catalog(&self) -> Option<&ReleaseCatalog> {
        self.catalog.as_ref()
    }

    /// Replaces the release catalog. Takes effect on the next applied snapshot.
    pub fn set_catalog(&mut self, catalog: ReleaseCatalog) {
        self.catalog = Some(catalog);
    }

    /// Reserves the sequence number for a fetch about to be issued.
    pub fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    pub fn last_applied(&self) -> Option<u64> {
        self.floor
    }

    pub fn is_stale(&self, sequence: u64) -> bool {
        self.floor.map_or(false, |floor| sequence <= floor)
    }

    /// Applies a snapshot tagged with `sequence`. Returns `None` if it was stale and
    /// left the store untouched.
    pub fn apply(&mut self, sequence: u64, snapshot: &Snapshot) -> Option<Vec<Effect>> {
        if self.is_stale(sequence) {
            debug!(
                "Dropping stale snapshot #{} (last applied #{:?})",
                sequence, self.floor
            );
            return None;
        }

        self.floor = Some(sequence);
        self.next_sequence = self.next_sequence.max(sequence + 1);

        let effects = apply_snapshot(&mut self.store, snapshot, self.catalog.as_ref());
        debug!(
            "Applied snapshot #{}: {} servers, {} effects",
            sequence,
            self.store.len(),
            effects.len()
        );
        Some(effects)
    }

    /// Drops a server that is known to be gone without waiting for the next poll.
    ///
    /// Fetches issued before the eviction are superseded so they cannot bring the
    /// card back.
    pub fn evict(&mut self, uuid: &ServerId) -> Option<Effect> {
        let issued = self.next_sequence - 1;
        self.floor = Some(self.floor.map_or(issued, |floor| floor.max(issued)));

        self.store.remove(uuid).map(|entry| Effect::Remove { uuid: entry.uuid })
    }
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}
