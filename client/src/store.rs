//! The view-model store: what is currently shown for each server, keyed by uuid.
//!
//! Only the reconciliation engine mutates a store. Everyone else gets shared
//! references.

use crate::permissions::{evaluate, ActionStates};
use shared::{ActionKind, ReleaseCatalog, ServerId, ServerRecord};
use std::collections::BTreeMap;

/// A displayed field of a server card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Name,
    Address,
    Running,
    Motd,
    Flavor,
    Release,
    Online,
    Players,
    Gamemode,
    Worldtype,
    Seed,
    WhitelistEnabled,
    Hardcore,
    Pvp,
    Autostart,
    Ops,
    Whitelist,
}

impl Field {
    pub const ALL: [Field; 17] = [
        Field::Name,
        Field::Address,
        Field::Running,
        Field::Motd,
        Field::Flavor,
        Field::Release,
        Field::Online,
        Field::Players,
        Field::Gamemode,
        Field::Worldtype,
        Field::Seed,
        Field::WhitelistEnabled,
        Field::Hardcore,
        Field::Pvp,
        Field::Autostart,
        Field::Ops,
        Field::Whitelist,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Field::Name => "Name",
            Field::Address => "Address",
            Field::Running => "Status",
            Field::Motd => "MOTD",
            Field::Flavor => "Flavor",
            Field::Release => "Release",
            Field::Online => "Online",
            Field::Players => "Online Players",
            Field::Gamemode => "Game Mode",
            Field::Worldtype => "World Type",
            Field::Seed => "Seed",
            Field::WhitelistEnabled => "Whitelist On",
            Field::Hardcore => "Hardcore",
            Field::Pvp => "PVP",
            Field::Autostart => "Autostart",
            Field::Ops => "Ops",
            Field::Whitelist => "Whitelisted",
        }
    }

    /// The exact text a card shows for this field.
    pub fn render(self, record: &ServerRecord) -> String {
        match self {
            Field::Name => record.name.clone(),
            Field::Address => record.address(),
            Field::Running => record.running.label().to_string(),
            Field::Motd => record.motd.clone(),
            Field::Flavor => record.flavor.clone(),
            Field::Release => record.release.clone(),
            Field::Online => record.online_count().to_string(),
            Field::Players => record.online_players().collect::<Vec<_>>().join("\n"),
            Field::Gamemode => record.gamemode.clone(),
            Field::Worldtype => record.worldtype.clone(),
            Field::Seed => record.seed.clone(),
            Field::WhitelistEnabled => record.whitelist_enabled.to_string(),
            Field::Hardcore => record.hardcore.to_string(),
            Field::Pvp => record.pvp.to_string(),
            Field::Autostart => record.autostart.to_string(),
            Field::Ops => record.ops.join(", "),
            Field::Whitelist => record.whitelist.join(", "),
        }
    }
}

pub type RenderedFields = BTreeMap<Field, String>;

pub fn render_fields(record: &ServerRecord) -> RenderedFields {
    Field::ALL
        .into_iter()
        .map(|field| (field, field.render(record)))
        .collect()
}

/// Last-rendered state of one server card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewEntry {
    pub uuid: ServerId,
    pub fields: RenderedFields,
    pub actions: ActionStates,
}

impl ViewEntry {
    /// Builds a fresh entry. Without a catalog, `upgrade` starts hidden.
    pub fn new(record: &ServerRecord, catalog: Option<&ReleaseCatalog>) -> Self {
        let mut actions = evaluate(record, catalog);
        actions.entry(ActionKind::Upgrade).or_insert(false);

        Self {
            uuid: record.uuid.clone(),
            fields: render_fields(record),
            actions,
        }
    }

    pub fn field(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn name(&self) -> &str {
        self.field(Field::Name).unwrap_or_default()
    }

    pub fn is_enabled(&self, kind: ActionKind) -> bool {
        self.actions.get(&kind).copied().unwrap_or(false)
    }
}

/// What the last applied snapshot said about the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Session {
    /// Nothing applied yet.
    #[default]
    Unknown,
    Authenticated,
    Unauthenticated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewStore {
    entries: BTreeMap<ServerId, ViewEntry>,
    session: Session,
}

impl ViewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uuid: &ServerId) -> Option<&ViewEntry> {
        self.entries.get(uuid)
    }

    pub fn contains(&self, uuid: &ServerId) -> bool {
        self.entries.contains_key(uuid)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ServerId> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ViewEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn session(&self) -> Session {
        self.session
    }

    pub(crate) fn get_mut(&mut self, uuid: &ServerId) -> Option<&mut ViewEntry> {
        self.entries.get_mut(uuid)
    }

    pub(crate) fn insert(&mut self, entry: ViewEntry) {
        self.entries.insert(entry.uuid.clone(), entry);
    }

    pub(crate) fn remove(&mut self, uuid: &ServerId) -> Option<ViewEntry> {
        self.entries.remove(uuid)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn set_session(&mut self, session: Session) {
        self.session = session;
    }
}
