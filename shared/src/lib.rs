use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub const RUNNING_LABEL: &str = "Running";
pub const STOPPED_LABEL: &str = "Stopped";
pub const UNKNOWN_LABEL: &str = "Status Unknown";

/// Stable identity of a server. Never derived from mutable fields like the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Process state as last reported by the backend.
///
/// `null` or an absent field on the wire means the status could not be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Running {
    Running,
    Stopped,
    #[default]
    Unknown,
}

impl Running {
    pub fn is_running(self) -> bool {
        matches!(self, Running::Running)
    }

    pub fn label(self) -> &'static str {
        match self {
            Running::Running => RUNNING_LABEL,
            Running::Stopped => STOPPED_LABEL,
            Running::Unknown => UNKNOWN_LABEL,
        }
    }
}

impl From<Option<bool>> for Running {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Running::Running,
            Some(false) => Running::Stopped,
            None => Running::Unknown,
        }
    }
}

impl From<Running> for Option<bool> {
    fn from(value: Running) -> Self {
        match value {
            Running::Running => Some(true),
            Running::Stopped => Some(false),
            Running::Unknown => None,
        }
    }
}

/// Administrative operations an operator can request against a server.
///
/// Serialized as the short codes used in action URLs and permission maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "sta")]
    Start,
    #[serde(rename = "sto")]
    Stop,
    #[serde(rename = "sav")]
    Save,
    #[serde(rename = "bkp")]
    Backup,
    #[serde(rename = "del")]
    Delete,
    #[serde(rename = "rgn")]
    Regen,
    #[serde(rename = "day")]
    SetDaytime,
    #[serde(rename = "wea")]
    WeatherClear,
    #[serde(rename = "ado")]
    AddOp,
    #[serde(rename = "adw")]
    WhitelistAdd,
    #[serde(rename = "upg")]
    Upgrade,
}

impl ActionKind {
    pub const ALL: [ActionKind; 11] = [
        ActionKind::Start,
        ActionKind::Stop,
        ActionKind::Save,
        ActionKind::Backup,
        ActionKind::Delete,
        ActionKind::Regen,
        ActionKind::SetDaytime,
        ActionKind::WeatherClear,
        ActionKind::AddOp,
        ActionKind::WhitelistAdd,
        ActionKind::Upgrade,
    ];

    pub fn code(self) -> &'static str {
        match self {
            ActionKind::Start => "sta",
            ActionKind::Stop => "sto",
            ActionKind::Save => "sav",
            ActionKind::Backup => "bkp",
            ActionKind::Delete => "del",
            ActionKind::Regen => "rgn",
            ActionKind::SetDaytime => "day",
            ActionKind::WeatherClear => "wea",
            ActionKind::AddOp => "ado",
            ActionKind::WhitelistAdd => "adw",
            ActionKind::Upgrade => "upg",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    pub fn label(self) -> &'static str {
        match self {
            ActionKind::Start => "Start",
            ActionKind::Stop => "Stop",
            ActionKind::Save => "Save",
            ActionKind::Backup => "Backup",
            ActionKind::Delete => "Delete",
            ActionKind::Regen => "Regen World",
            ActionKind::SetDaytime => "Set Time Day",
            ActionKind::WeatherClear => "Weather Clear",
            ActionKind::AddOp => "Add Op",
            ActionKind::WhitelistAdd => "Add Whitelist",
            ActionKind::Upgrade => "Upgrade",
        }
    }

    /// Kinds that need an explicit yes/no from the operator before dispatch.
    pub fn is_destructive(self) -> bool {
        matches!(self, ActionKind::Delete | ActionKind::Regen)
    }

    /// Form field carrying the player name, for kinds that need one.
    pub fn payload_field(self) -> Option<&'static str> {
        match self {
            ActionKind::AddOp => Some("opname"),
            ActionKind::WhitelistAdd => Some("playername"),
            _ => None,
        }
    }

    pub fn requires_payload(self) -> bool {
        self.payload_field().is_some()
    }

    /// `upgrade` visibility comes from the release catalog, not the permission map.
    pub fn is_permission_gated(self) -> bool {
        !matches!(self, ActionKind::Upgrade)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Start => "start",
            ActionKind::Stop => "stop",
            ActionKind::Save => "save",
            ActionKind::Backup => "backup",
            ActionKind::Delete => "delete",
            ActionKind::Regen => "regen",
            ActionKind::SetDaytime => "setDaytime",
            ActionKind::WeatherClear => "weatherClear",
            ActionKind::AddOp => "addOp",
            ActionKind::WhitelistAdd => "whitelistAdd",
            ActionKind::Upgrade => "upgrade",
        };
        f.write_str(name)
    }
}

/// Per-action authorization plus a "must be running" precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionEntry {
    pub allowed: bool,
    #[serde(default, alias = "reqRunning")]
    pub requires_running: bool,
}

impl PermissionEntry {
    pub fn new(allowed: bool, requires_running: bool) -> Self {
        Self {
            allowed,
            requires_running,
        }
    }
}

/// Permission map of one server for the current caller.
///
/// Keyed by action code on the wire. Codes this client does not know are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, PermissionEntry>",
    into = "BTreeMap<String, PermissionEntry>"
)]
pub struct Permissions(BTreeMap<ActionKind, PermissionEntry>);

impl Permissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ActionKind) -> Option<&PermissionEntry> {
        self.0.get(&kind)
    }

    pub fn insert(&mut self, kind: ActionKind, entry: PermissionEntry) {
        self.0.insert(kind, entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionKind, &PermissionEntry)> {
        self.0.iter().map(|(kind, entry)| (*kind, entry))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every gated action listed, none allowed. Players see servers but control nothing.
    pub fn player() -> Self {
        [
            (ActionKind::AddOp, true),
            (ActionKind::WhitelistAdd, true),
            (ActionKind::Backup, false),
            (ActionKind::SetDaytime, true),
            (ActionKind::Save, true),
            (ActionKind::WeatherClear, true),
            (ActionKind::Delete, false),
            (ActionKind::Regen, false),
            (ActionKind::Start, false),
            (ActionKind::Stop, true),
        ]
        .into_iter()
        .map(|(kind, requires_running)| (kind, PermissionEntry::new(false, requires_running)))
        .collect()
    }

    /// Ops may run in-game maintenance but not control the process lifecycle.
    pub fn op() -> Self {
        Self::player().allow(&[
            ActionKind::AddOp,
            ActionKind::WhitelistAdd,
            ActionKind::Backup,
            ActionKind::SetDaytime,
            ActionKind::Save,
            ActionKind::WeatherClear,
        ])
    }

    pub fn owner() -> Self {
        Self::op().allow(&[
            ActionKind::Delete,
            ActionKind::Regen,
            ActionKind::Start,
            ActionKind::Stop,
        ])
    }

    fn allow(mut self, kinds: &[ActionKind]) -> Self {
        for kind in kinds {
            self.0.entry(*kind).or_default().allowed = true;
        }
        self
    }
}

impl FromIterator<(ActionKind, PermissionEntry)> for Permissions {
    fn from_iter<T: IntoIterator<Item = (ActionKind, PermissionEntry)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, PermissionEntry>> for Permissions {
    fn from(raw: BTreeMap<String, PermissionEntry>) -> Self {
        raw.into_iter()
            .filter_map(|(code, entry)| ActionKind::from_code(&code).map(|kind| (kind, entry)))
            .collect()
    }
}

impl From<Permissions> for BTreeMap<String, PermissionEntry> {
    fn from(permissions: Permissions) -> Self {
        permissions
            .0
            .into_iter()
            .map(|(kind, entry)| (kind.code().to_string(), entry))
            .collect()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<String>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// One server as reported in a snapshot. Immutable for the lifetime of that snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub uuid: ServerId,
    pub name: String,
    #[serde(default)]
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub running: Running,
    #[serde(default)]
    pub motd: String,
    pub flavor: String,
    pub release: String,
    #[serde(default)]
    pub gamemode: String,
    #[serde(default)]
    pub worldtype: String,
    #[serde(default)]
    pub seed: String,
    #[serde(default, alias = "whitelistenabled")]
    pub whitelist_enabled: bool,
    #[serde(default)]
    pub hardcore: bool,
    #[serde(default)]
    pub pvp: bool,
    #[serde(default)]
    pub autostart: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ops: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub whitelist: Vec<String>,
    /// Player slots; empty strings are unoccupied.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub players: Vec<String>,
    #[serde(default)]
    pub owned_by_current_user: bool,
    #[serde(default, alias = "perms")]
    pub permissions: Permissions,
}

impl ServerRecord {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>, port: u16) -> Self {
        Self {
            uuid: ServerId::new(uuid),
            name: name.into(),
            host: String::new(),
            port,
            running: Running::Unknown,
            motd: String::new(),
            flavor: String::new(),
            release: String::new(),
            gamemode: String::new(),
            worldtype: String::new(),
            seed: String::new(),
            whitelist_enabled: false,
            hardcore: false,
            pvp: false,
            autostart: false,
            ops: Vec::new(),
            whitelist: Vec::new(),
            players: Vec::new(),
            owned_by_current_user: false,
            permissions: Permissions::new(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Occupied player slots only.
    pub fn online_players(&self) -> impl Iterator<Item = &str> {
        self.players
            .iter()
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn online_count(&self) -> usize {
        self.online_players().count()
    }
}

/// Latest known release per server flavor. Loaded independently of snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseCatalog(HashMap<String, FlavorRelease>);

impl ReleaseCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self, flavor: &str) -> Option<&str> {
        self.0.get(flavor).map(|release| release.latest.as_str())
    }

    pub fn insert(&mut self, flavor: impl Into<String>, latest: impl Into<String>) {
        self.0.insert(
            flavor.into(),
            FlavorRelease {
                latest: latest.into(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlavorRelease {
    #[serde(deserialize_with = "latest_release_id")]
    pub latest: String,
}

fn latest_release_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Latest {
        Id(String),
        Detailed { release: String },
    }

    Ok(match Latest::deserialize(deserializer)? {
        Latest::Id(id) => id,
        Latest::Detailed { release } => release,
    })
}

/// Result of one snapshot fetch.
///
/// An authenticated caller with no servers is `Fleet` with an empty map, which is
/// a different situation from `Unauthenticated`.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Fleet(BTreeMap<ServerId, ServerRecord>),
    Unauthenticated,
}

impl Snapshot {
    pub fn fleet(records: impl IntoIterator<Item = ServerRecord>) -> Self {
        Snapshot::Fleet(
            records
                .into_iter()
                .map(|record| (record.uuid.clone(), record))
                .collect(),
        )
    }

    pub fn empty_fleet() -> Self {
        Snapshot::Fleet(BTreeMap::new())
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Snapshot::Fleet(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Snapshot::Fleet(servers) => servers.len(),
            Snapshot::Unauthenticated => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub uuid: ServerId,
    pub kind: ActionKind,
    /// Player name for `addOp` and `whitelistAdd`.
    pub payload: Option<String>,
}

impl ActionRequest {
    pub fn new(uuid: impl Into<ServerId>, kind: ActionKind) -> Self {
        Self {
            uuid: uuid.into(),
            kind,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Success,
    Failure(String),
    /// Another request for the same server and kind is still outstanding.
    Busy,
    /// Rejected locally before reaching the network.
    InvalidInput,
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Success)
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionOutcome::Success => f.write_str("Action successful"),
            ActionOutcome::Failure(reason) => write!(f, "Error: {}", reason),
            ActionOutcome::Busy => f.write_str("Action already in progress"),
            ActionOutcome::InvalidInput => f.write_str("Invalid input"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_from_wire() {
        let running: Running = serde_json::from_str("true").unwrap();
        let stopped: Running = serde_json::from_str("false").unwrap();
        let unknown: Running = serde_json::from_str("null").unwrap();

        assert_eq!(running, Running::Running);
        assert_eq!(stopped, Running::Stopped);
        assert_eq!(unknown, Running::Unknown);
        assert!(!unknown.is_running());
        assert_eq!(unknown.label(), UNKNOWN_LABEL);
    }

    #[test]
    fn test_action_codes() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ActionKind::from_code("xyz"), None);
        assert_eq!(ActionKind::SetDaytime.to_string(), "setDaytime");
    }

    #[test]
    fn test_action_kind_traits() {
        assert!(ActionKind::Delete.is_destructive());
        assert!(ActionKind::Regen.is_destructive());
        assert!(!ActionKind::Stop.is_destructive());

        assert_eq!(ActionKind::AddOp.payload_field(), Some("opname"));
        assert_eq!(ActionKind::WhitelistAdd.payload_field(), Some("playername"));
        assert!(!ActionKind::Backup.requires_payload());

        assert!(!ActionKind::Upgrade.is_permission_gated());
        assert!(ActionKind::Start.is_permission_gated());
    }

    #[test]
    fn test_record_from_legacy_json() {
        let json = r#"{
            "uuid": "a1",
            "name": "survival",
            "port": 25565,
            "running": null,
            "flavor": "paper",
            "release": "1.20.2",
            "whitelistenabled": true,
            "players": null,
            "perms": {
                "sta": {"name": "Start", "allowed": true, "reqRunning": false},
                "wea": {"name": "Weather Clear", "allowed": true, "reqRunning": true},
                "zzz": {"allowed": true}
            }
        }"#;

        let record: ServerRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.uuid, ServerId::new("a1"));
        assert_eq!(record.running, Running::Unknown);
        assert!(record.whitelist_enabled);
        assert!(record.players.is_empty());
        assert_eq!(record.permissions.len(), 2);
        assert_eq!(
            record.permissions.get(ActionKind::WeatherClear),
            Some(&PermissionEntry::new(true, true))
        );
    }

    #[test]
    fn test_record_missing_required_field() {
        let json = r#"{"uuid": "a1", "name": "survival", "flavor": "paper", "release": "1.20.2"}"#;
        assert!(serde_json::from_str::<ServerRecord>(json).is_err());
    }

    #[test]
    fn test_online_count_skips_empty_slots() {
        let mut record = ServerRecord::new("a1", "survival", 25565);
        record.players = vec!["alex".into(), "".into(), "steve".into(), "".into()];

        assert_eq!(record.online_count(), 2);
        assert_eq!(
            record.online_players().collect::<Vec<_>>(),
            vec!["alex", "steve"]
        );
    }

    #[test]
    fn test_permission_presets() {
        let player = Permissions::player();
        let op = Permissions::op();
        let owner = Permissions::owner();

        assert!(player.iter().all(|(_, entry)| !entry.allowed));
        assert!(op.get(ActionKind::Backup).unwrap().allowed);
        assert!(!op.get(ActionKind::Start).unwrap().allowed);
        assert!(owner.get(ActionKind::Delete).unwrap().allowed);
        assert!(owner.get(ActionKind::Stop).unwrap().requires_running);
        assert!(!owner.get(ActionKind::Backup).unwrap().requires_running);
    }

    #[test]
    fn test_permissions_serialize_as_codes() {
        let permissions = Permissions::owner();
        let value = serde_json::to_value(&permissions).unwrap();

        assert!(value.get("sta").is_some());
        assert!(value.get("Start").is_none());
    }

    #[test]
    fn test_release_catalog_forms() {
        let json = r#"{
            "paper": {"latest": "1.20.4"},
            "vanilla": {"latest": {"release": "1.20.4", "snapshot": "24w03a"}}
        }"#;

        let catalog: ReleaseCatalog = serde_json::from_str(json).unwrap();
        assert_eq!(catalog.latest("paper"), Some("1.20.4"));
        assert_eq!(catalog.latest("vanilla"), Some("1.20.4"));
        assert_eq!(catalog.latest("spigot"), None);
    }

    #[test]
    fn test_snapshot_kinds() {
        let empty = Snapshot::empty_fleet();
        assert!(empty.is_authenticated());
        assert!(empty.is_empty());
        assert_ne!(empty, Snapshot::Unauthenticated);

        let fleet = Snapshot::fleet(vec![ServerRecord::new("a1", "one", 25565)]);
        assert_eq!(fleet.len(), 1);
    }
}
