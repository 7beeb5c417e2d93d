//! Single source of truth for whether an action is available on a server.
//!
//! Everything here is pure: the answer depends only on the record and the release
//! catalog, never on what was previously shown.

use shared::{ActionKind, ReleaseCatalog, ServerRecord};
use std::collections::BTreeMap;

/// Enabled/disabled decision for every action kind of one server.
pub type ActionStates = BTreeMap<ActionKind, bool>;

/// Returns whether `kind` may currently be requested on `record`.
///
/// Missing permission entries, an unknown running state and a catalog without the
/// server's flavor all resolve to `false`.
pub fn is_enabled(record: &ServerRecord, kind: ActionKind, catalog: &ReleaseCatalog) -> bool {
    if kind.is_permission_gated() {
        is_permitted(record, kind)
    } else {
        upgrade_available(record, catalog)
    }
}

/// Permission-map check for gated kinds. Always `false` for `upgrade`.
pub fn is_permitted(record: &ServerRecord, kind: ActionKind) -> bool {
    if !kind.is_permission_gated() {
        return false;
    }

    match record.permissions.get(kind) {
        Some(entry) => entry.allowed && (!entry.requires_running || record.running.is_running()),
        None => false,
    }
}

pub fn upgrade_available(record: &ServerRecord, catalog: &ReleaseCatalog) -> bool {
    catalog
        .latest(&record.flavor)
        .map_or(false, |latest| latest != record.release)
}

/// Evaluates every kind at once.
///
/// With no catalog loaded, `upgrade` is left out so callers can keep whatever they
/// showed before.
pub fn evaluate(record: &ServerRecord, catalog: Option<&ReleaseCatalog>) -> ActionStates {
    ActionKind::ALL
        .into_iter()
        .filter_map(|kind| {
            if kind.is_permission_gated() {
                Some((kind, is_permitted(record, kind)))
            } else {
                catalog.map(|catalog| (kind, upgrade_available(record, catalog)))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{PermissionEntry, Permissions, Running};

    fn record(running: Running, permissions: Permissions) -> ServerRecord {
        let mut record = ServerRecord::new("a1", "survival", 25565);
        record.running = running;
        record.permissions = permissions;
        record
    }

    fn paper_catalog() -> ReleaseCatalog {
        let mut catalog = ReleaseCatalog::new();
        catalog.insert("paper", "1.20.4");
        catalog
    }

    #[test]
    fn test_start_enabled_stop_disabled_when_stopped() {
        let permissions: Permissions = [
            (ActionKind::Start, PermissionEntry::new(true, false)),
            (ActionKind::Stop, PermissionEntry::new(true, true)),
        ]
        .into_iter()
        .collect();
        let server = record(Running::Stopped, permissions);
        let catalog = ReleaseCatalog::new();

        assert!(is_enabled(&server, ActionKind::Start, &catalog));
        assert!(!is_enabled(&server, ActionKind::Stop, &catalog));
    }

    #[test]
    fn test_requires_running_fails_closed() {
        let catalog = ReleaseCatalog::new();

        for running in [Running::Stopped, Running::Unknown] {
            let server = record(running, Permissions::owner());
            for (kind, entry) in server.permissions.iter() {
                if entry.requires_running {
                    assert!(!is_enabled(&server, kind, &catalog), "{} enabled", kind);
                }
            }
        }
    }

    #[test]
    fn test_running_server_with_owner_permissions() {
        let server = record(Running::Running, Permissions::owner());
        let catalog = ReleaseCatalog::new();

        assert!(is_enabled(&server, ActionKind::WeatherClear, &catalog));
        assert!(is_enabled(&server, ActionKind::Stop, &catalog));
        assert!(is_enabled(&server, ActionKind::Backup, &catalog));
    }

    #[test]
    fn test_not_allowed_stays_disabled() {
        let server = record(Running::Running, Permissions::player());
        let catalog = ReleaseCatalog::new();

        for kind in ActionKind::ALL {
            assert!(!is_enabled(&server, kind, &catalog));
        }
    }

    #[test]
    fn test_missing_entry_is_disabled() {
        let server = record(Running::Running, Permissions::new());
        assert!(!is_permitted(&server, ActionKind::Backup));
    }

    #[test]
    fn test_upgrade_against_catalog() {
        let mut server = record(Running::Running, Permissions::new());
        server.flavor = "paper".into();
        server.release = "1.20.2".into();
        let catalog = paper_catalog();

        assert!(is_enabled(&server, ActionKind::Upgrade, &catalog));

        server.release = "1.20.4".into();
        assert!(!is_enabled(&server, ActionKind::Upgrade, &catalog));

        server.flavor = "vanilla".into();
        server.release = "1.19".into();
        assert!(!is_enabled(&server, ActionKind::Upgrade, &catalog));
    }

    #[test]
    fn test_upgrade_ignores_permission_map() {
        let mut permissions = Permissions::new();
        permissions.insert(ActionKind::Upgrade, PermissionEntry::new(true, false));
        let server = record(Running::Running, permissions);

        assert!(!is_permitted(&server, ActionKind::Upgrade));
    }

    #[test]
    fn test_evaluate_without_catalog_omits_upgrade() {
        let server = record(Running::Running, Permissions::owner());

        let states = evaluate(&server, None);
        assert_eq!(states.len(), ActionKind::ALL.len() - 1);
        assert!(!states.contains_key(&ActionKind::Upgrade));

        let states = evaluate(&server, Some(&paper_catalog()));
        assert_eq!(states.len(), ActionKind::ALL.len());
    }
}
