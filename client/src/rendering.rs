use crate::permissions::ActionStates;
use crate::reconcile::Effect;
use crate::store::{render_fields, Field, RenderedFields, Session};
use log::debug;
use shared::{ActionKind, ActionOutcome, ActionRequest, ServerId};
use std::collections::BTreeMap;
use std::io::Write;

/// Text form of one server card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub fields: RenderedFields,
    pub buttons: ActionStates,
}

impl Card {
    fn field(&self, field: Field) -> &str {
        self.fields.get(&field).map(String::as_str).unwrap_or_default()
    }

    fn enabled_actions(&self) -> Vec<&'static str> {
        ActionKind::ALL
            .into_iter()
            .filter(|kind| self.buttons.get(kind).copied().unwrap_or(false))
            .map(|kind| kind.label())
            .collect()
    }

    fn summary(&self, uuid: &ServerId) -> String {
        let mut release = format!("{} {}", self.field(Field::Flavor), self.field(Field::Release));
        if self.buttons.get(&ActionKind::Upgrade).copied().unwrap_or(false) {
            release.push_str(" (upgrade available)");
        }

        let mut text = format!(
            "{} [{}] {}  {}\n  {} | online {} | {}\n  actions: {}",
            self.field(Field::Name),
            uuid,
            self.field(Field::Address),
            self.field(Field::Running),
            self.field(Field::Motd),
            self.field(Field::Online),
            release,
            self.enabled_actions().join(", "),
        );

        let players = self.field(Field::Players);
        if !players.is_empty() {
            text.push_str("\n  players: ");
            text.push_str(&players.replace('\n', ", "));
        }

        text
    }
}

/// Terminal renderer. Applies effects to its own copy of every card and
/// queues one output line per visible change.
pub struct Renderer {
    cards: BTreeMap<ServerId, Card>,
    output: Vec<String>,
    echo: bool,
}

impl Renderer {
    /// With `echo` off, output is only queued for `take_output`.
    pub fn new(echo: bool) -> Self {
        Self {
            cards: BTreeMap::new(),
            output: Vec::new(),
            echo,
        }
    }

    pub fn card(&self, uuid: &ServerId) -> Option<&Card> {
        self.cards.get(uuid)
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    /// Applies effects strictly in emission order.
    pub fn apply(&mut self, effects: &[Effect]) {
        for effect in effects {
            self.apply_one(effect);
        }
    }

    fn apply_one(&mut self, effect: &Effect) {
        match effect {
            Effect::Create {
                uuid,
                record,
                actions,
            } => {
                let card = Card {
                    fields: render_fields(record),
                    buttons: actions.clone(),
                };
                self.output.push(format!("[+] {}", card.summary(uuid)));
                self.cards.insert(uuid.clone(), card);
            }

            Effect::Update { uuid, field, value } => {
                let Some(card) = self.cards.get_mut(uuid) else {
                    debug!("Update for unknown card {}", uuid);
                    return;
                };
                card.fields.insert(*field, value.clone());
                let shown = value.replace('\n', ", ");
                self.output
                    .push(format!("[~] {} {}: {}", uuid, field.label(), shown));
            }

            Effect::ButtonState {
                uuid,
                kind,
                enabled,
            } => {
                let Some(card) = self.cards.get_mut(uuid) else {
                    debug!("Button state for unknown card {}", uuid);
                    return;
                };
                card.buttons.insert(*kind, *enabled);
                let state = if *enabled { "enabled" } else { "disabled" };
                self.output
                    .push(format!("[~] {} {} {}", uuid, kind.label(), state));
            }

            Effect::Remove { uuid } => {
                if let Some(card) = self.cards.remove(uuid) {
                    self.output
                        .push(format!("[-] {} [{}] removed", card.field(Field::Name), uuid));
                }
            }

            Effect::RemoveAll => {
                self.cards.clear();
                self.output.push("[-] Signed out, all servers cleared".to_string());
            }
        }
    }

    pub fn toast(&mut self, request: &ActionRequest, name: &str, outcome: &ActionOutcome) {
        let marker = if outcome.is_success() { "ok" } else { "!!" };
        self.output.push(format!(
            "[{}] {} on {}: {}",
            marker,
            request.kind.label(),
            name,
            outcome
        ));
    }

    pub fn notice(&mut self, message: String) {
        self.output.push(format!("[!] {}", message));
    }

    pub fn print(&mut self, text: String) {
        self.output.push(text);
    }

    /// The whole board, or the empty-state message for `session`.
    pub fn board(&self, session: Session) -> String {
        if self.cards.is_empty() {
            return match session {
                Session::Unknown => "Loading servers...",
                Session::Authenticated => "No servers yet.",
                Session::Unauthenticated => "Log in to see your servers.",
            }
            .to_string();
        }

        self.cards
            .iter()
            .map(|(uuid, card)| card.summary(uuid))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    /// Writes queued output to stdout when echo is on.
    pub fn flush(&mut self) {
        let lines = self.take_output();
        if !self.echo || lines.is_empty() {
            return;
        }

        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        for line in lines {
            if writeln!(handle, "{}", line).is_err() {
                return;
            }
        }
        let _ = handle.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Permissions, Running, ServerRecord};

    fn create(uuid: &str, name: &str) -> Effect {
        let mut record = ServerRecord::new(uuid, name, 25565);
        record.host = "127.0.0.1".into();
        record.running = Running::Running;
        record.permissions = Permissions::owner();
        let mut actions = ActionStates::new();
        actions.insert(ActionKind::Stop, true);
        actions.insert(ActionKind::Start, false);
        Effect::Create {
            uuid: uuid.into(),
            record: Box::new(record),
            actions,
        }
    }

    #[test]
    fn test_create_then_update_in_order() {
        let mut renderer = Renderer::new(false);
        renderer.apply(&[
            create("a1", "survival"),
            Effect::Update {
                uuid: "a1".into(),
                field: Field::Motd,
                value: "hello".into(),
            },
            Effect::ButtonState {
                uuid: "a1".into(),
                kind: ActionKind::Start,
                enabled: true,
            },
        ]);

        let card = renderer.card(&"a1".into()).unwrap();
        assert_eq!(card.field(Field::Motd), "hello");
        assert_eq!(card.buttons.get(&ActionKind::Start), Some(&true));
        assert_eq!(renderer.take_output().len(), 3);
    }

    #[test]
    fn test_remove_and_remove_all() {
        let mut renderer = Renderer::new(false);
        renderer.apply(&[create("a1", "survival"), create("b2", "creative")]);
        renderer.apply(&[Effect::Remove { uuid: "a1".into() }]);
        assert_eq!(renderer.card_count(), 1);

        renderer.apply(&[Effect::RemoveAll]);
        assert_eq!(renderer.card_count(), 0);
    }

    #[test]
    fn test_board_empty_states() {
        let renderer = Renderer::new(false);
        assert_eq!(renderer.board(Session::Unknown), "Loading servers...");
        assert_eq!(renderer.board(Session::Authenticated), "No servers yet.");
        assert_eq!(
            renderer.board(Session::Unauthenticated),
            "Log in to see your servers."
        );
    }

    #[test]
    fn test_board_lists_enabled_actions() {
        let mut renderer = Renderer::new(false);
        renderer.apply(&[create("a1", "survival")]);

        let board = renderer.board(Session::Authenticated);
        assert!(board.starts_with("survival [a1] 127.0.0.1:25565  Running"));
        assert!(board.contains("actions: Stop"));
        assert!(!board.contains("Start"));
    }

    #[test]
    fn test_toast_marks_failures() {
        let mut renderer = Renderer::new(false);
        let request = ActionRequest::new("a1", ActionKind::Backup);

        renderer.toast(&request, "survival", &ActionOutcome::Success);
        renderer.toast(&request, "survival", &ActionOutcome::Failure("disk full".into()));

        assert_eq!(
            renderer.take_output(),
            vec![
                "[ok] Backup on survival: Action successful".to_string(),
                "[!!] Backup on survival: Error: disk full".to_string(),
            ]
        );
    }
}
