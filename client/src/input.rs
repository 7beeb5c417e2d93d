//! Operator input parsing with confirmation for destructive actions

use crate::store::ViewStore;
use shared::{ActionKind, ActionRequest};

pub const HELP: &str = "\
Commands:
  start|stop|save|backup|day|weather|upgrade <uuid>
  delete|regen <uuid>        (asks for confirmation)
  op <uuid> <player>         grant operator status
  whitelist <uuid> <player>  add a player to the whitelist
  refresh                    fetch the server list now
  list                       show all servers
  help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Action(ActionRequest),
    Refresh,
    List,
    Help,
    Quit,
}

/// What the sync loop should do with one line of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Command(Command),
    /// A destructive action is waiting for a yes/no answer.
    ConfirmPrompt(String),
    Cancelled(ActionRequest),
    Invalid(String),
    Empty,
}

/// Parses one command line. Payload-carrying actions parse without their
/// argument so the dispatcher can report the missing input.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("Empty command".to_string());
    };
    let verb = verb.to_ascii_lowercase();

    match verb.as_str() {
        "refresh" => return Ok(Command::Refresh),
        "list" | "ls" => return Ok(Command::List),
        "help" | "?" => return Ok(Command::Help),
        "quit" | "exit" => return Ok(Command::Quit),
        _ => {}
    }

    let kind = action_for_verb(&verb).ok_or_else(|| format!("Unknown command '{}'", verb))?;
    let uuid = words
        .next()
        .ok_or_else(|| format!("Usage: {} <uuid>", verb))?;

    let mut request = ActionRequest::new(uuid, kind);
    if kind.requires_payload() {
        let rest: Vec<&str> = words.collect();
        if !rest.is_empty() {
            request = request.with_payload(rest.join(" "));
        }
    }

    Ok(Command::Action(request))
}

fn action_for_verb(verb: &str) -> Option<ActionKind> {
    let kind = match verb {
        "start" => ActionKind::Start,
        "stop" => ActionKind::Stop,
        "save" => ActionKind::Save,
        "backup" => ActionKind::Backup,
        "delete" => ActionKind::Delete,
        "regen" => ActionKind::Regen,
        "day" => ActionKind::SetDaytime,
        "weather" => ActionKind::WeatherClear,
        "upgrade" => ActionKind::Upgrade,
        "op" => ActionKind::AddOp,
        "whitelist" => ActionKind::WhitelistAdd,
        // The wire codes are accepted too
        code => return ActionKind::from_code(code),
    };
    Some(kind)
}

/// Turns lines into commands, holding back destructive actions until confirmed.
#[derive(Debug, Default)]
pub struct InputManager {
    awaiting_confirmation: Option<ActionRequest>,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_awaiting_confirmation(&self) -> bool {
        self.awaiting_confirmation.is_some()
    }

    pub fn handle_line(&mut self, line: &str, store: &ViewStore) -> InputEvent {
        let line = line.trim();

        if let Some(request) = self.awaiting_confirmation.take() {
            return match line.to_ascii_lowercase().as_str() {
                "y" | "yes" => InputEvent::Command(Command::Action(request)),
                _ => InputEvent::Cancelled(request),
            };
        }

        if line.is_empty() {
            return InputEvent::Empty;
        }

        match parse_command(line) {
            Ok(Command::Action(request)) if request.kind.is_destructive() => {
                let name = store
                    .get(&request.uuid)
                    .map(|entry| entry.name().to_string())
                    .unwrap_or_else(|| request.uuid.to_string());
                let prompt = confirmation_prompt(request.kind, &name);
                self.awaiting_confirmation = Some(request);
                InputEvent::ConfirmPrompt(prompt)
            }
            Ok(command) => InputEvent::Command(command),
            Err(reason) => InputEvent::Invalid(reason),
        }
    }
}

fn confirmation_prompt(kind: ActionKind, name: &str) -> String {
    let question = match kind {
        ActionKind::Regen => format!("Regenerate the world of {}?", name),
        _ => format!("{} {}?", kind.label(), name),
    };
    format!("{} THIS CANNOT BE UNDONE !!! [y/N]", question)
}
