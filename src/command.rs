//! Outbound frames. Nothing here validates ranges; callers clamp first.

use serde_json::{json, Map, Value};

/// Free-form `{ "command": name, ...payload }` frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub payload: Map<String, Value>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Map::new(),
        }
    }

    pub fn with_payload(name: impl Into<String>, payload: Option<Map<String, Value>>) -> Self {
        Self {
            name: name.into(),
            payload: payload.unwrap_or_default(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn play_pause() -> Self {
        Self::new("play_pause")
    }

    pub fn next() -> Self {
        Self::new("next")
    }

    pub fn previous() -> Self {
        Self::new("previous")
    }

    pub fn scan_bluetooth() -> Self {
        Self::new("bluetooth_scan")
    }

    pub fn scan_wifi() -> Self {
        Self::new("wifi_scan")
    }

    /// Run a shell command on the host; the result comes back as `command_output`.
    pub fn run(line: impl Into<String>) -> Self {
        Self::new("run").with("cmd", line.into())
    }

    /// Payload keys are spread after `command`, so a payload `command` key wins.
    pub fn encode(&self) -> String {
        let mut frame = Map::with_capacity(self.payload.len() + 1);
        frame.insert("command".to_string(), Value::String(self.name.clone()));
        for (key, value) in &self.payload {
            frame.insert(key.clone(), value.clone());
        }
        Value::Object(frame).to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemTarget {
    Volume,
    Brightness,
}

impl SystemTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            SystemTarget::Volume => "volume",
            SystemTarget::Brightness => "brightness",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemAction {
    Inc,
    Dec,
    Set,
    Mute,
}

impl SystemAction {
    pub fn as_str(self) -> &'static str {
        match self {
            SystemAction::Inc => "inc",
            SystemAction::Dec => "dec",
            SystemAction::Set => "set",
            SystemAction::Mute => "mute",
        }
    }
}

/// Structured `{ "type": "system", "msg_of", "action", "set_to_vol"?, "set_to"? }` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemCommand {
    pub msg_of: SystemTarget,
    pub action: SystemAction,
    pub set_to_vol: Option<u8>,
    pub set_to: Option<u8>,
}

impl SystemCommand {
    pub fn new(msg_of: SystemTarget, action: SystemAction) -> Self {
        Self {
            msg_of,
            action,
            set_to_vol: None,
            set_to: None,
        }
    }

    pub fn volume_up() -> Self {
        Self::new(SystemTarget::Volume, SystemAction::Inc)
    }

    pub fn volume_down() -> Self {
        Self::new(SystemTarget::Volume, SystemAction::Dec)
    }

    pub fn volume_set(level: u8) -> Self {
        Self {
            set_to_vol: Some(level),
            ..Self::new(SystemTarget::Volume, SystemAction::Set)
        }
    }

    pub fn mute_toggle() -> Self {
        Self::new(SystemTarget::Volume, SystemAction::Mute)
    }

    pub fn brightness_up() -> Self {
        Self::new(SystemTarget::Brightness, SystemAction::Inc)
    }

    pub fn brightness_down() -> Self {
        Self::new(SystemTarget::Brightness, SystemAction::Dec)
    }

    pub fn brightness_set(level: u8) -> Self {
        Self {
            set_to: Some(level),
            ..Self::new(SystemTarget::Brightness, SystemAction::Set)
        }
    }

    pub fn encode(&self) -> String {
        let mut frame = json!({
            "type": "system",
            "msg_of": self.msg_of.as_str(),
            "action": self.action.as_str(),
        });
        if let Some(level) = self.set_to_vol {
            frame["set_to_vol"] = json!(level);
        }
        if let Some(level) = self.set_to {
            frame["set_to"] = json!(level);
        }
        frame.to_string()
    }
}

/// Anything the connection manager can send.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Command(Command),
    System(SystemCommand),
}

impl Outbound {
    pub fn encode(&self) -> String {
        match self {
            Outbound::Command(command) => command.encode(),
            Outbound::System(command) => command.encode(),
        }
    }
}

impl From<Command> for Outbound {
    fn from(command: Command) -> Self {
        Outbound::Command(command)
    }
}

impl From<SystemCommand> for Outbound {
    fn from(command: SystemCommand) -> Self {
        Outbound::System(command)
    }
}
