//! Text control intents typed at the dashboard prompt.

use crate::command::{Command, Outbound, SystemCommand};

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Send(Outbound),
    AddTodo(String),
    ToggleTodo(u64),
    Quit,
}

pub const HELP: &str = "play | next | prev | vol+ | vol- | vol <0-100> | mute | \
bri+ | bri- | bri <0-100> | run <cmd> | bt | wifi | todo <text> | done <id> | quit";

/// Parse one line. `None` for blank or unrecognised input.
pub fn parse(line: &str) -> Option<Intent> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let send = |outbound: Outbound| Some(Intent::Send(outbound));
    match word {
        "play" | "pause" => send(Command::play_pause().into()),
        "next" => send(Command::next().into()),
        "prev" => send(Command::previous().into()),
        "vol+" => send(SystemCommand::volume_up().into()),
        "vol-" => send(SystemCommand::volume_down().into()),
        "vol" => send(SystemCommand::volume_set(clamp_level(rest)?).into()),
        "mute" => send(SystemCommand::mute_toggle().into()),
        "bri+" => send(SystemCommand::brightness_up().into()),
        "bri-" => send(SystemCommand::brightness_down().into()),
        "bri" => send(SystemCommand::brightness_set(clamp_level(rest)?).into()),
        "run" if !rest.is_empty() => send(Command::run(rest).into()),
        "bt" => send(Command::scan_bluetooth().into()),
        "wifi" => send(Command::scan_wifi().into()),
        "todo" if !rest.is_empty() => Some(Intent::AddTodo(rest.to_string())),
        "done" => rest.parse().ok().map(Intent::ToggleTodo),
        "quit" | "exit" => Some(Intent::Quit),
        _ => None,
    }
}

/// Levels are clamped here, before encoding.
fn clamp_level(raw: &str) -> Option<u8> {
    let value: i64 = raw.parse().ok()?;
    Some(value.clamp(0, 100) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_controls() {
        assert_eq!(parse("next"), Some(Intent::Send(Command::next().into())));
        assert_eq!(parse("  prev "), Some(Intent::Send(Command::previous().into())));
    }

    #[test]
    fn levels_are_clamped_before_encoding() {
        assert_eq!(
            parse("vol 150"),
            Some(Intent::Send(SystemCommand::volume_set(100).into()))
        );
        assert_eq!(
            parse("bri -4"),
            Some(Intent::Send(SystemCommand::brightness_set(0).into()))
        );
        assert_eq!(parse("vol loud"), None);
    }

    #[test]
    fn run_keeps_the_whole_command_line() {
        assert_eq!(
            parse("run ls -la /tmp"),
            Some(Intent::Send(Command::run("ls -la /tmp").into()))
        );
        assert_eq!(parse("run"), None);
    }

    #[test]
    fn todos_and_quit() {
        assert_eq!(parse("todo buy milk"), Some(Intent::AddTodo("buy milk".to_string())));
        assert_eq!(parse("done 3"), Some(Intent::ToggleTodo(3)));
        assert_eq!(parse("quit"), Some(Intent::Quit));
        assert_eq!(parse(""), None);
        assert_eq!(parse("dance"), None);
    }
}
