//! Stdin line handling.
//!
//! Lines starting with `/` are commands; anything else non-blank is a chat
//! message for the team on screen.

use ars_client::Command;
use ars_proto::TeamId;

/// What one input line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Forward to the runtime
    Command(Command),
    /// Print a hint and keep reading
    Hint(String),
    /// Blank line
    Nothing,
}

/// Parse one stdin line.
pub fn parse(line: &str) -> Input {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Input::Nothing;
    }

    let Some(cmd) = line.strip_prefix('/') else {
        return Input::Command(Command::Send(line.to_string()));
    };

    let parts: Vec<&str> = cmd.split_whitespace().collect();
    let command = parts.first().copied().unwrap_or("");

    match command {
        "older" => Input::Command(Command::LoadOlder),
        "reload" => Input::Command(Command::Reload),
        "team" => match parts.get(1) {
            Some(team) if parts.len() == 2 => Input::Command(Command::SwitchTeam(TeamId::new(*team))),
            _ => Input::Hint("usage: /team <id>".to_string()),
        },
        "quit" | "q" => Input::Command(Command::Shutdown),
        _ => Input::Hint(format!("unknown command /{command}; try /older, /reload, /team <id>, /quit")),
    }
}
