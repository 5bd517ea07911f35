pub const HELP_TEXT: &str = "Available Commands:
- exit: Exit the chat
- help: Show this help message
- clear: Clear the screen
- rescan: Rescan current directory

The assistant has access to files in your current directory.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Exit,
    Help,
    Clear,
    Rescan,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Exit => "exit",
            Self::Help => "help",
            Self::Clear => "clear",
            Self::Rescan => "rescan",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Command(Command),
    Chat(String),
}

/// Classifies one line of user input.
///
/// A command is the whole trimmed line, matched case-insensitively, with an
/// optional leading `/`. Anything else, including unknown `/words`, is chat.
pub fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }

    let word = trimmed.strip_prefix('/').unwrap_or(trimmed);
    let command = match word.to_ascii_lowercase().as_str() {
        "exit" => Some(Command::Exit),
        "help" => Some(Command::Help),
        "clear" => Some(Command::Clear),
        "rescan" => Some(Command::Rescan),
        _ => None,
    };

    match command {
        Some(command) => Input::Command(command),
        None => Input::Chat(trimmed.to_string()),
    }
}
