//! Control command parsing.
//!
//! Commands follow the chat-bot convention `!name args`; the `!` prefix is
//! optional on a dedicated control connection.

/// Command prefix.
pub const PREFIX: char = '!';

/// A parsed control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Greeting.
    Hi,
    /// Start monitoring the given feed link.
    Monitor(String),
    /// Stop the caller's monitor.
    Stop,
    /// Show help message.
    Help,
    /// Close the control connection.
    Quit,
    /// Unknown command.
    Unknown(String),
}

impl Command {
    /// Get the command name.
    pub fn name(&self) -> &str {
        match self {
            Command::Hi => "hi",
            Command::Monitor(_) => "monitor",
            Command::Stop => "stop",
            Command::Help => "help",
            Command::Quit => "quit",
            Command::Unknown(cmd) => cmd,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Monitor(link) if !link.is_empty() => write!(f, "{PREFIX}monitor {link}"),
            other => write!(f, "{PREFIX}{}", other.name()),
        }
    }
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(input: &str) -> Option<Command> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix(PREFIX).unwrap_or(trimmed).trim_start();
    if trimmed.is_empty() {
        return None;
    }

    let (cmd, args) = match trimmed.find(char::is_whitespace) {
        Some(pos) => (&trimmed[..pos], trimmed[pos..].trim()),
        None => (trimmed, ""),
    };

    let command = match cmd.to_lowercase().as_str() {
        "hi" | "hello" => Command::Hi,
        "monitor" | "watch" => Command::Monitor(args.to_string()),
        "stop" => Command::Stop,
        "help" | "h" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(cmd.to_string()),
    };

    Some(command)
}

/// Command information for help display.
pub struct CommandInfo {
    /// Command name.
    pub name: &'static str,
    /// Command syntax.
    pub syntax: &'static str,
    /// Command description.
    pub description: &'static str,
}

/// Get all available command information.
pub fn get_command_help() -> Vec<CommandInfo> {
    vec![
        CommandInfo {
            name: "hi",
            syntax: "!hi",
            description: "An amicable greeting.",
        },
        CommandInfo {
            name: "monitor",
            syntax: "!monitor <feed link>",
            description: "Receive live notifications for newly posted listings.",
        },
        CommandInfo {
            name: "stop",
            syntax: "!stop",
            description: "Stops monitoring your feed.",
        },
        CommandInfo {
            name: "help",
            syntax: "!help",
            description: "Show this list.",
        },
        CommandInfo {
            name: "quit",
            syntax: "!quit",
            description: "Close this connection. Monitoring continues.",
        },
    ]
}

/// Format the help message for display.
pub fn format_help() -> String {
    get_command_help()
        .iter()
        .map(|info| format!("{:<22} {}", info.syntax, info.description))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_blank() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("   "), None);
        assert_eq!(parse_command("!"), None);
    }

    #[test]
    fn test_parse_hi() {
        assert_eq!(parse_command("!hi"), Some(Command::Hi));
        assert_eq!(parse_command("hi"), Some(Command::Hi));
        assert_eq!(parse_command("  !HELLO "), Some(Command::Hi));
    }

    #[test]
    fn test_parse_monitor_with_link() {
        assert_eq!(
            parse_command("!monitor https://www.grailed.com/feed/abc"),
            Some(Command::Monitor("https://www.grailed.com/feed/abc".to_string()))
        );
        assert_eq!(
            parse_command("watch\thttps://x.test/feed  "),
            Some(Command::Monitor("https://x.test/feed".to_string()))
        );
    }

    #[test]
    fn test_parse_monitor_without_link() {
        assert_eq!(
            parse_command("!monitor"),
            Some(Command::Monitor(String::new()))
        );
    }

    #[test]
    fn test_parse_stop_help_quit() {
        assert_eq!(parse_command("!stop"), Some(Command::Stop));
        assert_eq!(parse_command("!Stop"), Some(Command::Stop));
        assert_eq!(parse_command("!?"), Some(Command::Help));
        assert_eq!(parse_command("help"), Some(Command::Help));
        assert_eq!(parse_command("!exit"), Some(Command::Quit));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            parse_command("!dance now"),
            Some(Command::Unknown("dance".to_string()))
        );
    }

    #[test]
    fn test_command_display() {
        assert_eq!(Command::Hi.to_string(), "!hi");
        assert_eq!(
            Command::Monitor("https://x.test".to_string()).to_string(),
            "!monitor https://x.test"
        );
        assert_eq!(Command::Monitor(String::new()).to_string(), "!monitor");
        assert_eq!(Command::Unknown("foo".to_string()).to_string(), "!foo");
    }

    #[test]
    fn test_format_help() {
        let help = format_help();
        for info in get_command_help() {
            assert!(help.contains(info.syntax), "missing {}", info.name);
        }
        assert!(help.contains("Stops monitoring your feed."));
    }
}
