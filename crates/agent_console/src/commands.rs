#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Connect { project: String },
    Disconnect,
    Code { source: String },
    Resize { rows: u16, cols: u16 },
    Run { project: String },
    Pin { turn: u64, event: usize },
    Unpin { id: String },
    Widgets,
    Help,
    Quit,
    /// Recognized command with missing or invalid arguments.
    Usage(&'static str),
    Unknown(String),
}

pub const HELP_TEXT: &str = "Commands: /connect <project>, /disconnect, /code <source>, /resize <rows> <cols>, /run <project>, /pin <turn> <event>, /unpin <id>, /widgets, /help, /quit. Anything else is sent as a message.";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (command, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (trimmed, ""),
    };

    let parsed = match command {
        "/connect" => single_arg(rest)
            .map(|project| SlashCommand::Connect { project })
            .unwrap_or(SlashCommand::Usage("/connect <project>")),
        "/disconnect" => SlashCommand::Disconnect,
        "/code" if !rest.is_empty() => SlashCommand::Code {
            source: rest.to_string(),
        },
        "/code" => SlashCommand::Usage("/code <source>"),
        "/resize" => parse_resize(rest).unwrap_or(SlashCommand::Usage("/resize <rows> <cols>")),
        "/run" => single_arg(rest)
            .map(|project| SlashCommand::Run { project })
            .unwrap_or(SlashCommand::Usage("/run <project>")),
        "/pin" => parse_pin(rest).unwrap_or(SlashCommand::Usage("/pin <turn> <event>")),
        "/unpin" => single_arg(rest)
            .map(|id| SlashCommand::Unpin { id })
            .unwrap_or(SlashCommand::Usage("/unpin <id>")),
        "/widgets" => SlashCommand::Widgets,
        "/help" => SlashCommand::Help,
        "/quit" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command.to_string()),
    };

    Some(parsed)
}

fn single_arg(rest: &str) -> Option<String> {
    let mut parts = rest.split_whitespace();
    let value = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some(value.to_string())
}

fn parse_resize(rest: &str) -> Option<SlashCommand> {
    let mut parts = rest.split_whitespace();
    let rows = parts.next()?.parse().ok()?;
    let cols = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(SlashCommand::Resize { rows, cols })
}

fn parse_pin(rest: &str) -> Option<SlashCommand> {
    let mut parts = rest.split_whitespace();
    let turn = parts.next()?.parse().ok()?;
    let event: usize = parts.next()?.parse().ok()?;
    if event == 0 || parts.next().is_some() {
        return None;
    }
    Some(SlashCommand::Pin { turn, event })
}

#[cfg(test)]
mod tests {
    use super::{parse_slash_command, SlashCommand};

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse_slash_command("show revenue by region"), None);
    }

    #[test]
    fn commands_with_arguments_parse() {
        assert_eq!(
            parse_slash_command("/connect sales"),
            Some(SlashCommand::Connect {
                project: "sales".to_string()
            })
        );
        assert_eq!(
            parse_slash_command("/code print(1 + 1)"),
            Some(SlashCommand::Code {
                source: "print(1 + 1)".to_string()
            })
        );
        assert_eq!(
            parse_slash_command("/resize 40 120"),
            Some(SlashCommand::Resize {
                rows: 40,
                cols: 120
            })
        );
        assert_eq!(
            parse_slash_command("/pin 3 2"),
            Some(SlashCommand::Pin { turn: 3, event: 2 })
        );
    }

    #[test]
    fn bad_arguments_report_usage() {
        assert_eq!(
            parse_slash_command("/resize tall wide"),
            Some(SlashCommand::Usage("/resize <rows> <cols>"))
        );
        assert_eq!(
            parse_slash_command("/pin 3 0"),
            Some(SlashCommand::Usage("/pin <turn> <event>"))
        );
        assert_eq!(
            parse_slash_command("/connect"),
            Some(SlashCommand::Usage("/connect <project>"))
        );
    }

    #[test]
    fn unknown_command_is_reported() {
        assert_eq!(
            parse_slash_command("/frobnicate now"),
            Some(SlashCommand::Unknown("/frobnicate".to_string()))
        );
    }
}
