//! Command parsing for prefixed chat lines.
//!
//! A line is a command when, after trimming, it starts with exactly one
//! prefix character followed by something other than the prefix or
//! whitespace. `.`, `...` and `  ...  ` are ordinary chat. Arguments are
//! whitespace separated with no quoting, so an argument can never contain
//! a space.

/// Default command prefix.
pub const DEFAULT_PREFIX: char = '.';

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: Vec<String>,
}

/// Parse `text` as a command using `prefix`.
///
/// ```
/// use purplebot::bus::parse_command;
///
/// let cmd = parse_command("  .test    arg  ", '.').unwrap();
/// assert_eq!(cmd.name, "test");
/// assert_eq!(cmd.args, vec!["arg"]);
///
/// assert!(parse_command("...", '.').is_none());
/// ```
pub fn parse_command(text: &str, prefix: char) -> Option<ParsedCommand> {
    let trimmed = text.trim();
    let rest = trimmed.strip_prefix(prefix)?;

    match rest.chars().next() {
        Some(c) if c != prefix && !c.is_whitespace() => {}
        _ => return None,
    }

    let mut words = rest.split_whitespace();
    let name = words.next()?.to_string();
    let args = words.map(str::to_string).collect();

    Some(ParsedCommand { name, args })
}
