//! Console commands read from stdin.

use std::fmt;
use std::str::FromStr;

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `connect [country]`
    Connect(Option<String>),
    /// `disconnect`
    Disconnect,
    /// `select <country>`
    Select(String),
    /// `status`
    Status,
    /// `servers`
    Servers,
    /// `help`
    Help,
    /// `quit` / `exit`
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (try `help`)", self.0)
    }
}

impl std::error::Error for ParseError {}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(ParseError("empty command".into()));
        };
        let arg = words.next().map(|w| w.to_uppercase());
        if words.next().is_some() {
            return Err(ParseError(format!("too many arguments for `{verb}`")));
        }

        match (verb.to_lowercase().as_str(), arg) {
            ("connect" | "c", country) => Ok(Command::Connect(country)),
            ("disconnect" | "d", None) => Ok(Command::Disconnect),
            ("select" | "s", Some(country)) => Ok(Command::Select(country)),
            ("select" | "s", None) => Err(ParseError("`select` needs a country".into())),
            ("status", None) => Ok(Command::Status),
            ("servers", None) => Ok(Command::Servers),
            ("help" | "?", None) => Ok(Command::Help),
            ("quit" | "exit" | "q", None) => Ok(Command::Quit),
            (other, _) => Err(ParseError(format!("unknown command `{other}`"))),
        }
    }
}

pub const HELP: &str = "\
commands:
  connect [country]   connect (to the selected country by default)
  disconnect          disconnect
  select <country>    change exit country
  status              print the current display
  servers             list exit countries
  quit                shut down";
