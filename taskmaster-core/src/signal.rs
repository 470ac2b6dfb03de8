use std::fmt;
use std::str::FromStr;

/// Symbolic stop signal accepted in program specs.
///
/// Bare names only (`TERM`, not `SIGTERM`) are canonical; a leading `SIG`
/// is stripped when parsing so either spelling is accepted in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Term,
    Int,
    Quit,
    Kill,
    Hup,
    Usr1,
    Usr2,
    Abrt,
}

impl Signal {
    pub const ALL: [Signal; 8] = [
        Signal::Term,
        Signal::Int,
        Signal::Quit,
        Signal::Kill,
        Signal::Hup,
        Signal::Usr1,
        Signal::Usr2,
        Signal::Abrt,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Signal::Term => "TERM",
            Signal::Int => "INT",
            Signal::Quit => "QUIT",
            Signal::Kill => "KILL",
            Signal::Hup => "HUP",
            Signal::Usr1 => "USR1",
            Signal::Usr2 => "USR2",
            Signal::Abrt => "ABRT",
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Signal::Term
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error returned when a string does not name one of the eight supported signals.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown signal name '{0}' (expected one of TERM, INT, QUIT, KILL, HUP, USR1, USR2, ABRT)")]
pub struct UnknownSignalName(pub String);

impl FromStr for Signal {
    type Err = UnknownSignalName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let stripped = upper.strip_prefix("SIG").unwrap_or(&upper);
        match stripped {
            "TERM" => Ok(Signal::Term),
            "INT" => Ok(Signal::Int),
            "QUIT" => Ok(Signal::Quit),
            "KILL" => Ok(Signal::Kill),
            "HUP" => Ok(Signal::Hup),
            "USR1" => Ok(Signal::Usr1),
            "USR2" => Ok(Signal::Usr2),
            "ABRT" => Ok(Signal::Abrt),
            _ => Err(UnknownSignalName(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_names_case_insensitively() {
        assert_eq!("term".parse::<Signal>().unwrap(), Signal::Term);
        assert_eq!("Kill".parse::<Signal>().unwrap(), Signal::Kill);
    }

    #[test]
    fn parses_sig_prefixed_names() {
        assert_eq!("SIGTERM".parse::<Signal>().unwrap(), Signal::Term);
    }

    #[test]
    fn rejects_unknown_names() {
        assert!("BOGUS".parse::<Signal>().is_err());
    }

    #[test]
    fn default_is_term() {
        assert_eq!(Signal::default(), Signal::Term);
    }
}
