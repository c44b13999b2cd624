// Error taxonomy for the calendar core.
use std::fmt;

#[derive(Debug)]
pub enum CalError {
    /// The input could not be read as calendar text at all.
    MalformedInput(String),
    /// Recurring events of one logical source disagree on their timezone.
    AmbiguousTimezone {
        source_id: String,
        zones: Vec<String>,
    },
    Io(std::io::Error),
}

impl fmt::Display for CalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalError::MalformedInput(msg) => write!(f, "Malformed calendar input: {}", msg),
            CalError::AmbiguousTimezone { source_id, zones } => write!(
                f,
                "Events of '{}' use more than one timezone: {}",
                source_id,
                zones.join(", ")
            ),
            CalError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CalError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CalError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<std::str::Utf8Error> for CalError {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::MalformedInput(e.to_string())
    }
}
