use std::error::Error;
use std::fmt;


#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    MissingVariable { name: &'static str },
    /// Zero-based position of the entry; the text itself may hold part of a password.
    MalformedEntry { index: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingVariable { name } => write!(
                f, "ConfigError: environment variable '{name}' is not set"
            ),
            Self::MalformedEntry { index } => write!(
                f, "ConfigError: connection entry #{index} is not of the form 'key:value'"
            ),
        }
    }
}

impl Error for ConfigError {}
