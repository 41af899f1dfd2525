use std::{error::Error, fmt::Display};

/// Something went wrong driving the terminal.
#[derive(Debug)]
pub enum RateGuiError {
    /// The terminal could not be read or written.
    IOError(std::io::Error),
}

impl Display for RateGuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IOError(e) => write!(f, "terminal error: {}", e),
        }
    }
}

impl Error for RateGuiError {}

impl From<std::io::Error> for RateGuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}
