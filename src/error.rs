//! Errors that can come out of a rating session. Each collaborator of the
//! [controller](crate::controller) has its own error type, and
//! [SessionError] wraps all of them for the controller's entry points.

use std::{
    borrow::Cow,
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

/// Returned when a rating port cannot be opened.
///
/// Failures while closing a port are never surfaced; they are logged and
/// swallowed by the port itself.
#[derive(Debug)]
pub struct ConnectionError {
    /// The identifier the caller tried to open.
    pub port: String,
    /// What the platform told us.
    pub error: io::Error,
}

impl ConnectionError {
    /// Wrap an io error that happened while opening `port`.
    pub fn new(port: impl Into<String>, error: io::Error) -> Self {
        Self {
            port: port.into(),
            error,
        }
    }
}

impl Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not open port {}: {}", self.port, self.error)
    }
}

impl Error for ConnectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

/// Things that can go wrong while opening or streaming the stimulus.
#[derive(Debug)]
pub enum PlaybackError {
    /// The resource is missing or could not be read.
    Unreadable(PathBuf, io::Error),

    /// The resource is not uncompressed PCM that we know how to stream.
    Unsupported(PathBuf, String),

    /// hound choked on the resource after it was opened.
    Decode(hound::Error),

    /// The output sink could not be brought up.
    Sink(String),
}

impl Display for PlaybackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use PlaybackError as PE;
        let msg = match self {
            PE::Unreadable(path, error) => {
                Cow::from(format!("cannot read {}: {}", path.display(), error))
            }
            PE::Unsupported(path, why) => {
                Cow::from(format!("unsupported audio in {}: {}", path.display(), why))
            }
            PE::Decode(error) => Cow::from(format!("decode error: {}", error)),
            PE::Sink(why) => Cow::from(format!("audio output unavailable: {}", why)),
        };

        write!(f, "{}", msg)
    }
}

impl Error for PlaybackError {}

impl From<hound::Error> for PlaybackError {
    fn from(value: hound::Error) -> Self {
        Self::Decode(value)
    }
}

/// The controller was asked to do something its current state forbids.
/// None of these change any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationError {
    /// `start()` without an output destination.
    NoDestination,

    /// `start()` without an open rating port.
    PortNotOpen,

    /// Rebinding the port or starting again while a session is running.
    SessionRunning,

    /// `stop()` while no session is running.
    NotRunning,

    /// The controller has been cancelled and accepts nothing further.
    Cancelled,
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ConfigurationError as CE;
        let msg = match self {
            CE::NoDestination => "please select a file to write the data into",
            CE::PortNotOpen => {
                "please choose the serial port of the rating device; \
                 disconnecting and reconnecting it shows which one it is"
            }
            CE::SessionRunning => "a session is already running",
            CE::NotRunning => "no session is running",
            CE::Cancelled => "the session controller has been shut down",
        };

        write!(f, "{}", msg)
    }
}

impl Error for ConfigurationError {}

/// Writing the session log failed part way or up front.
#[derive(Debug)]
pub struct PersistenceError {
    /// Where we were trying to write.
    pub path: PathBuf,
    /// Records that made it to the file before the failure.
    pub written: usize,
    /// The underlying failure.
    pub error: io::Error,
}

impl Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed writing {} after {} records: {}",
            self.path.display(),
            self.written,
            self.error
        )
    }
}

impl Error for PersistenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

/// Everything a [controller](crate::controller::SessionController) entry
/// point can hand back to the presentation layer.
#[derive(Debug)]
pub enum SessionError {
    /// See [ConnectionError].
    Connection(ConnectionError),
    /// See [PlaybackError].
    Playback(PlaybackError),
    /// See [ConfigurationError].
    Configuration(ConfigurationError),
    /// See [PersistenceError].
    Persistence(PersistenceError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(error) => write!(f, "{}", error),
            Self::Playback(error) => write!(f, "{}", error),
            Self::Configuration(error) => write!(f, "{}", error),
            Self::Persistence(error) => write!(f, "{}", error),
        }
    }
}

impl Error for SessionError {}

impl From<ConnectionError> for SessionError {
    fn from(value: ConnectionError) -> Self {
        Self::Connection(value)
    }
}

impl From<PlaybackError> for SessionError {
    fn from(value: PlaybackError) -> Self {
        Self::Playback(value)
    }
}

impl From<ConfigurationError> for SessionError {
    fn from(value: ConfigurationError) -> Self {
        Self::Configuration(value)
    }
}

impl From<PersistenceError> for SessionError {
    fn from(value: PersistenceError) -> Self {
        Self::Persistence(value)
    }
}
