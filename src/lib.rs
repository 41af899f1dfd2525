//! Rate this sound records how a listener rates a sound while they hear
//! it. The listener moves a slider wired to a serial port; the slider
//! prints its position, one line per reading, and we log every reading
//! against the time elapsed since the stimulus started playing.
//!
//! The heart of it is the [session controller](controller), which starts
//! and stops [playback] and [polling](poller) of the
//! [rating port](rating_source) together, stamps ratings with the
//! [session clock](clock), keeps them in a [session buffer](session_buffer)
//! and hands them to the [persister] exactly once per session, whether the
//! session is stopped, runs out of audio, or is torn down.
//!
//! Logs are plain text, one `HH:MM:SS.ss,rating` record per line; see
//! [log_format] to read them back.

#![warn(missing_docs)]
pub mod args;
pub mod clock;
pub mod config;
pub mod controller;
#[cfg(feature = "cpal")]
pub mod cpal_sink;
pub mod dummy_source;
pub mod error;
pub mod gui;
pub mod log_format;
pub mod persister;
pub mod playback;
pub mod poller;
pub mod rating_source;
pub mod session_buffer;
