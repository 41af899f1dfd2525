//! The terminal front end: picking a device and running sessions.

mod device_selector;
mod error;
mod session_view;

pub use device_selector::device_selector;
pub use error::RateGuiError;
pub use session_view::session_view;
