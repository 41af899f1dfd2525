//! Where ratings come from. A [RatingSource] is a line-oriented channel:
//! one line is one rating. The real one sits on a serial port, opened
//! through a [PortOpener] so the controller never needs to know which kind
//! of channel it is bound to.

use crate::error::ConnectionError;

use log::{debug, info, warn};
use serial2::SerialPort;
use std::{
    io::{self, ErrorKind, Read, Write},
    time::{Duration, Instant},
};

/// Default serial line speed of the rating slider.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default time a single read waits for a complete line.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Most bytes held back waiting for a terminator. Past this the oldest are
/// discarded, so a device talking at the wrong speed cannot grow it forever.
const MAX_PENDING: usize = 4096;

/// A line-oriented channel that produces ratings.
pub trait RatingSource: Send {
    /// The identifier this source was opened with.
    fn identifier(&self) -> &str;

    /// Wait up to `timeout` for one complete line. `None` means nothing
    /// arrived in time, which is not an error. Returned text is decoded
    /// and stripped of its terminator, and may be empty.
    fn read_line_or_timeout(&mut self, timeout: Duration) -> Option<String>;

    /// Whether the channel is still open.
    fn is_open(&self) -> bool;

    /// Close the channel. Idempotent; failures are logged, never raised.
    fn close(&mut self);
}

/// Opens [RatingSource]s by identifier.
pub trait PortOpener: Send {
    /// Open the channel called `identifier`.
    fn open(&self, identifier: &str) -> Result<Box<dyn RatingSource>, ConnectionError>;
}

impl<F> PortOpener for F
where
    F: Fn(&str) -> Result<Box<dyn RatingSource>, ConnectionError> + Send,
{
    fn open(&self, identifier: &str) -> Result<Box<dyn RatingSource>, ConnectionError> {
        self(identifier)
    }
}

/// A [RatingSource] over any byte channel. Bytes are accumulated until a
/// `\n` shows up; anything after the first terminator is kept for the next
/// read, and a partial line survives a timeout.
pub struct LineRatingSource<C>
where
    C: Read + Write + Send,
{
    identifier: String,
    channel: Option<C>,
    pending: Vec<u8>,
}

impl<C> LineRatingSource<C>
where
    C: Read + Write + Send,
{
    /// Wrap an already open channel.
    pub fn new(identifier: impl Into<String>, channel: C) -> Self {
        Self {
            identifier: identifier.into(),
            channel: Some(channel),
            pending: Vec::new(),
        }
    }
}

/// Pull the first complete line out of `pending`, decoded and trimmed.
fn take_line(pending: &mut Vec<u8>) -> Option<String> {
    let end = pending.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = pending.drain(..=end).collect();
    Some(String::from_utf8_lossy(&line).trim().to_owned())
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(error.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
}

impl<C> RatingSource for LineRatingSource<C>
where
    C: Read + Write + Send,
{
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn read_line_or_timeout(&mut self, timeout: Duration) -> Option<String> {
        let channel = self.channel.as_mut()?;

        // Push out anything still queued for the device before reading.
        if let Err(e) = channel.flush() {
            debug!("{} : flush failed: {}", self.identifier, e);
        }

        if let Some(line) = take_line(&mut self.pending) {
            return Some(line);
        }

        let deadline = Instant::now() + timeout;
        let mut chunk = [0; 256];
        loop {
            match channel.read(&mut chunk) {
                Ok(0) => return None,
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    if let Some(line) = take_line(&mut self.pending) {
                        return Some(line);
                    }
                    if self.pending.len() > MAX_PENDING {
                        let excess = self.pending.len() - MAX_PENDING;
                        debug!("{} : no terminator, dropping {} bytes.", self.identifier, excess);
                        self.pending.drain(..excess);
                    }
                }
                Err(e) if is_timeout(&e) => return None,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    // Disconnects land here on every tick; keep it quiet.
                    debug!("{} : read failed: {}", self.identifier, e);
                    return None;
                }
            }

            if Instant::now() >= deadline {
                return None;
            }
        }
    }

    fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.flush() {
                warn!("{} : error while closing, ignoring: {}", self.identifier, e);
            }
            drop(channel);
            self.pending.clear();
            info!("{} : closed.", self.identifier);
        }
    }
}

impl<C> Drop for LineRatingSource<C>
where
    C: Read + Write + Send,
{
    fn drop(&mut self) {
        self.close();
    }
}

/// The rating slider on a serial port.
pub type SerialRatingSource = LineRatingSource<SerialPort>;

/// Opens serial ports with a fixed line speed and read timeout.
#[derive(Debug, Clone, Copy)]
pub struct SerialPortOpener {
    baud_rate: u32,
    read_timeout: Duration,
}

impl Default for SerialPortOpener {
    fn default() -> Self {
        Self::new(DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT)
    }
}

impl SerialPortOpener {
    /// An opener for ports at `baud_rate`, reading with `read_timeout`.
    pub fn new(baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            baud_rate,
            read_timeout,
        }
    }

    /// Open `identifier` as a [SerialRatingSource].
    pub fn open_serial(&self, identifier: &str) -> Result<SerialRatingSource, ConnectionError> {
        let mut port = SerialPort::open(identifier, self.baud_rate)
            .map_err(|e| ConnectionError::new(identifier, e))?;
        port.set_read_timeout(self.read_timeout)
            .map_err(|e| ConnectionError::new(identifier, e))?;

        info!("{} : opened at {} baud.", identifier, self.baud_rate);
        Ok(LineRatingSource::new(identifier, port))
    }
}

impl PortOpener for SerialPortOpener {
    fn open(&self, identifier: &str) -> Result<Box<dyn RatingSource>, ConnectionError> {
        Ok(Box::new(self.open_serial(identifier)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// A fake channel that hands out one queued chunk per read, then
    /// reports a timeout once it runs dry.
    #[derive(Default)]
    struct MockChannel {
        chunks: VecDeque<Vec<u8>>,
        flushes: Arc<Mutex<usize>>,
        fail_flush: bool,
    }

    impl MockChannel {
        fn with_chunks(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
                ..Default::default()
            }
        }
    }

    impl Read for MockChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Err(io::Error::new(ErrorKind::TimedOut, "no data")),
            }
        }
    }

    impl Write for MockChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            *self.flushes.lock().unwrap() += 1;
            if self.fail_flush {
                Err(io::Error::new(ErrorKind::BrokenPipe, "gone"))
            } else {
                Ok(())
            }
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn reads_one_line_at_a_time() {
        let channel = MockChannel::with_chunks(&[b"3\r\n7\n", b"\n"]);
        let mut source = LineRatingSource::new("mock", channel);

        assert_eq!(source.read_line_or_timeout(TIMEOUT).as_deref(), Some("3"));
        assert_eq!(source.read_line_or_timeout(TIMEOUT).as_deref(), Some("7"));
        assert_eq!(source.read_line_or_timeout(TIMEOUT).as_deref(), Some(""));
        assert_eq!(source.read_line_or_timeout(TIMEOUT), None);
    }

    #[test]
    fn partial_line_survives_a_timeout() {
        let mut channel = MockChannel::with_chunks(&[b"1"]);
        channel.chunks.push_back(Vec::new());
        let mut source = LineRatingSource::new("mock", channel);

        // "1" then Ok(0): no terminator yet.
        assert_eq!(source.read_line_or_timeout(TIMEOUT), None);

        source.channel.as_mut().unwrap().chunks.push_back(b"0\n".to_vec());
        assert_eq!(source.read_line_or_timeout(TIMEOUT).as_deref(), Some("10"));
    }

    #[test]
    fn unterminated_input_is_capped() {
        let noise = [b'x'; 256];
        let mut chunks: Vec<&[u8]> = vec![&noise[..]; 20];
        chunks.push(b"7\n");
        let channel = MockChannel::with_chunks(&chunks[..20]);
        let mut source = LineRatingSource::new("mock", channel);

        assert_eq!(source.read_line_or_timeout(TIMEOUT), None);
        assert!(source.pending.len() <= MAX_PENDING);

        source.channel.as_mut().unwrap().chunks.push_back(chunks[20].to_vec());
        let line = source.read_line_or_timeout(TIMEOUT).unwrap();
        assert!(line.len() <= MAX_PENDING);
        assert!(line.ends_with('7'));
    }

    #[test]
    fn flushes_before_every_read() {
        let channel = MockChannel::with_chunks(&[b"1\n"]);
        let flushes = channel.flushes.clone();
        let mut source = LineRatingSource::new("mock", channel);

        source.read_line_or_timeout(TIMEOUT);
        source.read_line_or_timeout(TIMEOUT);
        assert_eq!(*flushes.lock().unwrap(), 2);
    }

    #[test]
    fn close_is_idempotent_and_swallows_errors() {
        let channel = MockChannel {
            fail_flush: true,
            ..Default::default()
        };
        let mut source = LineRatingSource::new("mock", channel);
        assert!(source.is_open());

        source.close();
        source.close();
        assert!(!source.is_open());
        assert_eq!(source.read_line_or_timeout(TIMEOUT), None);
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let channel = MockChannel::with_chunks(&[&[0xFF, b'5', b'\n']]);
        let mut source = LineRatingSource::new("mock", channel);
        let line = source.read_line_or_timeout(TIMEOUT).unwrap();
        assert!(line.ends_with('5'));
    }

    #[test]
    fn missing_serial_port_is_a_connection_error() {
        let opener = SerialPortOpener::default();
        let err = opener
            .open("/dev/this-port-does-not-exist")
            .err()
            .expect("opening a bogus port should fail");
        assert_eq!(err.port, "/dev/this-port-does-not-exist");
    }
}
