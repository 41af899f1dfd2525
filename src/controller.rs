//! The session controller: a small state machine that runs rating
//! acquisition and stimulus playback in lockstep.
//!
//! ```text
//!            select_port(Some)              start()
//!   IDLE ---------------------> ARMED ------------------> RUNNING
//!    ^   <---------------------   ^   <------------------    |
//!    |    select_port(None),      |  stop(), or playback      |
//!    |    failed open             |  ran out (poll_playback)  |
//!    +--------------------------- cancel() -------------------+
//! ```
//!
//! While RUNNING, a [Poller] reads the bound [RatingSource] every tick,
//! stamps each non-empty line with the [SessionClock] and appends it to the
//! [SessionBuffer]. Stopping cancels the poller first, then stops and joins
//! the [PlaybackWorker], and only then hands the buffer to the
//! [Persister]; by that point nothing else can touch the buffer.
//!
//! The presentation layer drives the controller through the `select_*`,
//! `start`, `stop` and `cancel` entry points, calls
//! [SessionController::poll_playback] on its own tick, and listens for
//! [SessionEvent]s from [SessionController::subscribe].

use crate::clock::{MonotonicClock, SessionClock};
use crate::config::SessionConfig;
use crate::error::{ConfigurationError, PersistenceError, SessionError};
use crate::persister::{PersistOutcome, Persister};
use crate::playback::{PacedSinkProvider, PlaybackWorker, SinkProvider};
use crate::poller::Poller;
use crate::rating_source::{PortOpener, RatingSource, SerialPortOpener};
use crate::session_buffer::{Rating, SessionBuffer, TimestampedRating};

use log::{debug, error, info, warn};
use std::{
    path::{Path, PathBuf},
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

/// What the current rating shows before anything has been read.
pub const NO_RATING: &str = "?";

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No port bound.
    Idle,
    /// A port is bound; a session can be started.
    Armed,
    /// A session is capturing ratings.
    Running,
}

/// Things the presentation layer may want to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The controller moved to a new state.
    StateChanged(SessionState),
    /// A rating was captured; this is the new current rating.
    Rating(String),
    /// The stimulus played to the end, so the session is being stopped.
    PlaybackFinished,
    /// A session was appended to the log.
    Persisted {
        /// Records written.
        records: usize,
        /// Log it went to.
        path: PathBuf,
    },
    /// A session was thrown away because no destination was set.
    Dropped(usize),
}

/// How a session went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Ratings captured.
    pub captured: usize,
    /// What happened to them.
    pub outcome: PersistOutcome,
    /// Session clock reading when the session ended.
    pub elapsed: Duration,
}

type Binding = Arc<Mutex<Box<dyn RatingSource>>>;

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fans events out to every live subscriber.
#[derive(Default)]
struct Observers {
    senders: Mutex<Vec<Sender<SessionEvent>>>,
}

impl Observers {
    fn notify(&self, event: SessionEvent) {
        lock(&self.senders).retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Everything one poll of the rating port needs.
struct Tick {
    source: Binding,
    clock: Arc<dyn SessionClock>,
    buffer: Arc<Mutex<SessionBuffer>>,
    current: Arc<Mutex<String>>,
    observers: Arc<Observers>,
    timeout: Duration,
}

impl Tick {
    fn run(&self) {
        let Some(line) = lock(&self.source).read_line_or_timeout(self.timeout) else {
            return;
        };
        let Some(rating) = Rating::new(&line) else {
            return;
        };

        let offset = self.clock.elapsed();
        debug!("Rating {} at {:?}", rating, offset);

        *lock(&self.current) = rating.as_str().to_owned();
        let text = rating.as_str().to_owned();
        lock(&self.buffer).push(TimestampedRating::new(offset, rating));
        self.observers.notify(SessionEvent::Rating(text));
    }
}

/// Runs rating sessions. See the [module documentation](self).
pub struct SessionController {
    config: SessionConfig,
    opener: Box<dyn PortOpener>,
    sinks: Arc<dyn SinkProvider>,
    clock: Arc<dyn SessionClock>,
    persister: Persister,
    audio: Option<PathBuf>,
    binding: Option<Binding>,
    port: Option<String>,
    buffer: Arc<Mutex<SessionBuffer>>,
    current: Arc<Mutex<String>>,
    observers: Arc<Observers>,
    state: SessionState,
    poller: Option<Poller>,
    worker: Option<PlaybackWorker>,
    cancelled: bool,
}

impl SessionController {
    /// Start configuring a controller.
    pub fn builder() -> SessionControllerBuilder {
        SessionControllerBuilder::default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The latest rating captured, or [NO_RATING].
    pub fn current_rating(&self) -> String {
        lock(&self.current).clone()
    }

    /// Ratings captured so far in the running session.
    pub fn buffered(&self) -> usize {
        lock(&self.buffer).len()
    }

    /// Identifier of the bound port, if any.
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Where sessions are logged, if anywhere.
    pub fn destination(&self) -> Option<&Path> {
        self.persister.destination()
    }

    /// The stimulus played during sessions, if any.
    pub fn audio_resource(&self) -> Option<&Path> {
        self.audio.as_deref()
    }

    /// The tunables this controller runs with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get a feed of [SessionEvent]s. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        lock(&self.observers.senders).push(tx);
        rx
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            info!("Session : {:?} -> {:?}", self.state, state);
            self.state = state;
            self.observers.notify(SessionEvent::StateChanged(state));
        }
    }

    fn check_not_cancelled(&self) -> Result<(), ConfigurationError> {
        if self.cancelled {
            Err(ConfigurationError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Close whatever port is bound. Never fails.
    fn release_port(&mut self) {
        if let Some(binding) = self.binding.take() {
            lock(&binding).close();
        }
        self.port = None;
        *lock(&self.current) = NO_RATING.to_owned();
    }

    /// Bind the rating port `port`, or unbind with `None`. Any previous
    /// port is closed first. Refused while a session is running.
    pub fn select_port(&mut self, port: Option<&str>) -> Result<(), SessionError> {
        self.check_not_cancelled()?;
        if self.state == SessionState::Running {
            return Err(ConfigurationError::SessionRunning.into());
        }

        self.release_port();

        let Some(port) = port else {
            info!("No rating port selected.");
            self.set_state(SessionState::Idle);
            return Ok(());
        };

        match self.opener.open(port) {
            Ok(source) => {
                self.port = Some(source.identifier().to_owned());
                self.binding = Some(Arc::new(Mutex::new(source)));
                self.set_state(SessionState::Armed);
                Ok(())
            }
            Err(e) => {
                warn!("{}", e);
                self.set_state(SessionState::Idle);
                Err(e.into())
            }
        }
    }

    /// Set or clear the log sessions are appended to. Takes effect at the
    /// next flush, even mid-session.
    pub fn select_output_destination(&mut self, path: Option<PathBuf>) {
        self.persister.set_destination(path);
    }

    /// Set or clear the stimulus. Takes effect at the next start.
    pub fn select_audio_resource(&mut self, path: Option<PathBuf>) {
        self.audio = path;
    }

    /// Begin a session. Refused, with nothing changed, if there is no
    /// destination, no open port, or the stimulus cannot be played.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.check_not_cancelled()?;
        if self.state == SessionState::Running {
            return Err(ConfigurationError::SessionRunning.into());
        }
        if self.persister.destination().is_none() {
            return Err(ConfigurationError::NoDestination.into());
        }
        let source = match &self.binding {
            Some(binding) if lock(binding).is_open() => Arc::clone(binding),
            _ => return Err(ConfigurationError::PortNotOpen.into()),
        };

        let mut worker = match &self.audio {
            Some(path) => {
                Some(PlaybackWorker::open(path)?.with_frame_size(self.config.frame_size))
            }
            None => None,
        };

        lock(&self.buffer).clear();
        self.clock.start();

        if let Some(worker) = worker.as_mut() {
            worker.start(Arc::clone(&self.sinks))?;
        }

        let tick = Tick {
            source,
            clock: Arc::clone(&self.clock),
            buffer: Arc::clone(&self.buffer),
            current: Arc::clone(&self.current),
            observers: Arc::clone(&self.observers),
            timeout: self.config.read_timeout(),
        };
        self.worker = worker;
        self.set_state(SessionState::Running);
        self.poller = Some(Poller::schedule(self.config.tick_interval(), move || {
            tick.run()
        }));
        Ok(())
    }

    /// End the running session and append what it captured to the log.
    pub fn stop(&mut self) -> Result<SessionSummary, SessionError> {
        self.check_not_cancelled()?;
        if self.state != SessionState::Running {
            return Err(ConfigurationError::NotRunning.into());
        }
        Ok(self.shutdown()?)
    }

    /// Stop the session if the stimulus has played out. Returns what
    /// `stop()` returned when that happened.
    pub fn poll_playback(&mut self) -> Option<Result<SessionSummary, SessionError>> {
        if self.state != SessionState::Running {
            return None;
        }
        if !self.worker.as_ref().is_some_and(|w| !w.is_alive()) {
            return None;
        }

        info!("Stimulus finished, stopping session.");
        self.observers.notify(SessionEvent::PlaybackFinished);
        Some(self.stop())
    }

    fn shutdown(&mut self) -> Result<SessionSummary, PersistenceError> {
        // Polling stops first so no rating lands while playback winds down.
        if let Some(mut poller) = self.poller.take() {
            poller.cancel();
        }
        if let Some(mut worker) = self.worker.take() {
            worker.request_stop();
            worker.join();
        }

        let elapsed = self.clock.elapsed();
        let records = lock(&self.buffer).take();
        self.set_state(SessionState::Armed);

        let outcome = self.persister.append(&records).map_err(|e| {
            error!("{}", e);
            e
        })?;
        match &outcome {
            PersistOutcome::Written(records, path) => {
                self.observers.notify(SessionEvent::Persisted {
                    records: *records,
                    path: path.clone(),
                })
            }
            PersistOutcome::Dropped(records) => {
                self.observers.notify(SessionEvent::Dropped(*records))
            }
        }

        info!(
            "Session ended after {:.2}s with {} ratings.",
            elapsed.as_secs_f64(),
            records.len()
        );
        Ok(SessionSummary {
            captured: records.len(),
            outcome,
            elapsed,
        })
    }

    /// Tear everything down: finish and persist a running session, then
    /// close the port. Never fails; later calls do nothing, and the
    /// controller refuses further work.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }

        if self.state == SessionState::Running {
            if let Err(e) = self.shutdown() {
                warn!("Ignoring error during cancel: {}", e);
            }
        }
        self.release_port();
        self.set_state(SessionState::Idle);
        self.cancelled = true;
        info!("Session controller cancelled.");
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Builder for [SessionController]. Anything not set gets the real thing:
/// serial ports, a paced null audio sink, and the monotonic clock.
#[derive(Default)]
pub struct SessionControllerBuilder {
    config: SessionConfig,
    opener: Option<Box<dyn PortOpener>>,
    sinks: Option<Arc<dyn SinkProvider>>,
    clock: Option<Arc<dyn SessionClock>>,
}

impl SessionControllerBuilder {
    /// Use `config` instead of the defaults.
    pub fn config(self, config: SessionConfig) -> Self {
        Self { config, ..self }
    }

    /// Open rating ports with `opener`.
    pub fn port_opener(self, opener: impl PortOpener + 'static) -> Self {
        Self {
            opener: Some(Box::new(opener)),
            ..self
        }
    }

    /// Play the stimulus through sinks from `sinks`.
    pub fn sink_provider(self, sinks: Arc<dyn SinkProvider>) -> Self {
        Self {
            sinks: Some(sinks),
            ..self
        }
    }

    /// Stamp ratings with `clock`.
    pub fn clock(self, clock: Arc<dyn SessionClock>) -> Self {
        Self {
            clock: Some(clock),
            ..self
        }
    }

    /// Build an idle controller.
    pub fn build(self) -> SessionController {
        let config = self.config;
        SessionController {
            opener: self.opener.unwrap_or_else(|| {
                Box::new(SerialPortOpener::new(config.baud_rate, config.read_timeout()))
                    as Box<dyn PortOpener>
            }),
            sinks: self
                .sinks
                .unwrap_or_else(|| Arc::new(PacedSinkProvider) as Arc<dyn SinkProvider>),
            clock: self
                .clock
                .unwrap_or_else(|| Arc::new(MonotonicClock::new()) as Arc<dyn SessionClock>),
            config,
            persister: Persister::new(),
            audio: None,
            binding: None,
            port: None,
            buffer: Arc::new(Mutex::new(SessionBuffer::new())),
            current: Arc::new(Mutex::new(NO_RATING.to_owned())),
            observers: Arc::new(Observers::default()),
            state: SessionState::Idle,
            poller: None,
            worker: None,
            cancelled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{ConnectionError, PlaybackError};
    use crate::log_format::read_log;
    use crate::playback::tests::{write_sine, RecordingSinks};

    use std::collections::VecDeque;
    use std::fs::read_to_string;
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    /// Replays a script of `(offset in ms, line)`; each read moves the
    /// manual clock to the line's offset before returning it.
    struct ScriptedSource {
        identifier: String,
        script: VecDeque<(u64, &'static str)>,
        clock: Arc<ManualClock>,
        closed: Arc<AtomicBool>,
        reads: Arc<AtomicUsize>,
    }

    impl RatingSource for ScriptedSource {
        fn identifier(&self) -> &str {
            &self.identifier
        }

        fn read_line_or_timeout(&mut self, timeout: Duration) -> Option<String> {
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            match self.script.pop_front() {
                Some((at, line)) => {
                    self.clock.set(Duration::from_millis(at));
                    self.reads.fetch_add(1, Ordering::SeqCst);
                    Some(line.to_owned())
                }
                None => {
                    thread::sleep(timeout.min(Duration::from_millis(2)));
                    None
                }
            }
        }

        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Default)]
    struct Rig {
        clock: Arc<ManualClock>,
        script: Vec<(u64, &'static str)>,
        opened: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
        reads: Arc<AtomicUsize>,
        sinks: RecordingSinks,
    }

    impl Rig {
        fn new(script: &[(u64, &'static str)]) -> Self {
            Self {
                script: script.to_vec(),
                ..Default::default()
            }
        }

        fn controller(&self) -> SessionController {
            let rig = self.clone();
            SessionController::builder()
                .clock(self.clock.clone())
                .sink_provider(Arc::new(self.sinks.clone()))
                .port_opener(
                    move |port: &str| -> Result<Box<dyn RatingSource>, ConnectionError> {
                        if port == "missing" {
                            return Err(ConnectionError::new(
                                port,
                                io::Error::new(io::ErrorKind::NotFound, "no such port"),
                            ));
                        }
                        let closed = Arc::new(AtomicBool::new(false));
                        rig.opened.lock().unwrap().push(closed.clone());
                        Ok(Box::new(ScriptedSource {
                            identifier: port.to_owned(),
                            script: rig.script.iter().copied().collect(),
                            clock: rig.clock.clone(),
                            closed,
                            reads: rig.reads.clone(),
                        }))
                    },
                )
                .build()
        }

        fn closed(&self, nth: usize) -> bool {
            self.opened.lock().unwrap()[nth].load(Ordering::SeqCst)
        }

        fn wait_for_reads(&self, n: usize) {
            wait_until(|| self.reads.load(Ordering::SeqCst) >= n);
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting");
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn armed(rig: &Rig, log: &Path) -> SessionController {
        let mut controller = rig.controller();
        controller.select_output_destination(Some(log.to_owned()));
        controller.select_port(Some("scripted")).unwrap();
        assert_eq!(controller.state(), SessionState::Armed);
        controller
    }

    #[test]
    fn ratings_are_logged_in_order_with_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("ratings.csv");
        let rig = Rig::new(&[(10, "3"), (20, ""), (30, ""), (50, "7"), (55, "")]);
        let mut controller = armed(&rig, &log);
        let events = controller.subscribe();

        controller.start().unwrap();
        assert_eq!(controller.state(), SessionState::Running);
        rig.wait_for_reads(5);
        rig.clock.set(Duration::from_millis(60));

        let summary = controller.stop().unwrap();
        assert_eq!(summary.captured, 2);
        assert_eq!(summary.outcome, PersistOutcome::Written(2, log.clone()));
        assert_eq!(summary.elapsed, Duration::from_millis(60));
        assert_eq!(controller.state(), SessionState::Armed);
        assert_eq!(
            read_to_string(&log).unwrap(),
            "00:00:00.01,3\n00:00:00.05,7\n"
        );
        assert_eq!(controller.current_rating(), "7");

        let seen: Vec<SessionEvent> = events.try_iter().collect();
        assert_eq!(
            seen,
            vec![
                SessionEvent::StateChanged(SessionState::Running),
                SessionEvent::Rating("3".into()),
                SessionEvent::Rating("7".into()),
                SessionEvent::StateChanged(SessionState::Armed),
                SessionEvent::Persisted {
                    records: 2,
                    path: log.clone()
                },
            ]
        );
    }

    #[test]
    fn playback_running_out_stops_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("ratings.csv");
        let audio = dir.path().join("stimulus.wav");
        write_sine(&audio, 0.2);

        let rig = Rig::new(&[(40, "2"), (90, "4"), (150, "6")]);
        let mut controller = armed(&rig, &log);
        controller.select_audio_resource(Some(audio));
        let events = controller.subscribe();

        controller.start().unwrap();
        let summary = loop {
            if let Some(result) = controller.poll_playback() {
                break result.unwrap();
            }
            assert_eq!(controller.state(), SessionState::Running);
            thread::sleep(Duration::from_millis(5));
        };

        assert_eq!(controller.state(), SessionState::Armed);
        assert_eq!(summary.captured, 3);
        assert!(rig.sinks.finished.load(Ordering::SeqCst));
        assert_eq!(read_log(&log).unwrap().len(), 3);
        assert!(events
            .try_iter()
            .any(|e| e == SessionEvent::PlaybackFinished));

        // Nothing more to do once it has stopped.
        assert!(controller.poll_playback().is_none());
    }

    #[test]
    fn playback_is_joined_before_the_flush() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("ratings.csv");
        let audio = dir.path().join("stimulus.wav");
        write_sine(&audio, 5.0);

        let rig = Rig::new(&[(10, "1")]);
        let mut controller = armed(&rig, &log);
        controller.select_audio_resource(Some(audio));

        controller.start().unwrap();
        rig.wait_for_reads(1);
        wait_until(|| !rig.sinks.writes.lock().unwrap().is_empty());

        controller.stop().unwrap();
        rig.sinks.joined.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(60));

        assert_eq!(*rig.sinks.late_writes.lock().unwrap(), 0);
        assert!(!rig.sinks.finished.load(Ordering::SeqCst));
        assert_eq!(read_log(&log).unwrap().len(), 1);
    }

    #[test]
    fn start_without_destination_changes_nothing() {
        let rig = Rig::new(&[(10, "3")]);
        let mut controller = rig.controller();
        controller.select_port(Some("scripted")).unwrap();

        let err = controller.start().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Configuration(ConfigurationError::NoDestination)
        ));
        assert_eq!(controller.state(), SessionState::Armed);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(rig.reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn start_without_port_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let rig = Rig::new(&[]);
        let mut controller = rig.controller();
        controller.select_output_destination(Some(dir.path().join("ratings.csv")));

        let err = controller.start().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Configuration(ConfigurationError::PortNotOpen)
        ));
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[test]
    fn unplayable_audio_keeps_the_session_from_starting() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("ratings.csv");
        let rig = Rig::new(&[(10, "3")]);
        let mut controller = armed(&rig, &log);
        controller.select_audio_resource(Some(dir.path().join("missing.wav")));

        let err = controller.start().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Playback(PlaybackError::Unreadable(..))
        ));
        assert_eq!(controller.state(), SessionState::Armed);
        assert!(!log.exists());
    }

    #[test]
    fn cancel_mid_session_persists_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("ratings.csv");
        let audio = dir.path().join("stimulus.wav");
        write_sine(&audio, 5.0);

        let rig = Rig::new(&[(10, "5"), (30, "6")]);
        let mut controller = armed(&rig, &log);
        controller.select_audio_resource(Some(audio));

        controller.start().unwrap();
        wait_until(|| controller.buffered() == 2);

        controller.cancel();
        rig.sinks.joined.store(true, Ordering::SeqCst);
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(rig.closed(0));
        assert_eq!(controller.port(), None);
        let logged = read_to_string(&log).unwrap();
        assert_eq!(logged, "00:00:00.01,5\n00:00:00.03,6\n");

        controller.cancel();
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(read_to_string(&log).unwrap(), logged);
        assert_eq!(*rig.sinks.late_writes.lock().unwrap(), 0);

        assert!(matches!(
            controller.start(),
            Err(SessionError::Configuration(ConfigurationError::Cancelled))
        ));
    }

    #[test]
    fn dropping_a_running_controller_persists() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("ratings.csv");
        let rig = Rig::new(&[(10, "9")]);

        {
            let mut controller = armed(&rig, &log);
            controller.start().unwrap();
            wait_until(|| controller.buffered() == 1);
        }

        assert!(rig.closed(0));
        assert_eq!(read_to_string(&log).unwrap(), "00:00:00.01,9\n");
    }

    #[test]
    fn rebinding_closes_the_previous_port() {
        let rig = Rig::new(&[]);
        let mut controller = rig.controller();

        controller.select_port(Some("first")).unwrap();
        controller.select_port(Some("second")).unwrap();
        assert!(rig.closed(0));
        assert!(!rig.closed(1));
        assert_eq!(controller.port(), Some("second"));

        controller.select_port(None).unwrap();
        assert!(rig.closed(1));
        assert_eq!(controller.port(), None);
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[test]
    fn port_name_does_not_wait_on_a_read_in_flight() {
        let rig = Rig::new(&[]);
        let mut controller = rig.controller();
        controller.select_port(Some("scripted")).unwrap();

        let binding = controller.binding.clone().unwrap();
        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let reader = thread::spawn(move || {
            let _guard = binding.lock().unwrap();
            held_tx.send(()).unwrap();
            let _ = release_rx.recv();
        });
        held_rx.recv().unwrap();

        assert_eq!(controller.port(), Some("scripted"));
        release_tx.send(()).unwrap();
        reader.join().unwrap();
    }

    #[test]
    fn failed_open_leaves_the_controller_idle() {
        let rig = Rig::new(&[]);
        let mut controller = rig.controller();
        controller.select_port(Some("first")).unwrap();

        let err = controller.select_port(Some("missing")).unwrap_err();
        assert!(matches!(err, SessionError::Connection(_)));
        assert!(rig.closed(0));
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.port(), None);
    }

    #[test]
    fn running_session_refuses_rebind_and_restart() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("ratings.csv");
        let rig = Rig::new(&[]);
        let mut controller = armed(&rig, &log);
        controller.start().unwrap();

        assert!(matches!(
            controller.select_port(Some("other")),
            Err(SessionError::Configuration(
                ConfigurationError::SessionRunning
            ))
        ));
        assert!(matches!(
            controller.start(),
            Err(SessionError::Configuration(
                ConfigurationError::SessionRunning
            ))
        ));
        assert!(!rig.closed(0));
        assert_eq!(controller.port(), Some("scripted"));

        controller.stop().unwrap();
        assert!(matches!(
            controller.stop(),
            Err(SessionError::Configuration(ConfigurationError::NotRunning))
        ));
    }

    #[test]
    fn cleared_destination_drops_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("ratings.csv");
        let rig = Rig::new(&[(10, "1"), (20, "2")]);
        let mut controller = armed(&rig, &log);
        let events = controller.subscribe();

        controller.start().unwrap();
        wait_until(|| controller.buffered() == 2);
        controller.select_output_destination(None);

        let summary = controller.stop().unwrap();
        assert_eq!(summary.outcome, PersistOutcome::Dropped(2));
        assert!(!log.exists());
        assert!(events.try_iter().any(|e| e == SessionEvent::Dropped(2)));
    }

    #[test]
    fn each_session_starts_with_an_empty_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("ratings.csv");
        let rig = Rig::new(&[(10, "1")]);
        let mut controller = armed(&rig, &log);

        controller.start().unwrap();
        wait_until(|| controller.buffered() == 1);
        controller.stop().unwrap();
        assert_eq!(controller.buffered(), 0);

        // Same source, script already used up: the second session is empty.
        controller.start().unwrap();
        thread::sleep(Duration::from_millis(30));
        let summary = controller.stop().unwrap();
        assert_eq!(summary.captured, 0);
        assert_eq!(read_log(&log).unwrap().len(), 1);
    }
}
