//! Streams the reference stimulus to an audio output while a session runs.
//!
//! A [PlaybackWorker] owns one uncompressed WAV resource and, once started,
//! one thread that pushes fixed-size frames into an [AudioSink]. The thread
//! checks a stop flag between frames, so [PlaybackWorker::request_stop]
//! followed by [PlaybackWorker::join] returns within about one frame, and
//! after `join` returns nothing touches the sink any more.

use crate::error::PlaybackError;

use hound::{SampleFormat, WavReader};
use log::{info, warn};
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// Sample-frames per write to the sink.
pub const FRAME_SIZE: usize = 1024;

/// Layout of the samples a sink will receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    /// Interleaved channels per sample-frame.
    pub channels: u16,
    /// Sample-frames per second.
    pub sample_rate: u32,
}

/// Somewhere to put audio. A sink is created and used on the playback
/// thread only, so it does not have to be `Send`.
pub trait AudioSink {
    /// Take one frame of interleaved samples in `[-1.0, 1.0]`. May block
    /// for roughly the frame's duration.
    fn write(&mut self, samples: &[f32]) -> Result<(), PlaybackError>;

    /// The resource ran out; let whatever is queued play out.
    fn finish(&mut self) {}
}

/// Creates a fresh [AudioSink] for each session.
pub trait SinkProvider: Send + Sync {
    /// Bring up a sink for samples laid out as `spec`.
    fn open(&self, spec: StreamSpec) -> Result<Box<dyn AudioSink>, PlaybackError>;
}

/// A sink that throws samples away but takes as long as playing them
/// would. Keeps sessions timed correctly when no audio backend is built in.
pub struct PacedSink {
    spec: StreamSpec,
    origin: Option<Instant>,
    frames_written: u64,
}

impl PacedSink {
    /// A sink paced for `spec`.
    pub fn new(spec: StreamSpec) -> Self {
        Self {
            spec,
            origin: None,
            frames_written: 0,
        }
    }
}

impl AudioSink for PacedSink {
    fn write(&mut self, samples: &[f32]) -> Result<(), PlaybackError> {
        let origin = *self.origin.get_or_insert_with(Instant::now);
        self.frames_written += (samples.len() / self.spec.channels.max(1) as usize) as u64;

        let due = Duration::from_secs_f64(
            self.frames_written as f64 / self.spec.sample_rate.max(1) as f64,
        );
        let deadline = origin + due;
        let now = Instant::now();
        if deadline > now {
            spin_sleep::sleep(deadline - now);
        }
        Ok(())
    }
}

/// Hands out [PacedSink]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacedSinkProvider;

impl SinkProvider for PacedSinkProvider {
    fn open(&self, spec: StreamSpec) -> Result<Box<dyn AudioSink>, PlaybackError> {
        Ok(Box::new(PacedSink::new(spec)))
    }
}

/// An opened WAV file, read frame by frame as normalised `f32`s.
struct WavResource {
    reader: WavReader<BufReader<File>>,
    format: SampleFormat,
    bits: u16,
    spec: StreamSpec,
}

impl WavResource {
    fn open(path: &Path) -> Result<Self, PlaybackError> {
        let reader = WavReader::open(path).map_err(|e| match e {
            hound::Error::IoError(io) => PlaybackError::Unreadable(path.to_owned(), io),
            other => PlaybackError::Unsupported(path.to_owned(), other.to_string()),
        })?;

        let wav = reader.spec();
        let supported = match wav.sample_format {
            SampleFormat::Int => (1..=32).contains(&wav.bits_per_sample),
            SampleFormat::Float => wav.bits_per_sample == 32,
        };
        if !supported || wav.channels == 0 || wav.sample_rate == 0 {
            return Err(PlaybackError::Unsupported(
                path.to_owned(),
                format!(
                    "{} channel {}-bit {:?} at {} Hz",
                    wav.channels, wav.bits_per_sample, wav.sample_format, wav.sample_rate
                ),
            ));
        }

        Ok(Self {
            reader,
            format: wav.sample_format,
            bits: wav.bits_per_sample,
            spec: StreamSpec {
                channels: wav.channels,
                sample_rate: wav.sample_rate,
            },
        })
    }

    fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.reader.duration() as f64 / self.spec.sample_rate as f64)
    }

    /// Fill `out` with up to `frames` sample-frames. Leaves `out` empty
    /// once the resource is exhausted.
    fn read_frame(&mut self, out: &mut Vec<f32>, frames: usize) -> Result<(), PlaybackError> {
        out.clear();
        let n = frames * self.spec.channels as usize;
        match self.format {
            SampleFormat::Float => {
                for sample in self.reader.samples::<f32>().take(n) {
                    out.push(sample?);
                }
            }
            SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (self.bits - 1)) as f32;
                for sample in self.reader.samples::<i32>().take(n) {
                    out.push(sample? as f32 * scale);
                }
            }
        }
        Ok(())
    }
}

/// Plays one audio resource on its own thread.
pub struct PlaybackWorker {
    path: PathBuf,
    resource: Option<WavResource>,
    duration: Duration,
    spec: StreamSpec,
    frame_size: usize,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackWorker {
    /// Open `path` for streaming. Fails if it is missing, unreadable, or
    /// not uncompressed PCM.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PlaybackError> {
        let path = path.as_ref();
        let resource = WavResource::open(path)?;
        info!(
            "{} : {:?}, {:.2}s.",
            path.display(),
            resource.spec,
            resource.duration().as_secs_f64()
        );

        Ok(Self {
            path: path.to_owned(),
            duration: resource.duration(),
            spec: resource.spec,
            resource: Some(resource),
            frame_size: FRAME_SIZE,
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
        })
    }

    /// Stream in frames of `frame_size` sample-frames instead of
    /// [FRAME_SIZE].
    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size.max(1);
        self
    }

    /// Length of the resource.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Layout of the resource.
    pub fn spec(&self) -> StreamSpec {
        self.spec
    }

    /// Spawn the playback thread. The sink is opened on that thread, and
    /// this call waits until it is up so a dead output device is reported
    /// here rather than lost.
    pub fn start(&mut self, sinks: Arc<dyn SinkProvider>) -> Result<(), PlaybackError> {
        let Some(mut resource) = self.resource.take() else {
            return Err(PlaybackError::Sink(format!(
                "{} has already been played",
                self.path.display()
            )));
        };

        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), PlaybackError>>(1);
        let stop = Arc::clone(&self.stop);
        let frame_size = self.frame_size;
        let name = self.path.display().to_string();

        let handle = thread::spawn(move || {
            let mut sink = match sinks.open(resource.spec) {
                Ok(sink) => {
                    let _ = ready_tx.send(Ok(()));
                    sink
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            let mut frame = Vec::with_capacity(frame_size * resource.spec.channels as usize);
            let mut exhausted = false;
            while !stop.load(Ordering::Acquire) {
                if let Err(e) = resource.read_frame(&mut frame, frame_size) {
                    warn!("{} : {}, ending playback.", name, e);
                    break;
                }
                if frame.is_empty() {
                    exhausted = true;
                    break;
                }
                if let Err(e) = sink.write(&frame) {
                    warn!("{} : {}, ending playback.", name, e);
                    break;
                }
            }

            if exhausted {
                sink.finish();
            }
            info!("{} : playback thread terminated.", name);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.handle = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(PlaybackError::Sink("playback thread died during start".into()))
            }
        }
    }

    /// Ask the thread to stop at the next frame boundary. Does not wait.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Whether the playback thread is still running.
    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait for the playback thread to end. Idempotent.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("{} : playback thread panicked.", self.path.display());
            }
        }
    }
}

impl Drop for PlaybackWorker {
    fn drop(&mut self) {
        self.request_stop();
        self.join();
    }
}
