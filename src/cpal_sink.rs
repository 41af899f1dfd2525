//! Plays the stimulus on the default output device through cpal.
//!
//! The cpal callback pulls from a small shared queue which the playback
//! thread keeps topped up one frame at a time. The queue is bounded to a
//! couple of frames, so a stop request is heard almost immediately.

use crate::error::PlaybackError;
use crate::playback::{AudioSink, SinkProvider, StreamSpec, FRAME_SIZE};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::warn;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
    thread,
    time::{Duration, Instant},
};

const QUEUED_FRAMES: usize = 2;

/// Opens a [CpalSink] on the default output device for each session.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalSinkProvider;

/// A live cpal output stream plus the queue feeding it.
pub struct CpalSink {
    // Dropping the stream stops the device.
    _stream: cpal::Stream,
    queue: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
    frame_time: Duration,
}

impl SinkProvider for CpalSinkProvider {
    fn open(&self, spec: StreamSpec) -> Result<Box<dyn AudioSink>, PlaybackError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlaybackError::Sink("no default output device".into()))?;

        let config = cpal::StreamConfig {
            channels: spec.channels,
            sample_rate: cpal::SampleRate(spec.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let capacity = FRAME_SIZE * spec.channels as usize * QUEUED_FRAMES;
        let queue = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
        let cb_queue = Arc::clone(&queue);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut queue = cb_queue.lock().unwrap_or_else(PoisonError::into_inner);
                    for sample in data.iter_mut() {
                        *sample = queue.pop_front().unwrap_or(0.0);
                    }
                },
                |err| warn!("cpal output stream error: {}", err),
                None,
            )
            .map_err(|e| PlaybackError::Sink(e.to_string()))?;
        stream
            .play()
            .map_err(|e| PlaybackError::Sink(e.to_string()))?;

        Ok(Box::new(CpalSink {
            _stream: stream,
            queue,
            capacity,
            frame_time: Duration::from_secs_f64(FRAME_SIZE as f64 / spec.sample_rate.max(1) as f64),
        }))
    }
}

impl CpalSink {
    fn queued(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl AudioSink for CpalSink {
    fn write(&mut self, samples: &[f32]) -> Result<(), PlaybackError> {
        loop {
            let queued = self.queued();
            if queued == 0 || queued + samples.len() <= self.capacity {
                break;
            }
            spin_sleep::sleep(self.frame_time / 8);
        }
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(samples.iter().copied());
        Ok(())
    }

    fn finish(&mut self) {
        let deadline = Instant::now() + self.frame_time * (QUEUED_FRAMES as u32 + 1);
        while self.queued() > 0 && Instant::now() < deadline {
            thread::sleep(self.frame_time / 8);
        }
    }
}
