//! Audio capture from microphone

use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use async_trait::async_trait;
use cpal::SampleRate;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::oneshot;

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Source of microphone recordings
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Start capturing
    ///
    /// # Errors
    ///
    /// Returns `Error::Permission` if the device cannot be opened
    async fn open(&self) -> Result<Box<dyn CaptureSession>>;
}

/// An in-progress capture; dropping it discards the audio
pub trait CaptureSession: Send {
    /// Stop capturing and return the recording as WAV bytes
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if the capture thread failed or encoding fails
    fn finish(self: Box<Self>) -> Result<Vec<u8>>;
}

/// Captures from the default input device
///
/// The cpal stream lives on a dedicated thread since it is not `Send`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalMicrophone;

impl CpalMicrophone {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Microphone for CpalMicrophone {
    async fn open(&self) -> Result<Box<dyn CaptureSession>> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let worker = std::thread::Builder::new()
            .name("harvest-capture".to_string())
            .spawn(move || capture_until_stopped(ready_tx, &stop_rx))?;

        match ready_rx.await {
            Ok(Ok(())) => {
                tracing::debug!(sample_rate = SAMPLE_RATE, "audio capture started");
                Ok(Box::new(CpalCapture {
                    stop: Some(stop_tx),
                    worker: Some(worker),
                }))
            }
            Ok(Err(reason)) => {
                let _ = worker.join();
                Err(Error::Permission(reason))
            }
            Err(_) => Err(Error::Permission("capture thread exited".to_string())),
        }
    }
}

/// Body of the capture thread
fn capture_until_stopped(
    ready: oneshot::Sender<std::result::Result<(), String>>,
    stop: &mpsc::Receiver<()>,
) -> Vec<f32> {
    let buffer = Arc::new(Mutex::new(Vec::new()));

    let stream = match build_stream(Arc::clone(&buffer)) {
        Ok(stream) => stream,
        Err(reason) => {
            let _ = ready.send(Err(reason));
            return Vec::new();
        }
    };

    if ready.send(Ok(())).is_err() {
        return Vec::new();
    }

    // Either an explicit stop or the sender being dropped ends capture
    let _ = stop.recv();
    drop(stream);

    std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner))
}

fn build_stream(buffer: Arc<Mutex<Vec<f32>>>) -> std::result::Result<cpal::Stream, String> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| "no input device available".to_string())?;

    let supported = device
        .supported_input_configs()
        .map_err(|e| e.to_string())?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .ok_or_else(|| "no suitable audio config found".to_string())?;

    let config = supported.with_sample_rate(SampleRate(SAMPLE_RATE)).config();

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(data);
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| e.to_string())?;

    stream.play().map_err(|e| e.to_string())?;
    Ok(stream)
}

struct CpalCapture {
    stop: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<Vec<f32>>>,
}

impl CaptureSession for CpalCapture {
    fn finish(mut self: Box<Self>) -> Result<Vec<u8>> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let samples = self
            .worker
            .take()
            .ok_or_else(|| Error::Audio("capture already finished".to_string()))?
            .join()
            .map_err(|_| Error::Audio("capture thread panicked".to_string()))?;

        tracing::debug!(samples = samples.len(), "audio capture stopped");
        samples_to_wav(&samples, SAMPLE_RATE)
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        // Dropping the sender wakes the thread; its samples are discarded
        self.stop.take();
    }
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
