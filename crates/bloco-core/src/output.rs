//! CPAL output stream behind the `audio-io` feature.
//!
//! The stream owns the net backend and pulls stereo frames from it inside
//! the device callback. Control threads keep editing the frontend net;
//! committed changes appear here between callbacks.

use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use fundsp::prelude::AudioUnit;
use fundsp::realnet::NetBackend;
use tracing::{info, warn};

/// Wrapper to hold `cpal::Stream` in a `Send` context.
///
/// # Safety
/// `cpal::Stream` is `!Send` due to platform internals. This is safe because
/// `AudioOutput` is only accessed behind a `Mutex` in `BlocoSystem`.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for StreamHandle {}

pub(crate) struct AudioOutput {
    sample_rate: f64,
    channels: usize,
    _stream: StreamHandle,
}

impl AudioOutput {
    /// Open the output device and start pulling from `backend`.
    pub(crate) fn start(device_index: Option<usize>, mut backend: NetBackend) -> Result<Self> {
        let device = get_device(device_index)?;
        let config = device.default_output_config()?;
        let sample_rate = f64::from(config.sample_rate().0);
        let channels = config.channels() as usize;

        backend.set_sample_rate(sample_rate);
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), backend)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), backend)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), backend)?,
            format => {
                return Err(Error::InvalidConfig(format!(
                    "Unsupported sample format: {format:?}"
                )));
            }
        };
        stream.play()?;
        info!("Audio output running at {} Hz", sample_rate);

        Ok(Self {
            sample_rate,
            channels,
            _stream: StreamHandle(stream),
        })
    }

    pub(crate) fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub(crate) fn channels(&self) -> usize {
        self.channels
    }

    pub(crate) fn device_name(device_index: Option<usize>) -> Result<String> {
        Ok(get_device(device_index)?.name()?)
    }

    pub(crate) fn list_devices() -> Result<Vec<String>> {
        cpal::default_host()
            .output_devices()?
            .enumerate()
            .map(|(i, d)| Ok(format!("{i}: {}", d.name()?)))
            .collect()
    }
}

fn get_device(index: Option<usize>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    match index {
        Some(i) => {
            let devices: Vec<_> = host.output_devices()?.collect();
            let count = devices.len();
            devices.into_iter().nth(i).ok_or_else(|| {
                Error::InvalidDevice(format!("Device index {i} out of range ({count} available)"))
            })
        }
        None => host
            .default_output_device()
            .ok_or_else(|| Error::InvalidDevice("No output device available".into())),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut backend: NetBackend,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for frame in data.chunks_mut(channels) {
                let (left, right) = backend.get_stereo();
                for (ch, sample) in frame.iter_mut().enumerate() {
                    let value = match ch {
                        0 => left,
                        1 => right,
                        _ => 0.0,
                    };
                    *sample = T::from_sample(value);
                }
            }
        },
        |err| warn!("Audio stream error: {}", err),
        None,
    )?;

    Ok(stream)
}
