// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{error::Error, fmt, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, span, Level};

use crate::audio::mixer::{VoiceMixer, DEFAULT_MAX_VOICES};
use crate::audio::{Device as AudioDevice, OutputFormat, SampleFormat};
use crate::events::PadId;
use crate::samples::AudioBuffer;

/// A cpal output stream that plays pad hits as they arrive.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The name of the host the device belongs to.
    host_name: &'static str,
    /// The format of the output stream.
    format: OutputFormat,
    /// Hands new voices to the audio callback.
    voice_tx: Sender<AudioBuffer>,
    /// Dropping this stops the output thread.
    shutdown_tx: Option<Sender<()>>,
    /// Handle to the output thread (keeps the stream alive).
    output_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, Rate={}) ({})",
            self.name, self.format.channels, self.format.sample_rate, self.host_name
        )
    }
}

/// f32 callback: mix straight into the cpal buffer.
fn create_f32_callback(
    voice_rx: Receiver<AudioBuffer>,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut mixer = VoiceMixer::new(DEFAULT_MAX_VOICES);
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        while let Ok(sample) = voice_rx.try_recv() {
            mixer.add(sample);
        }
        mixer.process_into(data);
    }
}

/// Integer callback: mix into a scratch buffer and convert.
fn create_int_callback<T>(
    voice_rx: Receiver<AudioBuffer>,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut mixer = VoiceMixer::new(DEFAULT_MAX_VOICES);
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        while let Ok(sample) = voice_rx.try_recv() {
            mixer.add(sample);
        }
        scratch.resize(data.len(), 0.0);
        mixer.process_into(&mut scratch);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

fn build_stream(
    device: &cpal::Device,
    format: &OutputFormat,
    voice_rx: Receiver<AudioBuffer>,
) -> Result<cpal::Stream, Box<dyn Error>> {
    let config = cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let on_error = |err| error!("CPAL output stream error: {}", err);

    let stream = match (format.sample_format, format.bits_per_sample) {
        (SampleFormat::Float, _) => device.build_output_stream(
            &config,
            create_f32_callback(voice_rx),
            on_error,
            None,
        )?,
        (SampleFormat::Int, 16) => device.build_output_stream(
            &config,
            create_int_callback::<i16>(voice_rx),
            on_error,
            None,
        )?,
        (SampleFormat::Int, _) => device.build_output_stream(
            &config,
            create_int_callback::<i32>(voice_rx),
            on_error,
            None,
        )?,
    };
    Ok(stream)
}

impl Device {
    /// Lists the names of cpal output devices across every host.
    pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
        let mut names: Vec<String> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                if let Ok(name) = device.name() {
                    names.push(format!("{} ({})", name, host_id.name()));
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Finds the named output device on the default host ("default" picks the host's
    /// default device) and starts an output stream on it.
    pub fn get(name: &str, format: OutputFormat) -> Result<Device, Box<dyn Error>> {
        let span = span!(Level::INFO, "cpal device");
        let _enter = span.enter();

        let host = cpal::default_host();
        let device = if name == "default" {
            host.default_output_device()
                .ok_or("no default output device")?
        } else {
            host.output_devices()?
                .find(|device| {
                    device
                        .name()
                        .is_ok_and(|device_name| device_name.trim() == name)
                })
                .ok_or_else(|| format!("no device found with name {}", name))?
        };
        let device_name = device.name()?;

        let (voice_tx, voice_rx) = crossbeam_channel::unbounded::<AudioBuffer>();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

        // Streams aren't Send on every platform, so the stream lives on its own thread.
        let output_thread = {
            let format = format.clone();
            thread::Builder::new()
                .name("audio output".to_string())
                .spawn(move || {
                    let stream = match build_stream(&device, &format, voice_rx) {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.to_string()));
                            return;
                        }
                    };
                    if let Err(e) = stream.play() {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                    let _ = ready_tx.send(Ok(()));

                    // Keep the stream alive until the device is dropped.
                    let _ = shutdown_rx.recv();
                    drop(stream);
                })?
        };

        ready_rx.recv()??;
        info!(
            device = device_name,
            channels = format.channels,
            sample_rate = format.sample_rate,
            "CPAL output stream started successfully"
        );

        Ok(Device {
            name: device_name,
            host_name: host.id().name(),
            format,
            voice_tx,
            shutdown_tx: Some(shutdown_tx),
            output_thread: Some(output_thread),
        })
    }
}

impl AudioDevice for Device {
    fn play_pad(&self, pad: PadId, sample: AudioBuffer) -> Result<(), Box<dyn Error>> {
        debug!(pad = pad.0, frames = sample.frames(), "Playing pad");
        let sample = sample.conform(self.format.sample_rate, self.format.channels);
        self.voice_tx.send(sample)?;
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.shutdown_tx.take();
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}
