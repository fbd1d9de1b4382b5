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
use std::{
    error::Error,
    fmt,
    sync::{mpsc, Arc},
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use super::{render, Context as _, ContextError, NodeId, Param, SampleBuffer};
use crate::config;

/// Describes an output device as reported by cpal.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

/// A cpal output device driving a render graph. The stream lives on its own thread and pulls
/// audio straight out of the graph from the device callback.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// Output channels in use.
    channels: u16,
    /// The graph the stream renders.
    context: Arc<render::Context>,
    /// Dropping this ends the output thread.
    shutdown: Option<mpsc::Sender<()>>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.channels,
            self.host_id.name()
        )
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}

/// Builds an output stream for the given sample type that renders from the context.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    context: Arc<render::Context>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            context.render(&mut scratch, channels);
            for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(*src);
            }
        },
        |err| error!("CPAL output stream error: {}", err),
        None,
    )
}

impl Device {
    /// Lists cpal output devices.
    pub fn list() -> Result<Vec<DeviceInfo>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|(info, _, _)| info)
            .collect())
    }

    fn list_cpal_devices() -> Result<Vec<(DeviceInfo, cpal::HostId, cpal::Device)>, Box<dyn Error>>
    {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
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
                let Ok(output_configs) = device.supported_output_configs() else {
                    continue;
                };
                let max_channels = output_configs
                    .map(|config| config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    let info = DeviceInfo {
                        name: device.name()?,
                        host: host_id.name().to_string(),
                        max_channels,
                    };
                    devices.push((info, host_id, device));
                }
            }
        }

        devices.sort_by_key(|(info, _, _)| info.name.to_string());
        Ok(devices)
    }

    /// Opens the configured device and starts rendering. The name "default" picks the default
    /// output device of the default host.
    pub fn get(config: &config::Audio) -> Result<Device, Box<dyn Error>> {
        let name = config.device();
        let (host_id, device) = if name == "default" {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or("no default output device")?;
            (host.id(), device)
        } else {
            match Device::list_cpal_devices()?
                .into_iter()
                .find(|(info, _, _)| info.name.trim() == name)
            {
                Some((_, host_id, device)) => (host_id, device),
                None => return Err(format!("no device found with name {}", name).into()),
            }
        };

        let default_config = device.default_output_config()?;
        let sample_rate = config
            .sample_rate()
            .unwrap_or(default_config.sample_rate());
        let channels = default_config.channels();
        let sample_format = default_config.sample_format();
        let name = device.name()?;
        let context = Arc::new(render::Context::new(&name, sample_rate));

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let stream_context = context.clone();
        let output_thread = thread::spawn(move || {
            let stream_config = cpal::StreamConfig {
                channels,
                sample_rate: sample_rate as cpal::SampleRate,
                buffer_size: cpal::BufferSize::Default,
            };

            let stream = match sample_format {
                cpal::SampleFormat::F32 => {
                    build_stream::<f32>(&device, &stream_config, stream_context)
                }
                cpal::SampleFormat::I16 => {
                    build_stream::<i16>(&device, &stream_config, stream_context)
                }
                cpal::SampleFormat::I32 => {
                    build_stream::<i32>(&device, &stream_config, stream_context)
                }
                cpal::SampleFormat::U16 => {
                    build_stream::<u16>(&device, &stream_config, stream_context)
                }
                other => {
                    let _ = ready_tx.send(Err(format!("unsupported sample format {:?}", other)));
                    return;
                }
            };

            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("failed to create CPAL stream: {}", e)));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(format!("failed to start CPAL stream: {}", e)));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Keep the stream alive until the device is dropped.
            let _ = shutdown_rx.recv();
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = output_thread.join();
                return Err(e.into());
            }
            Err(_) => return Err("output thread exited before starting the stream".into()),
        }
        info!(
            device = name,
            sample_rate, channels, "CPAL output stream started"
        );

        Ok(Device {
            name,
            host_id,
            channels,
            context,
            shutdown: Some(shutdown_tx),
            output_thread: Some(output_thread),
        })
    }
}

impl super::Context for Device {
    fn current_time(&self) -> f64 {
        self.context.current_time()
    }

    fn sample_rate(&self) -> u32 {
        self.context.sample_rate()
    }

    fn destination(&self) -> NodeId {
        self.context.destination()
    }

    fn create_gain(&self) -> NodeId {
        self.context.create_gain()
    }

    fn create_combiner(&self) -> NodeId {
        self.context.create_combiner()
    }

    fn create_buffer_source(&self, buffer: Arc<SampleBuffer>, looping: bool) -> NodeId {
        self.context.create_buffer_source(buffer, looping)
    }

    fn create_lowpass(&self) -> NodeId {
        self.context.create_lowpass()
    }

    fn create_convolver(&self, impulse: Arc<SampleBuffer>) -> NodeId {
        self.context.create_convolver(impulse)
    }

    fn connect(&self, from: NodeId, to: NodeId) -> Result<(), ContextError> {
        self.context.connect(from, to)
    }

    fn start(&self, source: NodeId, when: f64) -> Result<(), ContextError> {
        self.context.start(source, when)
    }

    fn stop(&self, source: NodeId, when: f64) -> Result<(), ContextError> {
        self.context.stop(source, when)
    }

    fn set_value_at_time(&self, param: Param, value: f32, when: f64) -> Result<(), ContextError> {
        self.context.set_value_at_time(param, value, when)
    }

    fn linear_ramp_to_value_at_time(
        &self,
        param: Param,
        value: f32,
        end: f64,
    ) -> Result<(), ContextError> {
        self.context.linear_ramp_to_value_at_time(param, value, end)
    }

    fn value(&self, param: Param) -> Result<f32, ContextError> {
        self.context.value(param)
    }
}
