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
use std::{error::Error, fmt, sync::Arc};

use crate::config;

mod buffer;
mod convolver;
pub mod cpal;
pub mod decode;
pub mod mock;
pub mod render;

pub use buffer::SampleBuffer;

/// Identifies a node created by an audio context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The automatable parameters a node can expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// The amplitude multiplier of a gain node.
    Gain,
    /// The cutoff frequency of a lowpass node, in Hz.
    Frequency,
}

/// A single automatable parameter on a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Param {
    pub node: NodeId,
    pub kind: ParamKind,
}

impl Param {
    /// The gain parameter of the given node.
    pub fn gain(node: NodeId) -> Param {
        Param {
            node,
            kind: ParamKind::Gain,
        }
    }

    /// The cutoff frequency parameter of the given node.
    pub fn frequency(node: NodeId) -> Param {
        Param {
            node,
            kind: ParamKind::Frequency,
        }
    }
}

/// Errors raised by an audio context when it's handed a request it can't honor.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ContextError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node {node} has no {kind:?} parameter")]
    NoSuchParam { node: NodeId, kind: ParamKind },

    #[error("node {0} is not a buffer source")]
    NotASource(NodeId),

    #[error("buffer source {0} has already been started")]
    AlreadyStarted(NodeId),

    #[error("connecting {from} to {to} would create a cycle")]
    Cycle { from: NodeId, to: NodeId },
}

/// The audio processing context every graph node lives in. There is one per process; it's
/// handed explicitly to everything that builds or modulates the graph.
///
/// Parameter writes made "at" the context's current time take effect immediately as far as
/// `value` is concerned, so an automation can read back what it just wrote.
pub trait Context: fmt::Display + Send + Sync {
    /// The context's clock in seconds.
    fn current_time(&self) -> f64;

    /// The rate the context renders at.
    fn sample_rate(&self) -> u32;

    /// The final output node.
    fn destination(&self) -> NodeId;

    /// Creates a gain node with a gain of 1.
    fn create_gain(&self) -> NodeId;

    /// Creates a node that sums all of its inputs.
    fn create_combiner(&self) -> NodeId;

    /// Creates a playback node for the given buffer. It stays silent until started.
    fn create_buffer_source(&self, buffer: Arc<SampleBuffer>, looping: bool) -> NodeId;

    /// Creates a lowpass filter node with a cutoff of 350 Hz.
    fn create_lowpass(&self) -> NodeId;

    /// Creates a convolution reverb node for the given impulse response.
    fn create_convolver(&self, impulse: Arc<SampleBuffer>) -> NodeId;

    /// Routes the output of `from` into `to`.
    fn connect(&self, from: NodeId, to: NodeId) -> Result<(), ContextError>;

    /// Starts a buffer source at the given context time.
    fn start(&self, source: NodeId, when: f64) -> Result<(), ContextError>;

    /// Stops a buffer source at the given context time.
    fn stop(&self, source: NodeId, when: f64) -> Result<(), ContextError>;

    /// Sets a parameter to a value at the given context time.
    fn set_value_at_time(&self, param: Param, value: f32, when: f64) -> Result<(), ContextError>;

    /// Ramps a parameter linearly from its previous event to a value at the given end time.
    fn linear_ramp_to_value_at_time(
        &self,
        param: Param,
        value: f32,
        end: f64,
    ) -> Result<(), ContextError>;

    /// The value of a parameter at the current time.
    fn value(&self, param: Param) -> Result<f32, ContextError>;
}

/// Returns true if `candidate` feeds (directly or indirectly) into `node`.
pub(crate) fn is_upstream<'a, F>(candidate: NodeId, node: NodeId, inputs: F) -> bool
where
    F: Fn(NodeId) -> &'a [NodeId],
{
    let mut stack = vec![node];
    let mut seen = std::collections::HashSet::new();
    while let Some(current) = stack.pop() {
        if current == candidate {
            return true;
        }
        if seen.insert(current) {
            stack.extend_from_slice(inputs(current));
        }
    }
    false
}

/// Lists the output devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::DeviceInfo>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets the audio context for the given configuration. Device names starting with "mock"
/// produce a mock context that renders nothing.
pub fn get_context(config: &config::Audio) -> Result<Arc<dyn Context>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Context::new(
            device,
            config.sample_rate().unwrap_or(mock::DEFAULT_SAMPLE_RATE),
        )));
    }

    Ok(Arc::new(cpal::Device::get(config)?))
}
