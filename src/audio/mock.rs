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
use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::debug;

use super::{is_upstream, ContextError, NodeId, Param, ParamKind, SampleBuffer};

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

const DEFAULT_GAIN: f32 = 1.0;
const DEFAULT_CUTOFF: f32 = 350.0;

/// The kind of node the mock created.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Destination,
    Gain,
    Combiner,
    BufferSource {
        buffer: Arc<SampleBuffer>,
        looping: bool,
    },
    Lowpass,
    Convolver,
}

/// Everything the mock was asked to do, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Connect { from: NodeId, to: NodeId },
    Start { node: NodeId, when: f64 },
    Stop { node: NodeId, when: f64 },
    SetValue { param: Param, value: f32, when: f64 },
    Ramp { param: Param, value: f32, end: f64 },
}

struct Node {
    kind: NodeKind,
    inputs: Vec<NodeId>,
    value: Option<f32>,
    started: bool,
}

impl Node {
    fn new(kind: NodeKind) -> Node {
        let value = match kind {
            NodeKind::Gain => Some(DEFAULT_GAIN),
            NodeKind::Lowpass => Some(DEFAULT_CUTOFF),
            _ => None,
        };
        Node {
            kind,
            inputs: Vec::new(),
            value,
            started: false,
        }
    }

    fn param_kind(&self) -> Option<ParamKind> {
        match self.kind {
            NodeKind::Gain => Some(ParamKind::Gain),
            NodeKind::Lowpass => Some(ParamKind::Frequency),
            _ => None,
        }
    }
}

struct Inner {
    nodes: Vec<Node>,
    events: Vec<Event>,
    time: f64,
}

impl Inner {
    fn node(&self, id: NodeId) -> Result<&Node, ContextError> {
        self.nodes.get(id.0).ok_or(ContextError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, ContextError> {
        self.nodes.get_mut(id.0).ok_or(ContextError::UnknownNode(id))
    }

    fn param_mut(&mut self, param: Param) -> Result<&mut Option<f32>, ContextError> {
        let node = self.node_mut(param.node)?;
        if node.param_kind() != Some(param.kind) {
            return Err(ContextError::NoSuchParam {
                node: param.node,
                kind: param.kind,
            });
        }
        Ok(&mut node.value)
    }

    fn create(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node::new(kind));
        NodeId(self.nodes.len() - 1)
    }
}

/// A mock audio context. Doesn't render anything: it applies parameter writes immediately,
/// keeps a log of every request and lets tests drive its clock.
pub struct Context {
    name: String,
    sample_rate: u32,
    inner: Mutex<Inner>,
}

impl Context {
    /// Creates a new mock context with a destination node and its clock at zero.
    pub fn new(name: &str, sample_rate: u32) -> Context {
        let mut inner = Inner {
            nodes: Vec::new(),
            events: Vec::new(),
            time: 0.0,
        };
        inner.create(NodeKind::Destination);
        Context {
            name: name.to_string(),
            sample_rate,
            inner: Mutex::new(inner),
        }
    }

    /// Moves the clock to the given time.
    pub fn set_time(&self, time: f64) {
        self.inner.lock().time = time;
    }

    /// All recorded events.
    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().events.clone()
    }

    /// Forgets all recorded events. Node state is kept.
    pub fn clear_events(&self) {
        self.inner.lock().events.clear();
    }

    /// The kind of the given node.
    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.inner.lock().nodes.get(node.0).map(|n| n.kind.clone())
    }

    /// The nodes feeding into the given node.
    pub fn inputs(&self, node: NodeId) -> Vec<NodeId> {
        self.inner
            .lock()
            .nodes
            .get(node.0)
            .map(|n| n.inputs.clone())
            .unwrap_or_default()
    }

    /// The nodes the given node feeds into.
    pub fn outputs(&self, node: NodeId) -> Vec<NodeId> {
        let inner = self.inner.lock();
        inner
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.inputs.contains(&node))
            .map(|(i, _)| NodeId(i))
            .collect()
    }

    /// Number of nodes created, including the destination.
    pub fn node_count(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    /// True once the given source has been started.
    pub fn is_started(&self, node: NodeId) -> bool {
        self.inner
            .lock()
            .nodes
            .get(node.0)
            .is_some_and(|n| n.started)
    }

    /// Every start request as (node, when).
    pub fn starts(&self) -> Vec<(NodeId, f64)> {
        self.inner
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Start { node, when } => Some((*node, *when)),
                _ => None,
            })
            .collect()
    }

    /// Every value written to the given parameter, in order.
    pub fn history(&self, param: Param) -> Vec<f32> {
        self.inner
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::SetValue { param: p, value, .. } if *p == param => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Shortcut for the current gain of a gain node. Panics if the node has no gain.
    pub fn gain(&self, node: NodeId) -> f32 {
        crate::audio::Context::value(self, Param::gain(node)).expect("node has no gain")
    }

    /// Shortcut for the current cutoff of a lowpass node. Panics if the node has no cutoff.
    pub fn frequency(&self, node: NodeId) -> f32 {
        crate::audio::Context::value(self, Param::frequency(node)).expect("node has no cutoff")
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

impl super::Context for Context {
    fn current_time(&self) -> f64 {
        self.inner.lock().time
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn destination(&self) -> NodeId {
        NodeId(0)
    }

    fn create_gain(&self) -> NodeId {
        self.inner.lock().create(NodeKind::Gain)
    }

    fn create_combiner(&self) -> NodeId {
        self.inner.lock().create(NodeKind::Combiner)
    }

    fn create_buffer_source(&self, buffer: Arc<SampleBuffer>, looping: bool) -> NodeId {
        self.inner
            .lock()
            .create(NodeKind::BufferSource { buffer, looping })
    }

    fn create_lowpass(&self) -> NodeId {
        self.inner.lock().create(NodeKind::Lowpass)
    }

    fn create_convolver(&self, _impulse: Arc<SampleBuffer>) -> NodeId {
        self.inner.lock().create(NodeKind::Convolver)
    }

    fn connect(&self, from: NodeId, to: NodeId) -> Result<(), ContextError> {
        let mut inner = self.inner.lock();
        inner.node(from)?;
        inner.node(to)?;
        if is_upstream(to, from, |id| inner.nodes[id.0].inputs.as_slice()) {
            return Err(ContextError::Cycle { from, to });
        }
        let node = inner.node_mut(to)?;
        if !node.inputs.contains(&from) {
            node.inputs.push(from);
        }
        inner.events.push(Event::Connect { from, to });
        Ok(())
    }

    fn start(&self, source: NodeId, when: f64) -> Result<(), ContextError> {
        let mut inner = self.inner.lock();
        let node = inner.node_mut(source)?;
        if !matches!(node.kind, NodeKind::BufferSource { .. }) {
            return Err(ContextError::NotASource(source));
        }
        if node.started {
            return Err(ContextError::AlreadyStarted(source));
        }
        node.started = true;
        inner.events.push(Event::Start { node: source, when });
        debug!(node = %source, when, "Mock source started");
        Ok(())
    }

    fn stop(&self, source: NodeId, when: f64) -> Result<(), ContextError> {
        let mut inner = self.inner.lock();
        let node = inner.node(source)?;
        if !matches!(node.kind, NodeKind::BufferSource { .. }) {
            return Err(ContextError::NotASource(source));
        }
        inner.events.push(Event::Stop { node: source, when });
        Ok(())
    }

    fn set_value_at_time(&self, param: Param, value: f32, when: f64) -> Result<(), ContextError> {
        let mut inner = self.inner.lock();
        *inner.param_mut(param)? = Some(value);
        inner.events.push(Event::SetValue { param, value, when });
        Ok(())
    }

    fn linear_ramp_to_value_at_time(
        &self,
        param: Param,
        value: f32,
        end: f64,
    ) -> Result<(), ContextError> {
        let mut inner = self.inner.lock();
        *inner.param_mut(param)? = Some(value);
        inner.events.push(Event::Ramp { param, value, end });
        Ok(())
    }

    fn value(&self, param: Param) -> Result<f32, ContextError> {
        let mut inner = self.inner.lock();
        Ok(inner.param_mut(param)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::audio::{Context as _, ContextError, Param, SampleBuffer};

    use super::{Context, Event};

    #[test]
    fn test_defaults_and_writes() -> Result<(), ContextError> {
        let context = Context::new("mock", 44100);
        let gain = context.create_gain();
        let lowpass = context.create_lowpass();
        assert_eq!(1.0, context.gain(gain));
        assert_eq!(350.0, context.frequency(lowpass));

        context.set_value_at_time(Param::gain(gain), 0.25, 0.0)?;
        assert_eq!(0.25, context.gain(gain));
        assert_eq!(vec![0.25], context.history(Param::gain(gain)));

        assert_eq!(
            Err(ContextError::NoSuchParam {
                node: gain,
                kind: crate::audio::ParamKind::Frequency
            }),
            context.value(Param::frequency(gain))
        );
        Ok(())
    }

    #[test]
    fn test_connect_rejects_cycles() -> Result<(), ContextError> {
        let context = Context::new("mock", 44100);
        let a = context.create_gain();
        let b = context.create_gain();
        let c = context.create_combiner();
        context.connect(a, b)?;
        context.connect(b, c)?;
        assert_eq!(Err(ContextError::Cycle { from: c, to: a }), context.connect(c, a));
        assert_eq!(Err(ContextError::Cycle { from: a, to: a }), context.connect(a, a));
        assert_eq!(vec![b], context.outputs(a));
        Ok(())
    }

    #[test]
    fn test_sources_start_once() -> Result<(), ContextError> {
        let context = Context::new("mock", 44100);
        let buffer = Arc::new(SampleBuffer::new(vec![vec![0.0; 4]], 44100));
        let source = context.create_buffer_source(buffer, true);
        let gain = context.create_gain();

        context.set_time(3.5);
        context.start(source, context.current_time() + 1.0)?;
        assert!(context.is_started(source));
        assert_eq!(vec![(source, 4.5)], context.starts());
        assert_eq!(
            Err(ContextError::AlreadyStarted(source)),
            context.start(source, 0.0)
        );
        assert_eq!(Err(ContextError::NotASource(gain)), context.start(gain, 0.0));
        assert!(matches!(context.events()[0], Event::Start { .. }));
        Ok(())
    }
}
