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
use std::{collections::VecDeque, fmt, sync::Arc};

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};
use parking_lot::Mutex;
use tracing::warn;

use super::{
    convolver::Convolver, is_upstream, ContextError, NodeId, Param, ParamKind, SampleBuffer,
};

/// Frames rendered per pass over the graph. Parameters are sampled once per quantum.
pub const QUANTUM: usize = 128;

const DEFAULT_GAIN: f32 = 1.0;
const DEFAULT_CUTOFF: f32 = 350.0;
const MIN_CUTOFF: f32 = 10.0;

#[derive(Clone, Copy, Debug)]
enum ParamEvent {
    Set { value: f32, time: f64 },
    Ramp { value: f32, end: f64 },
}

impl ParamEvent {
    fn time(&self) -> f64 {
        match self {
            ParamEvent::Set { time, .. } => *time,
            ParamEvent::Ramp { end, .. } => *end,
        }
    }
}

/// An automatable parameter: a settled value plus a timeline of pending events.
#[derive(Debug)]
struct ParamState {
    value: f32,
    /// When `value` was reached. Ramps interpolate from here.
    time: f64,
    events: VecDeque<ParamEvent>,
}

impl ParamState {
    fn new(value: f32) -> ParamState {
        ParamState {
            value,
            time: 0.0,
            events: VecDeque::new(),
        }
    }

    /// Inserts an event, keeping the timeline sorted. Events at equal times keep insertion order.
    fn schedule(&mut self, event: ParamEvent) {
        let index = self
            .events
            .iter()
            .position(|e| e.time() > event.time())
            .unwrap_or(self.events.len());
        self.events.insert(index, event);
    }

    /// The value at the given time, without consuming any events.
    fn value_at(&self, time: f64) -> f32 {
        let (mut value, mut from) = (self.value, self.time);
        for event in self.events.iter() {
            match *event {
                ParamEvent::Set { value: v, time: t } if t <= time => {
                    value = v;
                    from = t;
                }
                ParamEvent::Ramp { value: v, end } if end <= time => {
                    value = v;
                    from = end;
                }
                ParamEvent::Ramp { value: v, end } => {
                    return ramp(value, v, from, end, time);
                }
                ParamEvent::Set { .. } => break,
            }
        }
        value
    }

    /// Consumes every event that has fully elapsed at the given time and returns the value then.
    fn advance(&mut self, time: f64) -> f32 {
        while let Some(event) = self.events.front() {
            if event.time() > time {
                break;
            }
            match *event {
                ParamEvent::Set { value, time } => {
                    self.value = value;
                    self.time = time;
                }
                ParamEvent::Ramp { value, end } => {
                    self.value = value;
                    self.time = end;
                }
            }
            self.events.pop_front();
        }
        self.value_at(time)
    }
}

fn ramp(from_value: f32, to_value: f32, from: f64, to: f64, time: f64) -> f32 {
    if to <= from {
        return to_value;
    }
    let progress = ((time - from) / (to - from)).clamp(0.0, 1.0) as f32;
    from_value + (to_value - from_value) * progress
}

struct Source {
    buffer: Arc<SampleBuffer>,
    looping: bool,
    /// Frame the source starts at, once started.
    start: Option<u64>,
    stop: Option<u64>,
    /// Read position in buffer frames.
    position: f64,
    /// Buffer frames advanced per output frame.
    step: f64,
    ended: bool,
}

impl Source {
    fn render(&mut self, first_frame: u64, output: &mut [[f32; 2]]) {
        let frames = self.buffer.frames();
        for (i, out) in output.iter_mut().enumerate() {
            let frame = first_frame + i as u64;
            let playing = self.start.is_some_and(|start| frame >= start)
                && self.stop.map_or(true, |stop| frame < stop);
            if !playing || self.ended || frames == 0 {
                *out = [0.0, 0.0];
                continue;
            }

            if self.position >= frames as f64 {
                if !self.looping {
                    self.ended = true;
                    *out = [0.0, 0.0];
                    continue;
                }
                self.position %= frames as f64;
            }

            let index = self.position as usize;
            let frac = (self.position - index as f64) as f32;
            let next = if index + 1 < frames {
                index + 1
            } else if self.looping {
                0
            } else {
                index
            };
            let a = self.buffer.frame(index);
            let b = self.buffer.frame(next);
            *out = [a[0] + (b[0] - a[0]) * frac, a[1] + (b[1] - a[1]) * frac];
            self.position += self.step;
        }
    }
}

struct Lowpass {
    frequency: ParamState,
    cutoff: f32,
    filters: [DirectForm2Transposed<f32>; 2],
}

impl Lowpass {
    fn coefficients(sample_rate: u32, cutoff: f32) -> Option<Coefficients<f32>> {
        let nyquist = sample_rate as f32 / 2.0;
        let cutoff = cutoff.clamp(MIN_CUTOFF, (nyquist - 1.0).max(MIN_CUTOFF));
        Coefficients::<f32>::from_params(
            Type::LowPass,
            (sample_rate as f32).hz(),
            cutoff.hz(),
            Q_BUTTERWORTH_F32,
        )
        .ok()
    }

    fn new(sample_rate: u32) -> Lowpass {
        let coefficients = Lowpass::coefficients(sample_rate, DEFAULT_CUTOFF).unwrap_or(
            Coefficients {
                a1: 0.0,
                a2: 0.0,
                b0: 1.0,
                b1: 0.0,
                b2: 0.0,
            },
        );
        Lowpass {
            frequency: ParamState::new(DEFAULT_CUTOFF),
            cutoff: DEFAULT_CUTOFF,
            filters: [
                DirectForm2Transposed::<f32>::new(coefficients),
                DirectForm2Transposed::<f32>::new(coefficients),
            ],
        }
    }

    fn render(&mut self, sample_rate: u32, time: f64, frames: &mut [[f32; 2]]) {
        let cutoff = self.frequency.advance(time);
        if cutoff != self.cutoff {
            match Lowpass::coefficients(sample_rate, cutoff) {
                Some(coefficients) => {
                    for filter in self.filters.iter_mut() {
                        filter.update_coefficients(coefficients);
                    }
                }
                None => warn!(cutoff, "Unable to compute lowpass coefficients"),
            }
            self.cutoff = cutoff;
        }

        for frame in frames.iter_mut() {
            frame[0] = self.filters[0].run(frame[0]);
            frame[1] = self.filters[1].run(frame[1]);
        }
    }
}

enum Processor {
    Destination,
    Gain { gain: ParamState, applied: f32 },
    Combiner,
    Source(Source),
    Lowpass(Box<Lowpass>),
    Convolver(Box<Convolver>),
}

struct Node {
    processor: Processor,
    inputs: Vec<NodeId>,
    output: Vec<[f32; 2]>,
}

/// A pull-based renderer over a node graph. Every quantum, nodes are processed in topological
/// order: each sums the output of its inputs, then applies its own processing.
pub struct RenderGraph {
    sample_rate: u32,
    nodes: Vec<Node>,
    /// Processing order. Only nodes that reach the destination are rendered.
    order: Vec<NodeId>,
    /// Frames rendered so far.
    frame: u64,
    /// The destination output of the last quantum and how much of it was handed out.
    pending: Vec<[f32; 2]>,
    pending_position: usize,
}

impl RenderGraph {
    pub fn new(sample_rate: u32) -> RenderGraph {
        let mut graph = RenderGraph {
            sample_rate,
            nodes: Vec::new(),
            order: Vec::new(),
            frame: 0,
            pending: vec![[0.0, 0.0]; QUANTUM],
            pending_position: QUANTUM,
        };
        graph.create(Processor::Destination);
        graph.order = vec![NodeId(0)];
        graph
    }

    fn create(&mut self, processor: Processor) -> NodeId {
        self.nodes.push(Node {
            processor,
            inputs: Vec::new(),
            output: vec![[0.0, 0.0]; QUANTUM],
        });
        NodeId(self.nodes.len() - 1)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, ContextError> {
        self.nodes.get_mut(id.0).ok_or(ContextError::UnknownNode(id))
    }

    fn param_mut(&mut self, param: Param) -> Result<&mut ParamState, ContextError> {
        let node = self.node_mut(param.node)?;
        match (&mut node.processor, param.kind) {
            (Processor::Gain { gain, .. }, ParamKind::Gain) => Ok(gain),
            (Processor::Lowpass(lowpass), ParamKind::Frequency) => Ok(&mut lowpass.frequency),
            _ => Err(ContextError::NoSuchParam {
                node: param.node,
                kind: param.kind,
            }),
        }
    }

    fn source_mut(&mut self, id: NodeId) -> Result<&mut Source, ContextError> {
        match &mut self.node_mut(id)?.processor {
            Processor::Source(source) => Ok(source),
            _ => Err(ContextError::NotASource(id)),
        }
    }

    fn to_frame(&self, when: f64) -> u64 {
        (when.max(0.0) * self.sample_rate as f64).ceil() as u64
    }

    /// Recomputes the processing order with a post-order walk from the destination.
    fn sort(&mut self) {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![(NodeId(0), false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            if visited[id.0] {
                continue;
            }
            visited[id.0] = true;
            stack.push((id, true));
            for input in self.nodes[id.0].inputs.iter().rev() {
                if !visited[input.0] {
                    stack.push((*input, false));
                }
            }
        }
        self.order = order;
    }

    pub fn current_time(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn create_gain(&mut self) -> NodeId {
        self.create(Processor::Gain {
            gain: ParamState::new(DEFAULT_GAIN),
            applied: DEFAULT_GAIN,
        })
    }

    pub fn create_combiner(&mut self) -> NodeId {
        self.create(Processor::Combiner)
    }

    pub fn create_buffer_source(&mut self, buffer: Arc<SampleBuffer>, looping: bool) -> NodeId {
        let step = if self.sample_rate == 0 {
            1.0
        } else {
            buffer.sample_rate() as f64 / self.sample_rate as f64
        };
        self.create(Processor::Source(Source {
            buffer,
            looping,
            start: None,
            stop: None,
            position: 0.0,
            step,
            ended: false,
        }))
    }

    pub fn create_lowpass(&mut self) -> NodeId {
        self.create(Processor::Lowpass(Box::new(Lowpass::new(self.sample_rate))))
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), ContextError> {
        if from.0 >= self.nodes.len() {
            return Err(ContextError::UnknownNode(from));
        }
        if to.0 >= self.nodes.len() {
            return Err(ContextError::UnknownNode(to));
        }
        if is_upstream(to, from, |id| self.nodes[id.0].inputs.as_slice()) {
            return Err(ContextError::Cycle { from, to });
        }
        let node = self.node_mut(to)?;
        if !node.inputs.contains(&from) {
            node.inputs.push(from);
            self.sort();
        }
        Ok(())
    }

    pub fn start(&mut self, id: NodeId, when: f64) -> Result<(), ContextError> {
        let frame = self.to_frame(when);
        let source = self.source_mut(id)?;
        if source.start.is_some() {
            return Err(ContextError::AlreadyStarted(id));
        }
        source.start = Some(frame);
        Ok(())
    }

    pub fn stop(&mut self, id: NodeId, when: f64) -> Result<(), ContextError> {
        let frame = self.to_frame(when);
        self.source_mut(id)?.stop = Some(frame);
        Ok(())
    }

    pub fn set_value_at_time(
        &mut self,
        param: Param,
        value: f32,
        when: f64,
    ) -> Result<(), ContextError> {
        self.param_mut(param)?
            .schedule(ParamEvent::Set { value, time: when });
        Ok(())
    }

    pub fn linear_ramp_to_value_at_time(
        &mut self,
        param: Param,
        value: f32,
        end: f64,
    ) -> Result<(), ContextError> {
        self.param_mut(param)?
            .schedule(ParamEvent::Ramp { value, end });
        Ok(())
    }

    pub fn value(&mut self, param: Param) -> Result<f32, ContextError> {
        let now = self.current_time();
        Ok(self.param_mut(param)?.value_at(now))
    }

    /// Renders one quantum into every reachable node's output buffer.
    fn render_quantum(&mut self) {
        let time = self.current_time();
        let sample_rate = self.sample_rate;
        let first_frame = self.frame;

        for position in 0..self.order.len() {
            let id = self.order[position];
            let mut output = std::mem::take(&mut self.nodes[id.0].output);
            output.fill([0.0, 0.0]);
            for input in self.nodes[id.0].inputs.iter() {
                for (out, sample) in output.iter_mut().zip(self.nodes[input.0].output.iter()) {
                    out[0] += sample[0];
                    out[1] += sample[1];
                }
            }

            match &mut self.nodes[id.0].processor {
                Processor::Destination | Processor::Combiner => {}
                Processor::Gain { gain, applied } => {
                    let target = gain.advance(time);
                    let from = *applied;
                    let delta = (target - from) / QUANTUM as f32;
                    for (i, frame) in output.iter_mut().enumerate() {
                        let g = from + delta * (i + 1) as f32;
                        frame[0] *= g;
                        frame[1] *= g;
                    }
                    *applied = target;
                }
                Processor::Source(source) => source.render(first_frame, &mut output),
                Processor::Lowpass(lowpass) => lowpass.render(sample_rate, time, &mut output),
                Processor::Convolver(convolver) => convolver.process(&mut output),
            }

            self.nodes[id.0].output = output;
        }

        self.frame += QUANTUM as u64;
    }

    /// Fills an interleaved device buffer. Channels beyond the first two are left silent; a mono
    /// device gets the average of both sides.
    pub fn render_interleaved(&mut self, data: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        for frame in data.chunks_mut(channels) {
            if self.pending_position == QUANTUM {
                self.render_quantum();
                self.pending.copy_from_slice(&self.nodes[0].output);
                self.pending_position = 0;
            }
            let [left, right] = self.pending[self.pending_position];
            self.pending_position += 1;

            match frame.len() {
                1 => frame[0] = (left + right) / 2.0,
                _ => {
                    frame[0] = left;
                    frame[1] = right;
                    frame[2..].fill(0.0);
                }
            }
        }
    }
}

/// An audio context backed by a render graph. Nodes are created and automated from any thread
/// while a device callback pulls audio out of it.
pub struct Context {
    name: String,
    graph: Mutex<RenderGraph>,
}

impl Context {
    pub fn new(name: &str, sample_rate: u32) -> Context {
        Context {
            name: name.to_string(),
            graph: Mutex::new(RenderGraph::new(sample_rate)),
        }
    }

    /// Fills an interleaved output buffer from the graph.
    pub fn render(&self, data: &mut [f32], channels: usize) {
        self.graph.lock().render_interleaved(data, channels);
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} Hz)", self.name, self.graph.lock().sample_rate())
    }
}

impl super::Context for Context {
    fn current_time(&self) -> f64 {
        self.graph.lock().current_time()
    }

    fn sample_rate(&self) -> u32 {
        self.graph.lock().sample_rate()
    }

    fn destination(&self) -> NodeId {
        NodeId(0)
    }

    fn create_gain(&self) -> NodeId {
        self.graph.lock().create_gain()
    }

    fn create_combiner(&self) -> NodeId {
        self.graph.lock().create_combiner()
    }

    fn create_buffer_source(&self, buffer: Arc<SampleBuffer>, looping: bool) -> NodeId {
        self.graph.lock().create_buffer_source(buffer, looping)
    }

    fn create_lowpass(&self) -> NodeId {
        self.graph.lock().create_lowpass()
    }

    fn create_convolver(&self, impulse: Arc<SampleBuffer>) -> NodeId {
        // Partitioning the impulse is the expensive part; keep it outside the lock.
        let convolver = Box::new(Convolver::new(&impulse));
        self.graph.lock().create(Processor::Convolver(convolver))
    }

    fn connect(&self, from: NodeId, to: NodeId) -> Result<(), ContextError> {
        self.graph.lock().connect(from, to)
    }

    fn start(&self, source: NodeId, when: f64) -> Result<(), ContextError> {
        self.graph.lock().start(source, when)
    }

    fn stop(&self, source: NodeId, when: f64) -> Result<(), ContextError> {
        self.graph.lock().stop(source, when)
    }

    fn set_value_at_time(&self, param: Param, value: f32, when: f64) -> Result<(), ContextError> {
        self.graph.lock().set_value_at_time(param, value, when)
    }

    fn linear_ramp_to_value_at_time(
        &self,
        param: Param,
        value: f32,
        end: f64,
    ) -> Result<(), ContextError> {
        self.graph
            .lock()
            .linear_ramp_to_value_at_time(param, value, end)
    }

    fn value(&self, param: Param) -> Result<f32, ContextError> {
        self.graph.lock().value(param)
    }
}
