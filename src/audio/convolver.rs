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
// Uniformly partitioned overlap-save convolution. The impulse response is cut
// into partitions of PARTITION frames, each transformed once up front. Every
// PARTITION input frames, the latest input block is transformed, pushed onto a
// frequency-domain delay line and multiplied against the partitions. Output
// therefore trails input by one partition.
//
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use super::SampleBuffer;

/// Partition length in frames. Also the latency of the wet signal.
pub const PARTITION: usize = 1024;

const FFT_SIZE: usize = PARTITION * 2;
const BINS: usize = FFT_SIZE / 2 + 1;

/// Convolution state for one channel.
struct ChannelState {
    /// Impulse response partitions in the frequency domain.
    partitions: Vec<Vec<Complex<f32>>>,
    /// Frequency-domain delay line of past input blocks, newest at `head`.
    history: Vec<Vec<Complex<f32>>>,
    head: usize,
    /// The previous and current input blocks, back to back.
    window: Vec<f32>,
    /// Input collected for the current block.
    input: Vec<f32>,
    /// Output of the last processed block.
    output: Vec<f32>,
}

/// A stereo convolution reverb.
pub struct Convolver {
    channels: Vec<ChannelState>,
    r2c: Arc<dyn RealToComplex<f32>>,
    c2r: Arc<dyn ComplexToReal<f32>>,
    spectrum: Vec<Complex<f32>>,
    accumulator: Vec<Complex<f32>>,
    time_domain: Vec<f32>,
    forward_scratch: Vec<Complex<f32>>,
    inverse_scratch: Vec<Complex<f32>>,
    /// Position inside the current block.
    position: usize,
}

impl Convolver {
    /// Creates a convolver for the given impulse. The impulse is normalized to unit energy so
    /// the wet level doesn't depend on the length or loudness of the recording.
    pub fn new(impulse: &SampleBuffer) -> Convolver {
        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(FFT_SIZE);
        let c2r = planner.plan_fft_inverse(FFT_SIZE);

        let energy: f32 = (0..impulse.channel_count())
            .flat_map(|c| impulse.channel(c).iter())
            .map(|s| s * s)
            .sum::<f32>()
            / impulse.channel_count().max(1) as f32;
        let scale = if energy > 0.0 { 1.0 / energy.sqrt() } else { 0.0 };

        let mut forward_scratch = r2c.make_scratch_vec();
        let channels = (0..2)
            .map(|c| {
                let source = if impulse.channel_count() == 0 {
                    &[][..]
                } else {
                    impulse.channel(c.min(impulse.channel_count() - 1))
                };

                let partitions = source
                    .chunks(PARTITION)
                    .map(|chunk| {
                        let mut padded = vec![0.0; FFT_SIZE];
                        for (out, sample) in padded.iter_mut().zip(chunk.iter()) {
                            *out = sample * scale;
                        }
                        let mut spectrum = r2c.make_output_vec();
                        if r2c
                            .process_with_scratch(&mut padded, &mut spectrum, &mut forward_scratch)
                            .is_err()
                        {
                            spectrum.fill(Complex::default());
                        }
                        spectrum
                    })
                    .collect::<Vec<_>>();

                ChannelState {
                    history: vec![vec![Complex::default(); BINS]; partitions.len().max(1)],
                    partitions,
                    head: 0,
                    window: vec![0.0; FFT_SIZE],
                    input: vec![0.0; PARTITION],
                    output: vec![0.0; PARTITION],
                }
            })
            .collect();

        Convolver {
            channels,
            spectrum: r2c.make_output_vec(),
            accumulator: r2c.make_output_vec(),
            time_domain: vec![0.0; FFT_SIZE],
            inverse_scratch: c2r.make_scratch_vec(),
            forward_scratch,
            r2c,
            c2r,
            position: 0,
        }
    }

    /// Convolves the frames in place.
    pub fn process(&mut self, frames: &mut [[f32; 2]]) {
        for frame in frames.iter_mut() {
            for (c, sample) in frame.iter_mut().enumerate() {
                let channel = &mut self.channels[c];
                channel.input[self.position] = *sample;
                *sample = channel.output[self.position];
            }

            self.position += 1;
            if self.position == PARTITION {
                self.position = 0;
                for c in 0..self.channels.len() {
                    self.process_block(c);
                }
            }
        }
    }

    fn process_block(&mut self, c: usize) {
        let channel = &mut self.channels[c];
        if channel.partitions.is_empty() {
            channel.output.fill(0.0);
            return;
        }

        // Slide the window: previous block moves to the front, the new block fills the back.
        channel.window.copy_within(PARTITION.., 0);
        channel.window[PARTITION..].copy_from_slice(&channel.input);

        self.time_domain.copy_from_slice(&channel.window);
        if self
            .r2c
            .process_with_scratch(
                &mut self.time_domain,
                &mut self.spectrum,
                &mut self.forward_scratch,
            )
            .is_err()
        {
            channel.output.fill(0.0);
            return;
        }

        let count = channel.history.len();
        channel.head = (channel.head + 1) % count;
        channel.history[channel.head].copy_from_slice(&self.spectrum);

        self.accumulator.fill(Complex::default());
        for (p, partition) in channel.partitions.iter().enumerate() {
            let block = &channel.history[(channel.head + count - p) % count];
            for ((acc, x), h) in self.accumulator.iter_mut().zip(block.iter()).zip(partition) {
                *acc += x * h;
            }
        }
        self.accumulator[0].im = 0.0;
        self.accumulator[BINS - 1].im = 0.0;

        if self
            .c2r
            .process_with_scratch(
                &mut self.accumulator,
                &mut self.time_domain,
                &mut self.inverse_scratch,
            )
            .is_err()
        {
            channel.output.fill(0.0);
            return;
        }

        // Overlap-save: only the second half is free of circular wrap-around.
        let norm = 1.0 / FFT_SIZE as f32;
        for (out, sample) in channel
            .output
            .iter_mut()
            .zip(self.time_domain[PARTITION..].iter())
        {
            *out = sample * norm;
        }
    }
}
