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
use std::time::Duration;

/// An immutable, decoded audio buffer. Samples are stored planar (one Vec per channel) and
/// limited to mono or stereo; the buffer is shared read-only between every node playing it.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    /// Planar sample storage, one or two channels of equal length.
    channels: Vec<Vec<f32>>,
    /// The rate the samples were recorded at.
    sample_rate: u32,
}

impl SampleBuffer {
    /// Creates a buffer from planar channels. More than two channels are folded down to
    /// stereo by summing odd channels into the right and even channels into the left.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> SampleBuffer {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        let mut channels: Vec<Vec<f32>> = channels
            .into_iter()
            .map(|mut channel| {
                channel.truncate(frames);
                channel
            })
            .collect();

        if channels.len() > 2 {
            let mut folded = vec![vec![0.0; frames]; 2];
            for (i, channel) in channels.iter().enumerate() {
                for (out, sample) in folded[i % 2].iter_mut().zip(channel.iter()) {
                    *out += sample;
                }
            }
            channels = folded;
        }

        SampleBuffer {
            channels,
            sample_rate,
        }
    }

    /// Creates a buffer from interleaved samples.
    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> SampleBuffer {
        if channel_count == 0 {
            return SampleBuffer::new(Vec::new(), sample_rate);
        }

        let frames = samples.len() / channel_count;
        let mut planar = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (channel, sample) in planar.iter_mut().zip(frame.iter()) {
                channel.push(*sample);
            }
        }
        SampleBuffer::new(planar, sample_rate)
    }

    /// Number of channels (1 or 2 for any non-empty buffer).
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// The samples of a single channel.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// The stereo frame at the given position. Mono buffers are duplicated to both sides.
    #[inline]
    pub fn frame(&self, index: usize) -> [f32; 2] {
        match self.channels.len() {
            0 => [0.0, 0.0],
            1 => {
                let s = self.channels[0][index];
                [s, s]
            }
            _ => [self.channels[0][index], self.channels[1][index]],
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

#[cfg(test)]
mod test {
    use super::SampleBuffer;

    #[test]
    fn test_from_interleaved() {
        let buffer = SampleBuffer::from_interleaved(&[0.1, 0.2, 0.3, 0.4, 0.5], 2, 44100);
        assert_eq!(2, buffer.channel_count());
        assert_eq!(2, buffer.frames());
        assert_eq!(&[0.1, 0.3], buffer.channel(0));
        assert_eq!(&[0.2, 0.4], buffer.channel(1));
        assert_eq!([0.3, 0.4], buffer.frame(1));
    }

    #[test]
    fn test_mono_frames_are_duplicated() {
        let buffer = SampleBuffer::new(vec![vec![0.5, -0.5]], 48000);
        assert_eq!([0.5, 0.5], buffer.frame(0));
        assert_eq!([-0.5, -0.5], buffer.frame(1));
    }

    #[test]
    fn test_surround_folds_to_stereo() {
        let buffer = SampleBuffer::new(
            vec![vec![1.0, 1.0], vec![2.0, 2.0], vec![0.5, 0.5], vec![0.25, 0.25]],
            44100,
        );
        assert_eq!(2, buffer.channel_count());
        assert_eq!([1.5, 2.25], buffer.frame(0));
    }

    #[test]
    fn test_uneven_channels_are_truncated() {
        let buffer = SampleBuffer::new(vec![vec![1.0, 2.0, 3.0], vec![1.0]], 44100);
        assert_eq!(1, buffer.frames());
        assert_eq!(
            std::time::Duration::from_secs_f64(1.0 / 44100.0),
            buffer.duration()
        );
    }
}
