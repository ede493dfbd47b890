//! Delta sink contract and a band-limited step buffer.
//!
//! Chips never write samples. They report amplitude *changes* at clock
//! times; the buffer places each step between two output samples, then
//! integrates the steps back into a waveform when samples are read.

use crate::Time;

/// Receiver of timed amplitude changes.
pub trait DeltaSink {
    /// Amplitude of `voice` changes by `delta` at clock `time`.
    fn offset(&mut self, voice: usize, time: Time, delta: i32);

    /// The frame ends at clock `time`; the next frame starts at zero.
    fn end_frame(&mut self, _time: Time) {}
}

const FRAC_BITS: u32 = 16;
const FRAC_ONE: i64 = 1 << FRAC_BITS;

/// Clock-to-sample step buffer with integration and a DC-blocking
/// high-pass on output.
#[derive(Debug, Clone)]
pub struct BlipBuffer {
    clock_rate: u32,
    sample_rate: u32,
    /// Output samples per clock, 32.32 fixed point.
    factor: u64,
    /// Position of the current frame start, 32.32 samples from buffer start.
    offset: u64,
    /// Frame clock at which `factor` last changed; deltas are placed from here.
    rate_change_time: Time,
    buffer: Vec<i32>,
    integrator: i32,
    bass_shift: u32,
    dropped: u32,
}

impl BlipBuffer {
    /// Buffer for `clock_rate` input clocks holding `length_ms` of output.
    pub fn new(clock_rate: u32, sample_rate: u32, length_ms: u32) -> Self {
        let mut buf = Self {
            clock_rate: 1,
            sample_rate: sample_rate.max(1),
            factor: 0,
            offset: 0,
            rate_change_time: 0,
            buffer: Vec::new(),
            integrator: 0,
            bass_shift: 9,
            dropped: 0,
        };
        buf.set_sample_rate(sample_rate, length_ms);
        buf.set_clock_rate(clock_rate);
        buf
    }

    /// Resize for a new output rate; clears buffered audio.
    pub fn set_sample_rate(&mut self, sample_rate: u32, length_ms: u32) {
        self.sample_rate = sample_rate.max(1);
        let samples = (self.sample_rate as u64 * length_ms.max(1) as u64 / 1000) as usize;
        self.buffer = vec![0; samples + 2];
        self.set_clock_rate(self.clock_rate);
        self.clear();
    }

    /// Change the input clock rate.
    pub fn set_clock_rate(&mut self, clock_rate: u32) {
        self.clock_rate = clock_rate.max(1);
        let clock = self.clock_rate as u64;
        self.factor = (((self.sample_rate as u64) << 32) + clock / 2) / clock;
    }

    /// Switch to `clock_rate` at clock `time` of the current frame.
    ///
    /// Clocks before `time` keep the old rate. Sources must be run up to
    /// `time` first; later deltas stamped before it are dropped.
    pub fn change_clock_rate(&mut self, time: Time, clock_rate: u32) {
        let time = time.max(self.rate_change_time);
        self.offset += (time - self.rate_change_time) as u64 * self.factor;
        self.rate_change_time = time;
        self.set_clock_rate(clock_rate);
    }

    /// Input clock rate in Hz.
    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    /// Output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// High-pass strength; larger shifts pass more bass.
    pub fn set_bass_shift(&mut self, shift: u32) {
        self.bass_shift = shift.clamp(1, 24);
    }

    /// Drop all buffered samples and the integrator state.
    pub fn clear(&mut self) {
        self.offset = 0;
        self.rate_change_time = 0;
        self.integrator = 0;
        self.buffer.fill(0);
    }

    /// Number of deltas ignored because they fell outside the buffer.
    pub fn dropped_deltas(&self) -> u32 {
        self.dropped
    }

    /// Add a step of `delta` sample units at clock `time` of this frame.
    pub fn add_delta(&mut self, time: Time, delta: i32) {
        if delta == 0 {
            return;
        }
        let rel = time - self.rate_change_time;
        if rel < 0 {
            self.dropped += 1;
            log::debug!("delta at clock {time} before frame position dropped");
            return;
        }
        let pos = self.offset + rel as u64 * self.factor;
        let index = (pos >> 32) as usize;
        if index + 1 >= self.buffer.len() {
            self.dropped += 1;
            log::debug!("delta at clock {time} past end of buffer dropped");
            return;
        }
        let frac = ((pos >> (32 - FRAC_BITS)) as i64) & (FRAC_ONE - 1);
        let first = ((delta as i64 * (FRAC_ONE - frac)) >> FRAC_BITS) as i32;
        self.buffer[index] += first;
        self.buffer[index + 1] += delta - first;
    }

    /// Close the frame at clock `time`, making its samples readable.
    pub fn end_frame(&mut self, time: Time) {
        self.offset += (time - self.rate_change_time).max(0) as u64 * self.factor;
        self.rate_change_time = 0;
        let limit = ((self.buffer.len() - 1) as u64) << 32;
        if self.offset > limit {
            log::warn!("blip buffer overflow, frame too long for buffer");
            self.offset = limit;
        }
    }

    /// Complete samples waiting to be read.
    pub fn samples_avail(&self) -> usize {
        (self.offset >> 32) as usize
    }

    /// Clocks needed before `samples` more samples become available.
    pub fn count_clocks(&self, samples: usize) -> Time {
        let samples = samples.min(self.buffer.len().saturating_sub(2));
        let target = (samples as u64) << 32;
        let filled = self.offset & 0xFFFF_FFFF;
        let need = target.saturating_sub(filled);
        self.rate_change_time + need.div_ceil(self.factor.max(1)) as Time
    }

    /// Read up to `out.len()` samples; returns how many were written.
    pub fn read_samples(&mut self, out: &mut [i16]) -> usize {
        let count = out.len().min(self.samples_avail());
        let mut integ = self.integrator;
        for (slot, &step) in out.iter_mut().zip(&self.buffer[..count]) {
            integ = integ.wrapping_add(step);
            *slot = integ.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            integ -= integ >> self.bass_shift;
        }
        self.integrator = integ;
        self.remove_samples(count);
        count
    }

    fn remove_samples(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.buffer.copy_within(count.., 0);
        let len = self.buffer.len();
        self.buffer[len - count..].fill(0);
        self.offset -= (count as u64) << 32;
    }
}

/// [`BlipBuffer`] front end that scales each voice by its own gain.
#[derive(Debug, Clone)]
pub struct VoiceMixer {
    buffer: BlipBuffer,
    /// Per-voice gain in 16.16 sample units per amplitude step.
    gains: Vec<i32>,
}

impl VoiceMixer {
    /// Mixer over a fresh buffer with `voices` silent voices.
    pub fn new(buffer: BlipBuffer, voices: usize) -> Self {
        Self {
            buffer,
            gains: vec![0; voices],
        }
    }

    /// Set `voice` so one amplitude step equals `fraction` of full scale.
    pub fn set_voice_gain(&mut self, voice: usize, fraction: f32) {
        if voice >= self.gains.len() {
            self.gains.resize(voice + 1, 0);
        }
        self.gains[voice] = (fraction as f64 * 32767.0 * 65536.0).round() as i32;
    }

    /// Multiply every voice gain by `scale`.
    pub fn scale_gains(&mut self, scale: f32) {
        for g in &mut self.gains {
            *g = (*g as f64 * scale as f64).round() as i32;
        }
    }

    /// Underlying sample buffer.
    pub fn buffer(&self) -> &BlipBuffer {
        &self.buffer
    }

    /// Mutable access to the underlying sample buffer.
    pub fn buffer_mut(&mut self) -> &mut BlipBuffer {
        &mut self.buffer
    }
}

impl DeltaSink for VoiceMixer {
    fn offset(&mut self, voice: usize, time: Time, delta: i32) {
        let gain = self.gains.get(voice).copied().unwrap_or(0) as i64;
        let scaled = (delta as i64 * gain) >> 16;
        self.buffer.add_delta(time, scaled as i32);
    }

    fn end_frame(&mut self, time: Time) {
        self.buffer.end_frame(time);
    }
}

/// Sink that records every event, for inspecting chip output.
#[derive(Debug, Clone, Default)]
pub struct DeltaRecorder {
    /// Recorded `(voice, time, delta)` events in arrival order.
    pub events: Vec<(usize, Time, i32)>,
    /// Frame end times seen so far.
    pub frames: Vec<Time>,
}

impl DeltaRecorder {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of every delta of `voice`: its absolute level after the events.
    pub fn level(&self, voice: usize) -> i32 {
        self.events
            .iter()
            .filter(|(v, _, _)| *v == voice)
            .map(|(_, _, d)| d)
            .sum()
    }

    /// Sum of deltas of `voice` with time `<= time` in the current frame.
    pub fn level_at(&self, voice: usize, time: Time) -> i32 {
        self.events
            .iter()
            .filter(|(v, t, _)| *v == voice && *t <= time)
            .map(|(_, _, d)| d)
            .sum()
    }
}

impl DeltaSink for DeltaRecorder {
    fn offset(&mut self, voice: usize, time: Time, delta: i32) {
        self.events.push((voice, time, delta));
    }

    fn end_frame(&mut self, time: Time) {
        self.frames.push(time);
    }
}
