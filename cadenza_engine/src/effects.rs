use std::f32::consts::PI;

use cadenza_shared::{
    ChorusParams, CompressorParams, DelayParams, EffectParams, EqParams, LimiterParams,
    ReverbParams,
};

use crate::midi::MidiEvent;
use crate::plugin::PluginUnit;

/// Time constant for smoothing gain-class parameter changes.
const SMOOTH_SECONDS: f32 = 0.010;

/// One-pole smoother toward a moving target value.
#[derive(Clone, Copy)]
struct Smoothed {
    current: f32,
    coeff: f32,
}

impl Smoothed {
    fn new(value: f32, sample_rate: f32) -> Self {
        Self {
            current: value,
            coeff: (-1.0 / (SMOOTH_SECONDS * sample_rate)).exp(),
        }
    }

    fn next(&mut self, target: f32) -> f32 {
        self.current = self.coeff * self.current + (1.0 - self.coeff) * target;
        self.current
    }

    /// Advance by a whole block at once, for block-rate parameters.
    fn next_block(&mut self, target: f32, frames: usize) -> f32 {
        self.current = target + (self.current - target) * self.coeff.powi(frames as i32);
        self.current
    }
}

/// Biquad filter (2nd-order IIR, Direct Form I), RBJ cookbook designs.
#[derive(Clone, Copy)]
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

#[derive(Clone, Copy)]
enum BiquadKind {
    LowShelf,
    HighShelf,
    Peaking,
}

impl Biquad {
    fn new() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn design(&mut self, kind: BiquadKind, freq: f32, gain_db: f32, q: f32, sample_rate: f32) {
        let omega = 2.0 * PI * freq / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);
        let a = 10_f32.powf(gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match kind {
            BiquadKind::LowShelf => {
                let b0 = a * ((a + 1.0) - (a - 1.0) * cos_omega + 2.0 * a.sqrt() * alpha);
                let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega);
                let b2 = a * ((a + 1.0) - (a - 1.0) * cos_omega - 2.0 * a.sqrt() * alpha);
                let a0 = (a + 1.0) + (a - 1.0) * cos_omega + 2.0 * a.sqrt() * alpha;
                let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_omega);
                let a2 = (a + 1.0) + (a - 1.0) * cos_omega - 2.0 * a.sqrt() * alpha;
                (b0, b1, b2, a0, a1, a2)
            }
            BiquadKind::HighShelf => {
                let b0 = a * ((a + 1.0) + (a - 1.0) * cos_omega + 2.0 * a.sqrt() * alpha);
                let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_omega);
                let b2 = a * ((a + 1.0) + (a - 1.0) * cos_omega - 2.0 * a.sqrt() * alpha);
                let a0 = (a + 1.0) - (a - 1.0) * cos_omega + 2.0 * a.sqrt() * alpha;
                let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_omega);
                let a2 = (a + 1.0) - (a - 1.0) * cos_omega - 2.0 * a.sqrt() * alpha;
                (b0, b1, b2, a0, a1, a2)
            }
            BiquadKind::Peaking => {
                let b0 = 1.0 + alpha * a;
                let b1 = -2.0 * cos_omega;
                let b2 = 1.0 - alpha * a;
                let a0 = 1.0 + alpha / a;
                let a1 = -2.0 * cos_omega;
                let a2 = 1.0 - alpha / a;
                (b0, b1, b2, a0, a1, a2)
            }
        };

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    fn process(&mut self, input: f32) -> f32 {
        let output = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

/// Four-band EQ: low shelf, two peaking mids, high shelf; stereo pairs.
/// Band gains are smoothed at block rate so a gain change re-designs the
/// filters along a short ramp instead of stepping.
pub struct EqUnit {
    bands_l: [Biquad; 4],
    bands_r: [Biquad; 4],
    cached: EqParams,
    gains: [Smoothed; 4],
    sample_rate: f32,
}

impl EqUnit {
    fn new(params: &EqParams, sample_rate: f32) -> Self {
        let gains = [
            params.low_gain_db,
            params.mid1_gain_db,
            params.mid2_gain_db,
            params.high_gain_db,
        ]
        .map(|g| Smoothed::new(g, sample_rate));
        let mut unit = Self {
            bands_l: [Biquad::new(); 4],
            bands_r: [Biquad::new(); 4],
            cached: *params,
            gains,
            sample_rate,
        };
        unit.redesign();
        unit
    }

    fn redesign(&mut self) {
        let p = self.cached;
        let g = self.gains.map(|s| s.current);
        let sr = self.sample_rate;
        for bands in [&mut self.bands_l, &mut self.bands_r] {
            bands[0].design(BiquadKind::LowShelf, p.low_freq, g[0], 0.707, sr);
            bands[1].design(BiquadKind::Peaking, p.mid1_freq, g[1], p.mid1_q, sr);
            bands[2].design(BiquadKind::Peaking, p.mid2_freq, g[2], p.mid2_q, sr);
            bands[3].design(BiquadKind::HighShelf, p.high_freq, g[3], 0.707, sr);
        }
    }

    fn process(&mut self, buf: &mut [f32], frames: usize, params: &EqParams) {
        let mut redesign = *params != self.cached;
        self.cached = *params;
        let targets = [
            params.low_gain_db,
            params.mid1_gain_db,
            params.mid2_gain_db,
            params.high_gain_db,
        ];
        for (smoothed, &target) in self.gains.iter_mut().zip(targets.iter()) {
            let before = smoothed.current;
            if (smoothed.next_block(target, frames) - before).abs() > 1e-5 {
                redesign = true;
            }
        }
        if redesign {
            self.redesign();
        }
        for i in 0..frames {
            let mut l = buf[i * 2];
            let mut r = buf[i * 2 + 1];
            for band in &mut self.bands_l {
                l = band.process(l);
            }
            for band in &mut self.bands_r {
                r = band.process(r);
            }
            buf[i * 2] = l;
            buf[i * 2 + 1] = r;
        }
    }
}

pub struct CompressorUnit {
    envelope: f32,
    attack_coeff: f32,
    release_coeff: f32,
    makeup: Smoothed,
    cached: CompressorParams,
    sample_rate: f32,
}

impl CompressorUnit {
    fn new(params: &CompressorParams, sample_rate: f32) -> Self {
        let mut unit = Self {
            envelope: 1.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            makeup: Smoothed::new(10_f32.powf(params.makeup_gain_db / 20.0), sample_rate),
            cached: *params,
            sample_rate,
        };
        unit.update_coefficients();
        unit
    }

    fn update_coefficients(&mut self) {
        self.attack_coeff = (-1.0 / (self.cached.attack_ms * 0.001 * self.sample_rate)).exp();
        self.release_coeff = (-1.0 / (self.cached.release_ms * 0.001 * self.sample_rate)).exp();
    }

    fn gain_reduction(&self, input_level: f32) -> f32 {
        if input_level <= 0.0 {
            return 1.0;
        }
        let input_db = 20.0 * input_level.log10();
        if input_db < self.cached.threshold_db {
            1.0
        } else {
            let over_db = input_db - self.cached.threshold_db;
            let reduction_db = over_db * (1.0 - 1.0 / self.cached.ratio);
            10_f32.powf(-reduction_db / 20.0)
        }
    }

    fn process(&mut self, buf: &mut [f32], frames: usize, params: &CompressorParams) {
        if *params != self.cached {
            self.cached = *params;
            self.update_coefficients();
        }
        let makeup_target = 10_f32.powf(self.cached.makeup_gain_db / 20.0);
        for i in 0..frames {
            let l = buf[i * 2];
            let r = buf[i * 2 + 1];
            // RMS of the stereo pair drives a linked gain envelope.
            let level = ((l * l + r * r) * 0.5).sqrt();
            let target = self.gain_reduction(level);
            if target < self.envelope {
                self.envelope = self.attack_coeff * self.envelope + (1.0 - self.attack_coeff) * target;
            } else {
                self.envelope =
                    self.release_coeff * self.envelope + (1.0 - self.release_coeff) * target;
            }
            let gain = self.envelope * self.makeup.next(makeup_target);
            buf[i * 2] = l * gain;
            buf[i * 2 + 1] = r * gain;
        }
    }
}

pub struct DelayUnit {
    buffer_left: Vec<f32>,
    buffer_right: Vec<f32>,
    write_pos: usize,
    sample_rate: f32,
}

impl DelayUnit {
    fn new(sample_rate: f32) -> Self {
        // Max 2 seconds.
        let max_samples = (sample_rate * 2.0) as usize;
        Self {
            buffer_left: vec![0.0; max_samples],
            buffer_right: vec![0.0; max_samples],
            write_pos: 0,
            sample_rate,
        }
    }

    fn process(&mut self, buf: &mut [f32], frames: usize, params: &DelayParams) {
        let size = self.buffer_left.len();
        let delay_samples =
            ((params.delay_time_ms * 0.001 * self.sample_rate) as usize).min(size - 1);
        let feedback = params.feedback.clamp(0.0, 0.99);
        let wet = params.wet_dry_mix.clamp(0.0, 1.0);

        for i in 0..frames {
            let l = buf[i * 2];
            let r = buf[i * 2 + 1];
            let read_pos = (self.write_pos + size - delay_samples) % size;
            let delayed_l = self.buffer_left[read_pos];
            let delayed_r = self.buffer_right[read_pos];

            self.buffer_left[self.write_pos] = l + delayed_l * feedback;
            self.buffer_right[self.write_pos] = r + delayed_r * feedback;
            self.write_pos = (self.write_pos + 1) % size;

            buf[i * 2] = l * (1.0 - wet) + delayed_l * wet;
            buf[i * 2 + 1] = r * (1.0 - wet) + delayed_r * wet;
        }
    }
}

/// Freeverb: 8 parallel combs and 4 series allpasses per channel, with the
/// right channel's lines stereo-spread a few samples longer.
pub struct ReverbUnit {
    comb_buffers_l: Vec<Vec<f32>>,
    comb_buffers_r: Vec<Vec<f32>>,
    comb_positions_l: [usize; 8],
    comb_positions_r: [usize; 8],
    comb_state_l: [f32; 8],
    comb_state_r: [f32; 8],
    allpass_buffers_l: Vec<Vec<f32>>,
    allpass_buffers_r: Vec<Vec<f32>>,
    allpass_positions_l: [usize; 4],
    allpass_positions_r: [usize; 4],
}

const COMB_LENGTHS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_LENGTHS: [usize; 4] = [556, 441, 341, 225];

impl ReverbUnit {
    fn new(sample_rate: f32) -> Self {
        // Reference lengths are tuned for 44.1 kHz.
        let scale = |len: usize| (len as f32 * sample_rate / 44100.0) as usize;
        Self {
            comb_buffers_l: COMB_LENGTHS.iter().map(|&l| vec![0.0; scale(l)]).collect(),
            comb_buffers_r: COMB_LENGTHS
                .iter()
                .map(|&l| vec![0.0; scale(l) + 23])
                .collect(),
            comb_positions_l: [0; 8],
            comb_positions_r: [0; 8],
            comb_state_l: [0.0; 8],
            comb_state_r: [0.0; 8],
            allpass_buffers_l: ALLPASS_LENGTHS
                .iter()
                .map(|&l| vec![0.0; scale(l)])
                .collect(),
            allpass_buffers_r: ALLPASS_LENGTHS
                .iter()
                .map(|&l| vec![0.0; scale(l) + 11])
                .collect(),
            allpass_positions_l: [0; 4],
            allpass_positions_r: [0; 4],
        }
    }

    fn comb(
        input: f32,
        room_size: f32,
        damping: f32,
        buffer: &mut [f32],
        pos: &mut usize,
        state: &mut f32,
    ) -> f32 {
        let output = buffer[*pos];
        let dampened = *state * (1.0 - damping) + output * damping;
        *state = dampened;
        buffer[*pos] = input + dampened * room_size;
        *pos = (*pos + 1) % buffer.len();
        output
    }

    fn allpass(input: f32, buffer: &mut [f32], pos: &mut usize) -> f32 {
        let delayed = buffer[*pos];
        buffer[*pos] = input + delayed * 0.5;
        *pos = (*pos + 1) % buffer.len();
        delayed - input * 0.5
    }

    fn process(&mut self, buf: &mut [f32], frames: usize, params: &ReverbParams) {
        let wet = params.wet_dry_mix.clamp(0.0, 1.0);
        for i in 0..frames {
            let l = buf[i * 2];
            let r = buf[i * 2 + 1];
            let mono = (l + r) * 0.5;

            let mut out_l = 0.0;
            let mut out_r = 0.0;
            for c in 0..8 {
                out_l += Self::comb(
                    mono,
                    params.room_size,
                    params.damping,
                    &mut self.comb_buffers_l[c],
                    &mut self.comb_positions_l[c],
                    &mut self.comb_state_l[c],
                );
                out_r += Self::comb(
                    mono,
                    params.room_size,
                    params.damping,
                    &mut self.comb_buffers_r[c],
                    &mut self.comb_positions_r[c],
                    &mut self.comb_state_r[c],
                );
            }
            for a in 0..4 {
                out_l = Self::allpass(
                    out_l,
                    &mut self.allpass_buffers_l[a],
                    &mut self.allpass_positions_l[a],
                );
                out_r = Self::allpass(
                    out_r,
                    &mut self.allpass_buffers_r[a],
                    &mut self.allpass_positions_r[a],
                );
            }

            buf[i * 2] = l * (1.0 - wet) + out_l * wet * 0.015;
            buf[i * 2 + 1] = r * (1.0 - wet) + out_r * wet * 0.015;
        }
    }
}

pub struct LimiterUnit {
    envelope_left: f32,
    envelope_right: f32,
    release_coeff: f32,
    threshold: Smoothed,
    cached: LimiterParams,
    sample_rate: f32,
}

impl LimiterUnit {
    fn new(params: &LimiterParams, sample_rate: f32) -> Self {
        let mut unit = Self {
            envelope_left: 0.0,
            envelope_right: 0.0,
            release_coeff: 0.0,
            threshold: Smoothed::new(10_f32.powf(params.threshold_db / 20.0), sample_rate),
            cached: *params,
            sample_rate,
        };
        unit.update_coefficients();
        unit
    }

    fn update_coefficients(&mut self) {
        self.release_coeff = (-1.0 / (self.cached.release_ms * 0.001 * self.sample_rate)).exp();
    }

    fn process(&mut self, buf: &mut [f32], frames: usize, params: &LimiterParams) {
        if *params != self.cached {
            self.cached = *params;
            self.update_coefficients();
        }
        let threshold_target = 10_f32.powf(self.cached.threshold_db / 20.0);
        for i in 0..frames {
            let threshold = self.threshold.next(threshold_target);
            let l = buf[i * 2];
            let r = buf[i * 2 + 1];

            let l_abs = l.abs();
            let r_abs = r.abs();
            // Latch on >= so a sustained peak holds the envelope instead of
            // letting it decay and re-latch between samples.
            if l_abs >= self.envelope_left {
                self.envelope_left = l_abs;
            } else {
                self.envelope_left *= self.release_coeff;
            }
            if r_abs >= self.envelope_right {
                self.envelope_right = r_abs;
            } else {
                self.envelope_right *= self.release_coeff;
            }

            let gain_l = if self.envelope_left > threshold {
                threshold / self.envelope_left
            } else {
                1.0
            };
            let gain_r = if self.envelope_right > threshold {
                threshold / self.envelope_right
            } else {
                1.0
            };
            // Linked channels: the stereo image must not shift.
            let gain = gain_l.min(gain_r);

            buf[i * 2] = l * gain;
            buf[i * 2 + 1] = r * gain;
        }
    }
}

pub struct ChorusUnit {
    buffer_left: Vec<f32>,
    buffer_right: Vec<f32>,
    write_pos: usize,
    lfo_phase: f32,
    sample_rate: f32,
}

impl ChorusUnit {
    fn new(sample_rate: f32) -> Self {
        // Max 50 ms modulated delay.
        let max_samples = (sample_rate * 0.05) as usize;
        Self {
            buffer_left: vec![0.0; max_samples],
            buffer_right: vec![0.0; max_samples],
            write_pos: 0,
            lfo_phase: 0.0,
            sample_rate,
        }
    }

    fn process(&mut self, buf: &mut [f32], frames: usize, params: &ChorusParams) {
        let size = self.buffer_left.len();
        let wet = params.wet_dry_mix.clamp(0.0, 1.0);
        for i in 0..frames {
            let l = buf[i * 2];
            let r = buf[i * 2 + 1];

            let lfo = (self.lfo_phase * 2.0 * PI).sin();
            self.lfo_phase += params.rate_hz / self.sample_rate;
            if self.lfo_phase >= 1.0 {
                self.lfo_phase -= 1.0;
            }

            // 15 ms center, swinging up to 10 ms with depth.
            let delay_ms = 15.0 + lfo * 10.0 * params.depth;
            let delay_samples = ((delay_ms * 0.001 * self.sample_rate) as usize).min(size - 1);
            let read_pos = (self.write_pos + size - delay_samples) % size;
            let delayed_l = self.buffer_left[read_pos];
            let delayed_r = self.buffer_right[read_pos];

            self.buffer_left[self.write_pos] = l;
            self.buffer_right[self.write_pos] = r;
            self.write_pos = (self.write_pos + 1) % size;

            buf[i * 2] = l * (1.0 - wet) + delayed_l * wet;
            buf[i * 2 + 1] = r * (1.0 - wet) + delayed_r * wet;
        }
    }
}

/// Closed sum over every processor a chain slot can hold. State lives on the
/// audio side; parameters arrive read-only from the graph snapshot each
/// buffer, and each unit re-derives coefficients when they change.
pub enum EffectUnit {
    Eq(EqUnit),
    Compressor(CompressorUnit),
    Reverb(ReverbUnit),
    Delay(DelayUnit),
    Limiter(LimiterUnit),
    Chorus(ChorusUnit),
    Plugin(Box<dyn PluginUnit>),
}

impl EffectUnit {
    /// Build the processor matching a parameter variant. Plugins carry a
    /// caller-provided unit and are installed through their own path.
    pub fn for_params(params: &EffectParams, sample_rate: f32) -> Option<Self> {
        match params {
            EffectParams::Eq(p) => Some(EffectUnit::Eq(EqUnit::new(p, sample_rate))),
            EffectParams::Compressor(p) => {
                Some(EffectUnit::Compressor(CompressorUnit::new(p, sample_rate)))
            }
            EffectParams::Reverb(_) => Some(EffectUnit::Reverb(ReverbUnit::new(sample_rate))),
            EffectParams::Delay(_) => Some(EffectUnit::Delay(DelayUnit::new(sample_rate))),
            EffectParams::Limiter(p) => Some(EffectUnit::Limiter(LimiterUnit::new(p, sample_rate))),
            EffectParams::Chorus(_) => Some(EffectUnit::Chorus(ChorusUnit::new(sample_rate))),
            EffectParams::Plugin { .. } => None,
        }
    }

    /// Process one interleaved stereo buffer in place.
    ///
    /// Bypass is a transparent pass-through. For the feedback units (delay,
    /// reverb) it freezes processing without clearing state, so re-enabling
    /// resumes coherently instead of restarting from silence.
    pub fn process(
        &mut self,
        buf: &mut [f32],
        frames: usize,
        params: &EffectParams,
        bypass: bool,
        sample_rate: f32,
        midi: &[MidiEvent],
    ) {
        if bypass {
            return;
        }
        match (self, params) {
            (EffectUnit::Eq(unit), EffectParams::Eq(p)) => unit.process(buf, frames, p),
            (EffectUnit::Compressor(unit), EffectParams::Compressor(p)) => {
                unit.process(buf, frames, p)
            }
            (EffectUnit::Reverb(unit), EffectParams::Reverb(p)) => unit.process(buf, frames, p),
            (EffectUnit::Delay(unit), EffectParams::Delay(p)) => unit.process(buf, frames, p),
            (EffectUnit::Limiter(unit), EffectParams::Limiter(p)) => unit.process(buf, frames, p),
            (EffectUnit::Chorus(unit), EffectParams::Chorus(p)) => unit.process(buf, frames, p),
            (EffectUnit::Plugin(unit), EffectParams::Plugin { .. }) => {
                unit.process(buf, frames, sample_rate, midi)
            }
            // Parameter variant and installed unit disagree; leave the
            // buffer untouched rather than feed a unit foreign params.
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    fn full_scale_buffer(frames: usize, value: f32) -> Vec<f32> {
        vec![value; frames * 2]
    }

    #[test]
    fn test_flat_eq_is_near_transparent() {
        let params = EqParams::default();
        let mut unit = EqUnit::new(&params, SR);
        let mut buf: Vec<f32> = (0..512)
            .flat_map(|i| {
                let s = (i as f32 * 0.05).sin() * 0.5;
                [s, s]
            })
            .collect();
        let original = buf.clone();
        unit.process(&mut buf, 512, &params);
        for (a, b) in buf.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_limiter_clamps_peaks() {
        let params = LimiterParams::default();
        let mut unit = LimiterUnit::new(&params, SR);
        let mut buf = full_scale_buffer(1024, 1.5);
        unit.process(&mut buf, 1024, &params);
        let ceiling = 10_f32.powf(params.threshold_db / 20.0);
        // The envelope latches onto the peak immediately and a sustained
        // peak holds it there.
        for s in &buf {
            assert!(s.abs() <= ceiling + 1e-4);
        }
        assert!((buf[2046].abs() - ceiling).abs() < 1e-3);
    }

    #[test]
    fn test_limiter_threshold_change_ramps() {
        let mut params = LimiterParams::default();
        let mut unit = LimiterUnit::new(&params, SR);
        let mut buf = full_scale_buffer(1024, 1.0);
        unit.process(&mut buf, 1024, &params);

        params.threshold_db = -12.0;
        let new_ceiling = 10_f32.powf(-12.0 / 20.0);
        let mut step = full_scale_buffer(512, 1.0);
        unit.process(&mut step, 512, &params);
        // The ceiling glides down instead of stepping.
        assert!(step[0].abs() > new_ceiling * 1.5);

        let mut settled = full_scale_buffer(4096, 1.0);
        unit.process(&mut settled, 4096, &params);
        assert!((settled[8190].abs() - new_ceiling).abs() < 1e-2);
    }

    #[test]
    fn test_makeup_gain_change_ramps() {
        let mut params = CompressorParams::default();
        let mut unit = CompressorUnit::new(&params, SR);
        // Well under the threshold, so only makeup shapes the level.
        let mut buf = full_scale_buffer(512, 0.05);
        unit.process(&mut buf, 512, &params);

        params.makeup_gain_db = 12.0;
        let mut step = full_scale_buffer(256, 0.05);
        unit.process(&mut step, 256, &params);
        assert!(step[0].abs() < 0.06);

        let mut settled = full_scale_buffer(8192, 0.05);
        unit.process(&mut settled, 8192, &params);
        let target = 0.05 * 10_f32.powf(12.0 / 20.0);
        assert!((settled[16382].abs() - target).abs() < 5e-3);
    }

    #[test]
    fn test_eq_gain_change_ramps() {
        let mut params = EqParams::default();
        let mut unit = EqUnit::new(&params, SR);
        let mut buf = full_scale_buffer(2048, 0.3);
        unit.process(&mut buf, 2048, &params);

        // A +12 dB shelf boost reaches the output along a ramp.
        params.low_gain_db = 12.0;
        let mut step = full_scale_buffer(128, 0.3);
        unit.process(&mut step, 128, &params);
        let step_peak = step.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(step_peak < 0.8);

        let mut settled = full_scale_buffer(24000, 0.3);
        unit.process(&mut settled, 24000, &params);
        assert!(settled[47998].abs() > 1.1);
    }

    #[test]
    fn test_compressor_reduces_hot_signal() {
        let params = CompressorParams::default();
        let mut unit = CompressorUnit::new(&params, SR);
        let mut buf = full_scale_buffer(4096, 0.9);
        unit.process(&mut buf, 4096, &params);
        // After the attack settles the level sits well under the input.
        assert!(buf[4096].abs() < 0.9);
    }

    #[test]
    fn test_delay_echoes_after_delay_time() {
        let params = DelayParams {
            delay_time_ms: 10.0,
            feedback: 0.0,
            wet_dry_mix: 1.0,
        };
        let mut unit = DelayUnit::new(SR);
        let delay_frames = (0.010 * SR) as usize;
        let frames = delay_frames + 16;
        let mut buf = vec![0.0f32; frames * 2];
        buf[0] = 1.0;
        buf[1] = 1.0;
        unit.process(&mut buf, frames, &params);
        // Fully wet: impulse reappears exactly delay_time later.
        assert!(buf[delay_frames * 2].abs() > 0.9);
        assert!(buf[0].abs() < 1e-6);
    }

    #[test]
    fn test_bypass_freezes_delay_state() {
        let params = EffectParams::Delay(DelayParams::default());
        let mut unit = EffectUnit::for_params(&params, SR).unwrap();
        let mut buf = full_scale_buffer(256, 0.5);
        let original = buf.clone();
        unit.process(&mut buf, 256, &params, true, SR, &[]);
        assert_eq!(buf, original);
    }

    #[test]
    fn test_reverb_produces_tail() {
        let params = ReverbParams {
            room_size: 0.8,
            damping: 0.2,
            wet_dry_mix: 1.0,
        };
        let mut unit = ReverbUnit::new(SR);
        let mut buf = vec![0.0f32; 4096 * 2];
        buf[0] = 1.0;
        buf[1] = 1.0;
        unit.process(&mut buf, 4096, &params);
        // Energy appears after the shortest comb line.
        assert!(buf[2400..].iter().any(|s| s.abs() > 0.0));
    }

    #[test]
    fn test_chorus_mixes_delayed_copy() {
        let params = ChorusParams::default();
        let mut unit = ChorusUnit::new(SR);
        let mut buf: Vec<f32> = (0..2048)
            .flat_map(|i| {
                let s = (i as f32 * 0.1).sin() * 0.5;
                [s, s]
            })
            .collect();
        let original = buf.clone();
        unit.process(&mut buf, 2048, &params);
        assert!(buf.iter().zip(&original).any(|(a, b)| (a - b).abs() > 1e-4));
    }
}
