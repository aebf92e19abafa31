use std::f32::consts::PI;

use cadenza_shared::{EnvelopeParams, OscillatorKind, SynthParams};

use crate::midi::{MidiEvent, MidiMessage};

/// Notes that may sound simultaneously outside the release phase.
pub const VOICE_BUDGET: usize = 16;
/// Physical slots. The headroom lets a stolen voice finish its fast release
/// while a full budget of new notes attacks.
const VOICE_SLOTS: usize = 32;
/// Release time forced onto a stolen voice, in seconds.
const STEAL_RELEASE: f32 = 0.005;

pub fn midi_to_freq(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}

fn generate_waveform(osc: OscillatorKind, phase: f32) -> f32 {
    match osc {
        OscillatorKind::Sine => (phase * 2.0 * PI).sin(),
        OscillatorKind::Saw => 2.0 * phase - 1.0,
        OscillatorKind::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        OscillatorKind::Triangle => 4.0 * (phase - 0.5).abs() - 1.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnvelopeState {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Debug, Clone, Copy)]
struct Voice {
    note: u8,
    velocity: f32,
    phase: f32,
    frequency: f32,
    // Oscillator is latched at note-on for the voice's lifetime.
    osc: OscillatorKind,
    env_state: EnvelopeState,
    env_level: f32,
    env_time: f32,
    release_from: f32,
    release_override: Option<f32>,
    /// Monotonic allocation order, used to find the oldest voice to steal.
    seq: u64,
    is_active: bool,
}

impl Voice {
    fn new() -> Self {
        Self {
            note: 0,
            velocity: 0.0,
            phase: 0.0,
            frequency: 440.0,
            osc: OscillatorKind::Saw,
            env_state: EnvelopeState::Idle,
            env_level: 0.0,
            env_time: 0.0,
            release_from: 0.0,
            release_override: None,
            seq: 0,
            is_active: false,
        }
    }

    fn note_on(&mut self, note: u8, velocity: u8, osc: OscillatorKind, seq: u64) {
        self.note = note;
        self.velocity = velocity as f32 / 127.0;
        self.phase = 0.0;
        self.frequency = midi_to_freq(note);
        self.osc = osc;
        self.env_state = EnvelopeState::Attack;
        self.env_level = 0.0;
        self.env_time = 0.0;
        self.release_from = 0.0;
        self.release_override = None;
        self.seq = seq;
        self.is_active = true;
    }

    fn enter_release(&mut self, override_time: Option<f32>) {
        if self.is_active && self.env_state != EnvelopeState::Release {
            self.release_from = self.env_level;
            self.release_override = override_time;
            self.env_state = EnvelopeState::Release;
            self.env_time = 0.0;
        }
    }

    fn process(&mut self, env: &EnvelopeParams, sample_rate: f32) -> f32 {
        if !self.is_active {
            return 0.0;
        }

        let osc_out = generate_waveform(self.osc, self.phase);
        self.phase += self.frequency / sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        let env_out = self.process_envelope(env, sample_rate);
        if self.env_state == EnvelopeState::Idle {
            self.is_active = false;
            return 0.0;
        }

        osc_out * env_out * self.velocity
    }

    fn process_envelope(&mut self, params: &EnvelopeParams, sample_rate: f32) -> f32 {
        let time_step = 1.0 / sample_rate;

        match self.env_state {
            EnvelopeState::Idle => {
                self.env_level = 0.0;
            }
            EnvelopeState::Attack => {
                if params.attack > 0.0 {
                    self.env_level = self.env_time / params.attack;
                    if self.env_level >= 1.0 {
                        self.env_level = 1.0;
                        self.env_state = EnvelopeState::Decay;
                        self.env_time = 0.0;
                    }
                } else {
                    self.env_level = 1.0;
                    self.env_state = EnvelopeState::Decay;
                    self.env_time = 0.0;
                }
            }
            EnvelopeState::Decay => {
                if params.decay > 0.0 {
                    let progress = self.env_time / params.decay;
                    self.env_level = 1.0 - (1.0 - params.sustain) * progress;
                    if self.env_level <= params.sustain {
                        self.env_level = params.sustain;
                        self.env_state = EnvelopeState::Sustain;
                    }
                } else {
                    self.env_level = params.sustain;
                    self.env_state = EnvelopeState::Sustain;
                }
            }
            EnvelopeState::Sustain => {
                self.env_level = params.sustain;
            }
            EnvelopeState::Release => {
                let release = self.release_override.unwrap_or(params.release);
                if release > 0.0 {
                    let progress = self.env_time / release;
                    // Fade from the level at release start, not from the
                    // sustain setting, so stealing mid-attack stays smooth.
                    self.env_level = self.release_from * (1.0 - progress);
                    if self.env_level <= 0.001 {
                        self.env_level = 0.0;
                        self.env_state = EnvelopeState::Idle;
                    }
                } else {
                    self.env_level = 0.0;
                    self.env_state = EnvelopeState::Idle;
                }
            }
        }

        self.env_time += time_step;
        self.env_level.clamp(0.0, 1.0)
    }
}

/// Polyphonic synthesizer owned by one MIDI track's audio-side state.
pub struct Synth {
    voices: [Voice; VOICE_SLOTS],
    pub params: SynthParams,
    sample_rate: f32,
    next_seq: u64,
    // One-pole lowpass state over the summed voice output.
    filter_state: f32,
}

impl Synth {
    pub fn new(sample_rate: f32, params: SynthParams) -> Self {
        Self {
            voices: [Voice::new(); VOICE_SLOTS],
            params,
            sample_rate,
            next_seq: 0,
            filter_state: 0.0,
        }
    }

    /// Returns true when the allocation stole an older voice.
    pub fn note_on(&mut self, note: u8, velocity: u8) -> bool {
        let mut stolen = false;
        let non_releasing = self
            .voices
            .iter()
            .filter(|v| v.is_active && v.env_state != EnvelopeState::Release)
            .count();
        if non_releasing >= VOICE_BUDGET {
            // Steal the oldest sounding voice: fast release, not a hard cut.
            if let Some(oldest) = self
                .voices
                .iter_mut()
                .filter(|v| v.is_active && v.env_state != EnvelopeState::Release)
                .min_by_key(|v| v.seq)
            {
                oldest.enter_release(Some(STEAL_RELEASE));
                stolen = true;
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let osc = self.params.oscillator;

        if let Some(slot) = self.voices.iter_mut().find(|v| !v.is_active) {
            slot.note_on(note, velocity, osc, seq);
        } else if let Some(slot) = self
            .voices
            .iter_mut()
            .filter(|v| v.env_state == EnvelopeState::Release)
            .min_by_key(|v| v.seq)
        {
            // Every slot busy: reclaim the oldest releasing tail outright.
            slot.note_on(note, velocity, osc, seq);
        }
        stolen
    }

    pub fn note_off(&mut self, note: u8) {
        for voice in &mut self.voices {
            if voice.is_active && voice.note == note {
                voice.enter_release(None);
            }
        }
    }

    /// Hard reset for seek and stop.
    pub fn all_notes_off(&mut self) {
        for voice in &mut self.voices {
            voice.is_active = false;
            voice.env_state = EnvelopeState::Idle;
            voice.env_level = 0.0;
        }
        self.filter_state = 0.0;
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active).count()
    }

    pub fn attacking_voice_count(&self) -> usize {
        self.voices
            .iter()
            .filter(|v| v.is_active && v.env_state != EnvelopeState::Release)
            .count()
    }

    pub fn releasing_voice_count(&self) -> usize {
        self.voices
            .iter()
            .filter(|v| v.is_active && v.env_state == EnvelopeState::Release)
            .count()
    }

    pub fn voices_for_pitch(&self, pitch: u8) -> usize {
        self.voices
            .iter()
            .filter(|v| v.is_active && v.note == pitch)
            .count()
    }

    fn process_sample(&mut self) -> f32 {
        let mut output = 0.0;
        let env = self.params.envelope;
        for voice in &mut self.voices {
            output += voice.process(&env, self.sample_rate);
        }

        // One-pole lowpass; cutoff 1.0 leaves the signal untouched.
        let coeff = self.params.filter_cutoff.clamp(0.01, 1.0);
        self.filter_state = coeff * output + (1.0 - coeff) * self.filter_state;

        // Headroom for many voices.
        self.filter_state * 0.3
    }

    /// Render additively into an interleaved stereo buffer, applying events
    /// at their sample offsets. `events` must be sorted by offset, with
    /// note-offs before note-ons at equal offsets.
    pub fn render(&mut self, buf: &mut [f32], frames: usize, events: &[MidiEvent]) -> u32 {
        let mut steals = 0u32;
        let mut ev_idx = 0;
        for frame in 0..frames {
            while ev_idx < events.len() && events[ev_idx].offset as usize <= frame {
                match events[ev_idx].message {
                    MidiMessage::NoteOn { note, velocity } => {
                        if self.note_on(note, velocity) {
                            steals += 1;
                        }
                    }
                    MidiMessage::NoteOff { note, .. } => self.note_off(note),
                }
                ev_idx += 1;
            }
            let s = self.process_sample();
            buf[frame * 2] += s;
            buf[frame * 2 + 1] += s;
        }
        // Events at the buffer boundary (offset == frames) land on the next
        // buffer's first sample; apply them now so they are not lost.
        while ev_idx < events.len() {
            match events[ev_idx].message {
                MidiMessage::NoteOn { note, velocity } => {
                    if self.note_on(note, velocity) {
                        steals += 1;
                    }
                }
                MidiMessage::NoteOff { note, .. } => self.note_off(note),
            }
            ev_idx += 1;
        }
        steals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_synth() -> Synth {
        Synth::new(48000.0, SynthParams::default())
    }

    #[test]
    fn test_midi_to_freq() {
        assert!((midi_to_freq(69) - 440.0).abs() < 0.01);
        assert!((midi_to_freq(60) - 261.63).abs() < 0.1);
    }

    #[test]
    fn test_waveforms() {
        assert!((generate_waveform(OscillatorKind::Sine, 0.0)).abs() < 0.01);
        assert!((generate_waveform(OscillatorKind::Sine, 0.25) - 1.0).abs() < 0.01);
        assert!((generate_waveform(OscillatorKind::Saw, 0.0) + 1.0).abs() < 0.01);
        assert!((generate_waveform(OscillatorKind::Square, 0.25) - 1.0).abs() < 0.01);
        assert!((generate_waveform(OscillatorKind::Square, 0.75) + 1.0).abs() < 0.01);
        assert!((generate_waveform(OscillatorKind::Triangle, 0.5) + 1.0).abs() < 0.01);
    }

    #[test]
    fn test_note_on_off() {
        let mut synth = test_synth();
        assert_eq!(synth.active_voice_count(), 0);
        synth.note_on(60, 100);
        assert_eq!(synth.active_voice_count(), 1);
        synth.note_off(60);
        // Still audible through the release tail.
        assert_eq!(synth.releasing_voice_count(), 1);
    }

    #[test]
    fn test_voice_stealing_seventeen_notes() {
        let mut synth = test_synth();
        let mut stolen_any = false;
        for i in 0..17 {
            stolen_any |= synth.note_on(40 + i, 100);
        }
        assert!(stolen_any);
        // Exactly a full budget attacking, the oldest pushed into release.
        assert_eq!(synth.attacking_voice_count(), VOICE_BUDGET);
        assert_eq!(synth.releasing_voice_count(), 1);
        // The stolen voice was the first note played.
        assert_eq!(synth.voices_for_pitch(40), 1);
    }

    #[test]
    fn test_release_completes_to_idle() {
        let mut synth = test_synth();
        synth.note_on(60, 100);
        synth.note_off(60);
        // 400 ms of processing comfortably covers the 300 ms release.
        for _ in 0..(48000 * 4 / 10) {
            synth.process_sample();
        }
        assert_eq!(synth.active_voice_count(), 0);
    }

    #[test]
    fn test_oscillator_latched_at_note_on() {
        let mut synth = test_synth();
        synth.note_on(60, 100);
        synth.params.oscillator = OscillatorKind::Sine;
        synth.note_on(64, 100);
        assert_eq!(synth.voices[0].osc, OscillatorKind::Saw);
        assert_eq!(synth.voices[1].osc, OscillatorKind::Sine);
    }

    #[test]
    fn test_render_applies_events_at_offsets() {
        let mut synth = test_synth();
        let mut buf = vec![0.0f32; 256 * 2];
        let events = [MidiEvent::note_on(60, 100, 100)];
        synth.render(&mut buf, 256, &events);
        assert_eq!(synth.active_voice_count(), 1);
        // Nothing before the trigger offset.
        assert!(buf[..200].iter().all(|s| *s == 0.0));
        // Audio after it.
        assert!(buf[220..].iter().any(|s| s.abs() > 0.0));
    }
}
