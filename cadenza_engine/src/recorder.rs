use std::collections::HashMap;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use ringbuf::traits::Consumer;
use ringbuf::HeapCons;

use cadenza_shared::{NoteSpec, TrackId};

use crate::midi::MidiMessage;

/// Recording phase, advanced once per audio buffer on the audio thread and
/// polled by the control thread. Observed transitions lag the audio thread
/// by at most one poll interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle = 0,
    CountingIn = 1,
    Recording = 2,
}

impl RecordingState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => RecordingState::CountingIn,
            2 => RecordingState::Recording,
            _ => RecordingState::Idle,
        }
    }
}

/// Click burst length.
const CLICK_SECONDS: f32 = 0.08;
const CLICK_AMP: f32 = 0.6;
const DOWNBEAT_HZ: f32 = 1200.0;
const BEAT_HZ: f32 = 800.0;

/// Recorder state shared across threads: the control side writes settings
/// and reads progress; the audio side advances the state machine.
#[derive(Clone)]
pub struct RecorderShared {
    state: Arc<AtomicU8>,
    /// BPM as f64 bits.
    tempo: Arc<AtomicU64>,
    count_in_bars: Arc<AtomicU32>,
    time_signature: Arc<AtomicU32>,
    metronome_enabled: Arc<AtomicBool>,
    /// 1-indexed count-in beat, 0 outside count-in.
    count_in_beat: Arc<AtomicU32>,
    /// Fraction within the current beat, fixed point x10000.
    count_in_progress: Arc<AtomicU32>,
    /// Pre-count-in playhead; the finished take is placed here.
    recording_start: Arc<AtomicU64>,
}

impl RecorderShared {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(RecordingState::Idle as u8)),
            tempo: Arc::new(AtomicU64::new(120.0f64.to_bits())),
            count_in_bars: Arc::new(AtomicU32::new(1)),
            time_signature: Arc::new(AtomicU32::new(4)),
            metronome_enabled: Arc::new(AtomicBool::new(true)),
            count_in_beat: Arc::new(AtomicU32::new(0)),
            count_in_progress: Arc::new(AtomicU32::new(0)),
            recording_start: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> RecordingState {
        RecordingState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_tempo(&self, bpm: f64) {
        self.tempo
            .store(bpm.clamp(20.0, 300.0).to_bits(), Ordering::SeqCst);
    }

    pub fn tempo(&self) -> f64 {
        f64::from_bits(self.tempo.load(Ordering::SeqCst))
    }

    pub fn set_count_in_bars(&self, bars: u32) {
        self.count_in_bars.store(bars, Ordering::SeqCst);
    }

    pub fn count_in_bars(&self) -> u32 {
        self.count_in_bars.load(Ordering::SeqCst)
    }

    pub fn set_time_signature(&self, beats_per_bar: u32) {
        self.time_signature.store(beats_per_bar.max(1), Ordering::SeqCst);
    }

    pub fn time_signature(&self) -> u32 {
        self.time_signature.load(Ordering::SeqCst)
    }

    pub fn set_metronome_enabled(&self, enabled: bool) {
        self.metronome_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn metronome_enabled(&self) -> bool {
        self.metronome_enabled.load(Ordering::SeqCst)
    }

    pub fn set_recording_start(&self, samples: u64) {
        self.recording_start.store(samples, Ordering::SeqCst);
    }

    pub fn recording_start(&self) -> u64 {
        self.recording_start.load(Ordering::SeqCst)
    }

    /// (1-indexed beat, 0.0-1.0 within the beat); (0, 0.0) outside count-in.
    pub fn count_in_progress(&self) -> (u32, f32) {
        (
            self.count_in_beat.load(Ordering::Relaxed),
            self.count_in_progress.load(Ordering::Relaxed) as f32 / 10000.0,
        )
    }

    pub fn samples_per_beat(&self, sample_rate: f32) -> u64 {
        ((60.0 / self.tempo()) * sample_rate as f64) as u64
    }
}

impl Default for RecorderShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Audio-side recording state machine and metronome synthesis.
pub struct RecorderEngine {
    pub shared: RecorderShared,
    count_in_counter: u64,
    sample_rate: f32,
}

impl RecorderEngine {
    pub fn new(shared: RecorderShared, sample_rate: f32) -> Self {
        Self {
            shared,
            count_in_counter: 0,
            sample_rate,
        }
    }

    /// Start the state machine; with zero count-in bars, or when punching in
    /// during playback, recording begins on this very buffer.
    pub fn begin(&mut self, skip_count_in: bool) {
        self.count_in_counter = 0;
        let state = if self.shared.count_in_bars() > 0 && !skip_count_in {
            RecordingState::CountingIn
        } else {
            RecordingState::Recording
        };
        self.shared.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn finish(&mut self) {
        self.shared
            .state
            .store(RecordingState::Idle as u8, Ordering::SeqCst);
        self.shared.count_in_beat.store(0, Ordering::Relaxed);
        self.shared.count_in_progress.store(0, Ordering::Relaxed);
    }

    pub fn state(&self) -> RecordingState {
        self.shared.state()
    }

    fn click_sample(&self, position_in_beat: u64, beat_in_bar: u64) -> f32 {
        let click_len = (CLICK_SECONDS * self.sample_rate) as u64;
        if position_in_beat >= click_len {
            return 0.0;
        }
        let t = position_in_beat as f32 / self.sample_rate;
        let freq = if beat_in_bar == 0 { DOWNBEAT_HZ } else { BEAT_HZ };
        let envelope = (1.0 - position_in_beat as f32 / click_len as f32).powi(2);
        (2.0 * PI * freq * t).sin() * CLICK_AMP * envelope
    }

    /// Advance the state machine by one buffer and add metronome clicks to
    /// the interleaved stereo output. During count-in clicks follow the
    /// internal counter; while playing they follow the timeline so loops
    /// and seeks stay on the grid. Returns true when the count-in elapsed
    /// inside this buffer and recording just began.
    pub fn advance_block(
        &mut self,
        out: &mut [f32],
        frames: usize,
        playing: bool,
        timeline_pos: u64,
    ) -> bool {
        let state = self.state();
        let spb = self.shared.samples_per_beat(self.sample_rate).max(1);
        let beats_per_bar = self.shared.time_signature() as u64;
        let samples_per_bar = spb * beats_per_bar;
        let metronome_on = self.shared.metronome_enabled();
        let mut started_recording = false;

        match state {
            RecordingState::CountingIn => {
                let count_in_samples = samples_per_bar * self.shared.count_in_bars() as u64;
                for frame in 0..frames {
                    let idx = self.count_in_counter + frame as u64;
                    if idx >= count_in_samples {
                        if !started_recording {
                            started_recording = true;
                            self.shared
                                .state
                                .store(RecordingState::Recording as u8, Ordering::SeqCst);
                            self.shared.count_in_beat.store(0, Ordering::Relaxed);
                            self.shared.count_in_progress.store(0, Ordering::Relaxed);
                        }
                        continue;
                    }
                    if metronome_on {
                        let position_in_bar = idx % samples_per_bar;
                        let click = self
                            .click_sample(position_in_bar % spb, position_in_bar / spb);
                        out[frame * 2] += click;
                        out[frame * 2 + 1] += click;
                    }
                }
                let end = (self.count_in_counter + frames as u64).min(count_in_samples);
                if end < count_in_samples {
                    let beat = ((end % samples_per_bar) / spb) as u32 + 1;
                    let fraction = (end % spb) as f64 / spb as f64;
                    self.shared.count_in_beat.store(beat, Ordering::Relaxed);
                    self.shared
                        .count_in_progress
                        .store((fraction * 10000.0) as u32, Ordering::Relaxed);
                }
                self.count_in_counter += frames as u64;
            }
            RecordingState::Recording | RecordingState::Idle => {
                let ticking = playing || state == RecordingState::Recording;
                if ticking && metronome_on {
                    for frame in 0..frames {
                        let idx = timeline_pos + frame as u64;
                        let position_in_bar = idx % samples_per_bar;
                        let click = self
                            .click_sample(position_in_bar % spb, position_in_bar / spb);
                        out[frame * 2] += click;
                        out[frame * 2 + 1] += click;
                    }
                }
            }
        }

        started_recording
    }
}

// ---------------------------------------------------------------------------
// Capture worker
// ---------------------------------------------------------------------------

pub enum CaptureCommand {
    Start,
    /// Drain everything still in flight and hand the buffers back.
    Stop {
        response_tx: Sender<Vec<(TrackId, Vec<f32>)>>,
    },
    AddTrack {
        track: TrackId,
        consumer: HeapCons<f32>,
    },
    RemoveTrack {
        track: TrackId,
    },
    Clear,
}

/// Worker thread draining the callback's capture rings into growing
/// buffers, keeping allocation off the audio thread.
pub struct CaptureWorker {
    command_rx: Receiver<CaptureCommand>,
    consumers: Vec<(TrackId, HeapCons<f32>, Vec<f32>)>,
    is_recording: bool,
}

impl CaptureWorker {
    pub fn new(command_rx: Receiver<CaptureCommand>) -> Self {
        Self {
            command_rx,
            consumers: Vec::with_capacity(32),
            is_recording: false,
        }
    }

    pub fn run(&mut self) {
        loop {
            loop {
                match self.command_rx.try_recv() {
                    Ok(cmd) => {
                        if !self.handle_cmd(cmd) {
                            return;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return,
                }
            }

            if self.is_recording {
                self.drain_inputs();
            } else {
                self.discard_inputs();
            }

            thread::sleep(Duration::from_millis(5));
        }
    }

    fn handle_cmd(&mut self, cmd: CaptureCommand) -> bool {
        match cmd {
            CaptureCommand::Start => {
                self.is_recording = true;
                eprintln!("[Capture] Started");
            }
            CaptureCommand::Stop { response_tx } => {
                self.is_recording = false;
                self.drain_inputs();
                let mut takes = Vec::new();
                for (track, _, buf) in self.consumers.iter_mut() {
                    if !buf.is_empty() {
                        takes.push((*track, std::mem::take(buf)));
                    }
                }
                eprintln!("[Capture] Stopped, {} takes", takes.len());
                // The control thread going away ends the worker.
                return response_tx.send(takes).is_ok();
            }
            CaptureCommand::AddTrack { track, consumer } => {
                self.consumers.retain(|(t, _, _)| *t != track);
                self.consumers.push((track, consumer, Vec::new()));
            }
            CaptureCommand::RemoveTrack { track } => {
                self.consumers.retain(|(t, _, _)| *t != track);
            }
            CaptureCommand::Clear => {
                for (_, _, buf) in self.consumers.iter_mut() {
                    buf.clear();
                }
            }
        }
        true
    }

    fn drain_inputs(&mut self) {
        for (_, consumer, buf) in self.consumers.iter_mut() {
            while let Some(sample) = consumer.try_pop() {
                buf.push(sample);
            }
        }
    }

    fn discard_inputs(&mut self) {
        for (_, consumer, _) in self.consumers.iter_mut() {
            while consumer.try_pop().is_some() {}
        }
    }
}

// ---------------------------------------------------------------------------
// MIDI capture
// ---------------------------------------------------------------------------

/// Control-side MIDI take builder. Events arriving during count-in are only
/// tracked as held notes; a note pressed before the boundary and still held
/// when recording starts is flushed in at timestamp zero.
pub struct MidiCapture {
    /// (message, absolute timestamp in samples)
    events: Vec<(MidiMessage, u64)>,
    held_notes: HashMap<u8, u8>,
    held_flushed: bool,
    active: bool,
}

impl MidiCapture {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            held_notes: HashMap::new(),
            held_flushed: false,
            active: false,
        }
    }

    pub fn start(&mut self) {
        self.events.clear();
        self.held_notes.clear();
        self.held_flushed = false;
        self.active = true;
    }

    /// `boundary` is the absolute sample where recording (not count-in)
    /// begins; events before it only update the held-note set.
    pub fn record(&mut self, message: MidiMessage, timestamp: u64, boundary: u64, counting_in: bool) {
        if !self.active {
            return;
        }
        if counting_in {
            match message {
                MidiMessage::NoteOn { note, velocity } => {
                    self.held_notes.insert(note, velocity);
                }
                MidiMessage::NoteOff { note, .. } => {
                    self.held_notes.remove(&note);
                }
            }
            return;
        }

        if !self.held_flushed {
            self.held_flushed = true;
            let held: Vec<(u8, u8)> = self.held_notes.drain().collect();
            for (note, velocity) in held {
                self.events.push((MidiMessage::NoteOn { note, velocity }, boundary));
            }
        }

        let rel = timestamp.max(boundary);
        self.events.push((message, rel));
    }

    /// Finalize into notes relative to the recording start, pairing ons and
    /// offs; notes still sounding at stop are closed at `stop_timestamp`.
    pub fn finish(
        &mut self,
        boundary: u64,
        stop_timestamp: u64,
        samples_per_beat: f64,
    ) -> Vec<NoteSpec> {
        self.active = false;
        let mut open: HashMap<u8, (u8, u64)> = HashMap::new();
        let mut notes = Vec::new();
        // Any note still held that never saw its first post-boundary event.
        if !self.held_flushed {
            for (note, velocity) in self.held_notes.drain() {
                self.events.push((MidiMessage::NoteOn { note, velocity }, boundary));
            }
        }

        for &(message, timestamp) in &self.events {
            match message {
                MidiMessage::NoteOn { note, velocity } => {
                    open.entry(note).or_insert((velocity, timestamp));
                }
                MidiMessage::NoteOff { note, .. } => {
                    if let Some((velocity, start)) = open.remove(&note) {
                        notes.push(Self::make_note(
                            note, velocity, start, timestamp, boundary, samples_per_beat,
                        ));
                    }
                }
            }
        }
        for (note, (velocity, start)) in open {
            notes.push(Self::make_note(
                note,
                velocity,
                start,
                stop_timestamp,
                boundary,
                samples_per_beat,
            ));
        }

        self.events.clear();
        notes.sort_by(|a, b| a.start_beats.total_cmp(&b.start_beats));
        notes
    }

    fn make_note(
        pitch: u8,
        velocity: u8,
        start: u64,
        end: u64,
        boundary: u64,
        samples_per_beat: f64,
    ) -> NoteSpec {
        let start_rel = start.saturating_sub(boundary);
        let end_rel = end.saturating_sub(boundary).max(start_rel + 1);
        NoteSpec {
            pitch,
            velocity,
            start_beats: start_rel as f64 / samples_per_beat,
            duration_beats: (end_rel - start_rel) as f64 / samples_per_beat,
        }
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

impl Default for MidiCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_in_then_recording() {
        let shared = RecorderShared::new();
        shared.set_count_in_bars(1);
        shared.set_tempo(120.0);
        let mut engine = RecorderEngine::new(shared.clone(), 48000.0);
        engine.begin(false);
        assert_eq!(engine.state(), RecordingState::CountingIn);

        // One bar at 120 BPM 4/4 = 2 s = 96000 samples.
        let mut out = vec![0.0f32; 1024 * 2];
        let mut started = false;
        for _ in 0..(96_000 / 1024 + 1) {
            out.fill(0.0);
            started |= engine.advance_block(&mut out, 1024, false, 0);
        }
        assert!(started);
        assert_eq!(engine.state(), RecordingState::Recording);
    }

    #[test]
    fn test_zero_count_in_records_immediately() {
        let shared = RecorderShared::new();
        shared.set_count_in_bars(0);
        let mut engine = RecorderEngine::new(shared, 48000.0);
        engine.begin(false);
        assert_eq!(engine.state(), RecordingState::Recording);
    }

    #[test]
    fn test_count_in_publishes_beat_and_fraction() {
        let shared = RecorderShared::new();
        shared.set_count_in_bars(1);
        shared.set_tempo(120.0);
        let mut engine = RecorderEngine::new(shared.clone(), 48000.0);
        engine.begin(false);
        let mut out = vec![0.0f32; 24_000 * 2];
        // Advance 1.5 beats into the count-in.
        engine.advance_block(&mut out, 24_000, false, 0);
        out.fill(0.0);
        engine.advance_block(&mut out[..24_000], 12_000, false, 0);
        let (beat, fraction) = shared.count_in_progress();
        assert_eq!(beat, 2);
        assert!((fraction - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_metronome_click_on_downbeat() {
        let shared = RecorderShared::new();
        shared.set_tempo(120.0);
        let mut engine = RecorderEngine::new(shared, 48000.0);
        let mut out = vec![0.0f32; 256 * 2];
        // Playing at the bar start: click energy present.
        engine.advance_block(&mut out, 256, true, 0);
        assert!(out.iter().any(|s| s.abs() > 0.01));

        // Metronome disabled: silence.
        engine.shared.set_metronome_enabled(false);
        out.fill(0.0);
        engine.advance_block(&mut out, 256, true, 0);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_tempo_clamped() {
        let shared = RecorderShared::new();
        shared.set_tempo(500.0);
        assert_eq!(shared.tempo(), 300.0);
        shared.set_tempo(5.0);
        assert_eq!(shared.tempo(), 20.0);
    }

    #[test]
    fn test_midi_capture_held_note_across_boundary() {
        let mut capture = MidiCapture::new();
        capture.start();
        // Pressed during count-in, released after recording began.
        capture.record(MidiMessage::NoteOn { note: 60, velocity: 90 }, 1000, 96_000, true);
        capture.record(
            MidiMessage::NoteOff { note: 60, velocity: 0 },
            120_000,
            96_000,
            false,
        );
        let notes = capture.finish(96_000, 200_000, 24_000.0);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].pitch, 60);
        assert_eq!(notes[0].velocity, 90);
        // Flushed in at the boundary.
        assert!(notes[0].start_beats.abs() < 1e-9);
        assert!((notes[0].duration_beats - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_midi_capture_released_during_count_in_is_dropped() {
        let mut capture = MidiCapture::new();
        capture.start();
        capture.record(MidiMessage::NoteOn { note: 62, velocity: 80 }, 500, 96_000, true);
        capture.record(MidiMessage::NoteOff { note: 62, velocity: 0 }, 900, 96_000, true);
        let notes = capture.finish(96_000, 200_000, 24_000.0);
        assert!(notes.is_empty());
    }

    #[test]
    fn test_midi_capture_open_note_closed_at_stop() {
        let mut capture = MidiCapture::new();
        capture.start();
        capture.record(
            MidiMessage::NoteOn { note: 64, velocity: 100 },
            100_000,
            96_000,
            false,
        );
        let notes = capture.finish(96_000, 148_000, 24_000.0);
        assert_eq!(notes.len(), 1);
        assert!((notes[0].duration_beats - 2.0).abs() < 0.01);
    }
}
