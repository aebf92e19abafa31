use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender};
use ringbuf::traits::Producer;
use ringbuf::HeapProd;

use cadenza_shared::{EffectId, TrackId, TrackKind};

use crate::commands::{DropPayload, EngineCommand};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::effects::EffectUnit;
use crate::graph::{GraphSnapshot, TrackSnapshot};
use crate::midi::{MidiEvent, ScheduledNote};
use crate::mixer::AudioBuffers;
use crate::recorder::{RecorderEngine, RecordingState};
use crate::synth::Synth;
use crate::transport::Transport;

/// A sounding clip note on one track. `remaining` counts samples from the
/// start of the next buffer to the pending note-off.
#[derive(Debug, Clone, Copy)]
struct ActiveNote {
    pitch: u8,
    remaining: u64,
}

/// Everything the audio callback owns. Built on the control thread, then
/// moved into the stream closure (or kept in place for headless rendering).
/// `process` never allocates on the steady path and never blocks.
pub struct RenderState {
    snapshot: Arc<ArcSwap<GraphSnapshot>>,
    transport: Transport,
    recorder: RecorderEngine,
    command_rx: Receiver<EngineCommand>,
    drop_tx: Sender<DropPayload>,
    diagnostics: DiagnosticSink,
    synths: HashMap<TrackId, Box<Synth>>,
    effects: HashMap<EffectId, Box<EffectUnit>>,
    captures: HashMap<TrackId, HeapProd<f32>>,
    active_notes: HashMap<TrackId, Vec<ActiveNote>>,
    last_gain: HashMap<TrackId, f32>,
    last_master_gain: f32,
    buffers: AudioBuffers,
    metronome_buf: Vec<f32>,
    live_events: Vec<MidiEvent>,
    sample_rate: f32,
}

impl RenderState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        snapshot: Arc<ArcSwap<GraphSnapshot>>,
        transport: Transport,
        recorder: RecorderEngine,
        command_rx: Receiver<EngineCommand>,
        drop_tx: Sender<DropPayload>,
        diagnostics: DiagnosticSink,
        sample_rate: f32,
        max_buffer_size: usize,
    ) -> Self {
        Self {
            snapshot,
            transport,
            recorder,
            command_rx,
            drop_tx,
            diagnostics,
            synths: HashMap::new(),
            effects: HashMap::new(),
            captures: HashMap::new(),
            active_notes: HashMap::new(),
            last_gain: HashMap::new(),
            last_master_gain: 1.0,
            buffers: AudioBuffers::new(max_buffer_size),
            metronome_buf: vec![0.0; max_buffer_size * 2],
            live_events: Vec::with_capacity(64),
            sample_rate,
        }
    }

    /// Render one interleaved stereo buffer.
    pub fn process(&mut self, out: &mut [f32]) {
        let frames = out.len() / 2;
        self.drain_commands();

        let snapshot = self.snapshot.load_full();
        let pos = self.transport.position();
        let playing = self.transport.is_playing();

        // Recording state machine and metronome, mixed in after the master
        // chain so the limiter never ducks the click.
        if self.metronome_buf.len() != frames * 2 {
            self.metronome_buf.resize(frames * 2, 0.0);
        }
        self.metronome_buf.fill(0.0);
        let started_recording =
            self.recorder
                .advance_block(&mut self.metronome_buf, frames, playing, pos);
        if started_recording && !playing {
            self.transport.play();
        }
        let playing = self.transport.is_playing();

        // Where (and whether) the loop seam falls inside this buffer.
        let wrap_at: Option<u64> = if playing {
            self.transport.loop_region().and_then(|(start, end)| {
                if end > start && pos < end && pos + frames as u64 > end {
                    Some(end - pos)
                } else {
                    None
                }
            })
        } else {
            None
        };

        self.buffers.prepare(frames);

        let live_target = Self::live_target(&snapshot);
        let capturing = self.recorder.state() == RecordingState::Recording;

        for track in &snapshot.tracks {
            self.buffers.clear_track();
            self.render_track(track, frames, pos, playing, wrap_at, live_target);

            // Effect chains and synth tails keep running while inaudible;
            // only the mix-in gain goes to zero, ramped so toggles are
            // click-free.
            let audible = !track.mute && (!snapshot.any_solo || track.solo);
            let target_gain = if audible { track.gain } else { 0.0 };
            let from_gain = *self.last_gain.get(&track.id).unwrap_or(&target_gain);
            AudioBuffers::mix_into_master(
                &self.buffers.track_buf,
                &mut self.buffers.master_mix,
                frames,
                from_gain,
                target_gain,
                track.pan,
            );
            self.last_gain.insert(track.id, target_gain);

            if capturing && track.armed && track.kind == TrackKind::Audio {
                if let Some(producer) = self.captures.get_mut(&track.id) {
                    let mut overrun = false;
                    for &sample in &self.buffers.track_buf[..frames * 2] {
                        if producer.try_push(sample).is_err() {
                            overrun = true;
                        }
                    }
                    if overrun {
                        self.diagnostics
                            .push(Diagnostic::CaptureOverrun { track: track.id });
                    }
                }
            }
        }

        // Master chain, limiter last, then master gain.
        let master = &snapshot.master;
        for slot in &master.chain {
            match self.effects.get_mut(&slot.id) {
                Some(unit) => unit.process(
                    &mut self.buffers.master_mix,
                    frames,
                    &slot.params,
                    slot.bypass,
                    self.sample_rate,
                    &[],
                ),
                None => self
                    .diagnostics
                    .push(Diagnostic::EffectMissing { effect: slot.id }),
            }
        }
        let master_from = self.last_master_gain;
        let step = if frames > 0 {
            (master.gain - master_from) / frames as f32
        } else {
            0.0
        };
        let mut gain = master_from;
        for frame in 0..frames {
            self.buffers.master_mix[frame * 2] *= gain;
            self.buffers.master_mix[frame * 2 + 1] *= gain;
            gain += step;
        }
        self.last_master_gain = master.gain;

        for i in 0..frames * 2 {
            out[i] = self.buffers.master_mix[i] + self.metronome_buf[i];
        }

        if playing {
            self.transport.advance(frames as u64);
        }
    }

    /// The track live MIDI input plays into: the first armed MIDI track,
    /// else the first MIDI track.
    fn live_target(snapshot: &GraphSnapshot) -> Option<TrackId> {
        snapshot
            .tracks
            .iter()
            .find(|t| t.kind == TrackKind::Midi && t.armed)
            .or_else(|| snapshot.tracks.iter().find(|t| t.kind == TrackKind::Midi))
            .map(|t| t.id)
    }

    fn render_track(
        &mut self,
        track: &TrackSnapshot,
        frames: usize,
        pos: u64,
        playing: bool,
        wrap_at: Option<u64>,
        live_target: Option<TrackId>,
    ) {
        match track.kind {
            TrackKind::Audio | TrackKind::Return | TrackKind::Group => {
                if playing {
                    self.render_audio_clips(track, frames, pos, wrap_at);
                }
            }
            TrackKind::Midi => {
                self.render_midi_track(track, frames, pos, playing, wrap_at, live_target);
            }
            TrackKind::Master => {}
        }

        let events_end = self.buffers.events.len();
        for slot in &track.chain {
            match self.effects.get_mut(&slot.id) {
                Some(unit) => unit.process(
                    &mut self.buffers.track_buf,
                    frames,
                    &slot.params,
                    slot.bypass,
                    self.sample_rate,
                    &self.buffers.events[..events_end],
                ),
                None => self
                    .diagnostics
                    .push(Diagnostic::EffectMissing { effect: slot.id }),
            }
        }
    }

    fn render_audio_clips(
        &mut self,
        track: &TrackSnapshot,
        frames: usize,
        pos: u64,
        wrap_at: Option<u64>,
    ) {
        let segments = Self::segments(pos, frames as u64, wrap_at, self.transport.loop_region());
        for &(seg_start, seg_offset, seg_len) in segments.iter().flatten() {
            for clip in &track.audio_clips {
                let clip_end = clip.start + clip.duration_frames;
                let from = seg_start.max(clip.start);
                let to = (seg_start + seg_len).min(clip_end);
                if from >= to {
                    continue;
                }
                let data = match &clip.data {
                    Some(data) => data,
                    None => {
                        self.diagnostics.push(Diagnostic::SourceNotReady {
                            track: track.id,
                            clip: clip.id,
                        });
                        continue;
                    }
                };
                let source_frames = (data.len() / 2) as u64;
                for abs in from..to {
                    let src = clip.source_offset + (abs - clip.start);
                    if src >= source_frames {
                        break;
                    }
                    let dst = (seg_offset + (abs - seg_start)) as usize * 2;
                    self.buffers.track_buf[dst] += data[src as usize * 2];
                    self.buffers.track_buf[dst + 1] += data[src as usize * 2 + 1];
                }
            }
        }
    }

    fn render_midi_track(
        &mut self,
        track: &TrackSnapshot,
        frames: usize,
        pos: u64,
        playing: bool,
        wrap_at: Option<u64>,
        live_target: Option<TrackId>,
    ) {
        let frames_u64 = frames as u64;
        let spb = self.recorder.shared.samples_per_beat(self.sample_rate) as f64;
        let active = self.active_notes.entry(track.id).or_default();

        if playing {
            match wrap_at {
                None => {
                    // Emit note-offs falling inside this buffer, age the rest.
                    let events = &mut self.buffers.events;
                    active.retain_mut(|note| {
                        if note.remaining <= frames_u64 {
                            events.push(MidiEvent::note_off(note.pitch, 64, note.remaining as u32));
                            false
                        } else {
                            note.remaining -= frames_u64;
                            true
                        }
                    });

                    self.buffers.notes.clear();
                    for clip in &track.midi_clips {
                        crate::midi::schedule_clip_window(
                            &clip.notes,
                            clip.start,
                            clip.duration_beats,
                            clip.loop_length_beats,
                            pos,
                            frames_u64,
                            0,
                            spb,
                            &mut self.buffers.notes,
                        );
                    }
                    Self::emit_scheduled(&self.buffers.notes, frames_u64, None, active, &mut self.buffers.events);
                }
                Some(w) => {
                    // Everything sounding dies on the seam; the next loop
                    // iteration retriggers its own notes.
                    for note in active.iter() {
                        let off = note.remaining.min(w);
                        self.buffers
                            .events
                            .push(MidiEvent::note_off(note.pitch, 64, off as u32));
                    }
                    active.clear();

                    self.buffers.notes.clear();
                    for clip in &track.midi_clips {
                        crate::midi::schedule_clip_window(
                            &clip.notes,
                            clip.start,
                            clip.duration_beats,
                            clip.loop_length_beats,
                            pos,
                            w,
                            0,
                            spb,
                            &mut self.buffers.notes,
                        );
                    }
                    Self::emit_scheduled(&self.buffers.notes, frames_u64, Some(w), active, &mut self.buffers.events);

                    // Post-seam part of the buffer, from the loop start.
                    let (loop_start, _) = self.transport.loop_region().unwrap_or((0, 0));
                    self.buffers.notes.clear();
                    for clip in &track.midi_clips {
                        crate::midi::schedule_clip_window(
                            &clip.notes,
                            clip.start,
                            clip.duration_beats,
                            clip.loop_length_beats,
                            loop_start,
                            frames_u64 - w,
                            w as u32,
                            spb,
                            &mut self.buffers.notes,
                        );
                    }
                    Self::emit_scheduled(&self.buffers.notes, frames_u64, None, active, &mut self.buffers.events);
                }
            }
        } else if !active.is_empty() {
            // Stop and pause end sounding clip notes immediately.
            for note in active.iter() {
                self.buffers
                    .events
                    .push(MidiEvent::note_off(note.pitch, 64, 0));
            }
            active.clear();
        }

        if live_target == Some(track.id) {
            self.buffers.events.extend_from_slice(&self.live_events);
        }

        self.buffers.events.sort();

        if let Some(synth) = self.synths.get_mut(&track.id) {
            if let Some(params) = track.synth {
                synth.params = params;
            }
            let steals = synth.render(&mut self.buffers.track_buf, frames, &self.buffers.events);
            if steals > 0 {
                self.diagnostics.push(Diagnostic::VoiceStolen {
                    track: track.id,
                    count: steals,
                });
            }
        }
    }

    /// Turn scheduled clip notes into note-on events, registering their
    /// note-offs. With a seam at `truncate_at`, pre-seam notes never outlive
    /// it; the seam flush already ended everything sounding there.
    fn emit_scheduled(
        notes: &[ScheduledNote],
        frames: u64,
        truncate_at: Option<u64>,
        active: &mut Vec<ActiveNote>,
        events: &mut Vec<MidiEvent>,
    ) {
        for note in notes {
            events.push(MidiEvent::note_on(note.pitch, note.velocity, note.offset));
            let end = note.offset as u64 + note.duration_samples;
            let end = match truncate_at {
                Some(w) => end.min(w),
                None => end,
            };
            if end <= frames {
                events.push(MidiEvent::note_off(note.pitch, 64, end as u32));
            } else {
                active.push(ActiveNote {
                    pitch: note.pitch,
                    remaining: end - frames,
                });
            }
        }
    }

    /// Up to two contiguous timeline segments covering one buffer:
    /// `(timeline_start, buffer_frame_offset, length)`.
    fn segments(
        pos: u64,
        frames: u64,
        wrap_at: Option<u64>,
        loop_region: Option<(u64, u64)>,
    ) -> [Option<(u64, u64, u64)>; 2] {
        match (wrap_at, loop_region) {
            (Some(w), Some((loop_start, _))) => [
                Some((pos, 0, w)),
                Some((loop_start, w, frames - w)),
            ],
            _ => [Some((pos, 0, frames)), None],
        }
    }

    /// Sounding voices on one track's synth. Only meaningful when the
    /// caller also drives `process` (headless mode).
    pub fn active_voice_count(&self, track: TrackId) -> usize {
        self.synths
            .get(&track)
            .map(|s| s.active_voice_count())
            .unwrap_or(0)
    }

    fn drain_commands(&mut self) {
        // Live input lives exactly one buffer.
        self.live_events.clear();

        while let Ok(cmd) = self.command_rx.try_recv() {
            match cmd {
                EngineCommand::NoteOn { note, velocity } => {
                    self.live_events.push(MidiEvent::note_on(note, velocity, 0));
                }
                EngineCommand::NoteOff { note, velocity } => {
                    self.live_events.push(MidiEvent::note_off(note, velocity, 0));
                }
                EngineCommand::AllNotesOff => {
                    for synth in self.synths.values_mut() {
                        synth.all_notes_off();
                    }
                    for notes in self.active_notes.values_mut() {
                        notes.clear();
                    }
                }
                EngineCommand::InstallSynth { track, synth } => {
                    if let Some(old) = self.synths.insert(track, synth) {
                        let _ = self.drop_tx.send(DropPayload::Synth(old));
                    }
                }
                EngineCommand::InstallEffect { effect, unit } => {
                    if let Some(old) = self.effects.insert(effect, unit) {
                        let _ = self.drop_tx.send(DropPayload::Effect(old));
                    }
                }
                EngineCommand::RemoveEffect { effect } => {
                    if let Some(old) = self.effects.remove(&effect) {
                        let _ = self.drop_tx.send(DropPayload::Effect(old));
                    }
                }
                EngineCommand::RemoveTrack { track } => {
                    if let Some(old) = self.synths.remove(&track) {
                        let _ = self.drop_tx.send(DropPayload::Synth(old));
                    }
                    if let Some(old) = self.captures.remove(&track) {
                        let _ = self.drop_tx.send(DropPayload::Capture(old));
                    }
                    self.active_notes.remove(&track);
                    self.last_gain.remove(&track);
                }
                EngineCommand::ArmCapture { track, producer } => {
                    if let Some(old) = self.captures.insert(track, producer) {
                        let _ = self.drop_tx.send(DropPayload::Capture(old));
                    }
                }
                EngineCommand::DisarmCapture { track } => {
                    if let Some(old) = self.captures.remove(&track) {
                        let _ = self.drop_tx.send(DropPayload::Capture(old));
                    }
                }
                EngineCommand::StartRecording => {
                    let playing = self.transport.is_playing();
                    self.recorder
                        .shared
                        .set_recording_start(self.transport.position());
                    self.recorder.begin(playing);
                    if self.recorder.state() == RecordingState::Recording && !playing {
                        self.transport.play();
                    }
                }
                EngineCommand::StopRecording { response_tx } => {
                    self.recorder.finish();
                    let _ = response_tx.send(());
                }
            }
        }
    }
}
