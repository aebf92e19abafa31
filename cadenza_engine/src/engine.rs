use std::sync::Arc;
use std::thread;
use std::time::Duration;

use arc_swap::ArcSwap;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, unbounded, Sender};
use ringbuf::traits::Split;
use ringbuf::HeapRb;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use cadenza_shared::{
    ClipId, EffectId, EffectKind, EffectParams, EngineError, NoteSpec, ProjectData, SynthParams,
    TrackId, TrackKind, TrackParam,
};

use crate::commands::{DropPayload, EngineCommand};
use crate::diagnostics::{diagnostic_channel, Diagnostic, DiagnosticDrain};
use crate::effects::EffectUnit;
use crate::midi::MidiMessage;
use crate::plugin::PluginUnit;
use crate::recorder::{CaptureCommand, CaptureWorker, MidiCapture, RecorderEngine, RecorderShared, RecordingState};
use crate::render::RenderState;
use crate::session::Session;
use crate::sources::AudioSource;
use crate::synth::Synth;
use crate::transport::{Transport, TransportState};

const MAX_BUFFER_FRAMES: usize = 2048;
/// Per-track capture ring: two seconds of interleaved stereo, far more than
/// the worker's drain interval needs.
const CAPTURE_RING_SECONDS: usize = 2;

/// What a finished take produced. Empty when recording was cancelled during
/// count-in or nothing was armed.
#[derive(Debug, Default)]
pub struct RecordingOutcome {
    pub audio_clips: Vec<(TrackId, ClipId)>,
    pub midi_clip: Option<(TrackId, ClipId)>,
}

enum Backend {
    /// The callback state is driven manually through `advance`.
    Headless(RenderState),
    Stream(cpal::Stream),
}

/// The engine facade. All methods run on the control thread; audio-thread
/// state is reached only through the snapshot swap, atomics, and the
/// command channel.
pub struct AudioEngine {
    session: Session,
    snapshot: Arc<ArcSwap<crate::graph::GraphSnapshot>>,
    transport: Transport,
    recorder: RecorderShared,
    command_tx: Sender<EngineCommand>,
    capture_tx: Sender<CaptureCommand>,
    diagnostics: DiagnosticDrain,
    midi_capture: MidiCapture,
    recording_midi_target: Option<TrackId>,
    recording_audio_targets: Vec<TrackId>,
    sample_rate: u32,
    backend: Backend,
}

struct Bootstrap {
    session: Session,
    snapshot: Arc<ArcSwap<crate::graph::GraphSnapshot>>,
    transport: Transport,
    recorder: RecorderShared,
    command_tx: Sender<EngineCommand>,
    capture_tx: Sender<CaptureCommand>,
    diagnostics: DiagnosticDrain,
    render: RenderState,
}

fn bootstrap(sample_rate: u32) -> Bootstrap {
    let session = Session::new(sample_rate);
    let snapshot = Arc::new(ArcSwap::from_pointee(session.build_snapshot()));
    let transport = Transport::new();
    let recorder = RecorderShared::new();

    let (command_tx, command_rx) = unbounded::<EngineCommand>();
    let (capture_tx, capture_rx) = unbounded::<CaptureCommand>();
    let (drop_tx, drop_rx) = unbounded::<DropPayload>();
    let (diag_sink, diag_drain) = diagnostic_channel();

    // Freed audio-thread state is dropped here, off the deadline.
    thread::spawn(move || {
        while let Ok(payload) = drop_rx.recv() {
            drop(payload);
        }
    });

    thread::spawn(move || {
        CaptureWorker::new(capture_rx).run();
    });

    let render = RenderState::new(
        snapshot.clone(),
        transport.clone(),
        RecorderEngine::new(recorder.clone(), sample_rate as f32),
        command_rx,
        drop_tx,
        diag_sink,
        sample_rate as f32,
        MAX_BUFFER_FRAMES,
    );

    // The master limiter exists from the first buffer.
    if let Some(unit) = EffectUnit::for_params(
        &EffectParams::for_kind(EffectKind::Limiter),
        sample_rate as f32,
    ) {
        let _ = command_tx.send(EngineCommand::InstallEffect {
            effect: session.master_limiter_id(),
            unit: Box::new(unit),
        });
    }

    Bootstrap {
        session,
        snapshot,
        transport,
        recorder,
        command_tx,
        capture_tx,
        diagnostics: diag_drain,
        render,
    }
}

impl AudioEngine {
    /// Open the default output device and start streaming.
    pub fn new() -> Result<Self, anyhow::Error> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(anyhow::anyhow!("No output device available"))?;
        let config = device.default_output_config()?;
        let sample_rate = config.sample_rate();
        let channels = config.channels() as usize;
        let sample_format = config.sample_format();

        let mut stream_config: cpal::StreamConfig = config.into();
        stream_config.buffer_size = cpal::BufferSize::Fixed(MAX_BUFFER_FRAMES as u32);
        eprintln!("[AudioEngine] Using config: {:?}", stream_config);

        let parts = bootstrap(sample_rate);
        let mut render = parts.render;
        let mut stereo_scratch: Vec<f32> = Vec::new();

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if channels == 2 {
                        render.process(data);
                        return;
                    }
                    // Render stereo, then spread over the device layout.
                    let frames = data.len() / channels;
                    stereo_scratch.resize(frames * 2, 0.0);
                    render.process(&mut stereo_scratch);
                    for frame in 0..frames {
                        for ch in 0..channels {
                            data[frame * channels + ch] = if ch < 2 {
                                stereo_scratch[frame * 2 + ch]
                            } else {
                                0.0
                            };
                        }
                    }
                },
                move |err| {
                    eprintln!("[AudioEngine] Stream error: {}", err);
                },
                None,
            )?,
            other => return Err(anyhow::anyhow!("Unsupported sample format {:?}", other)),
        };
        stream.play()?;

        Ok(Self {
            session: parts.session,
            snapshot: parts.snapshot,
            transport: parts.transport,
            recorder: parts.recorder,
            command_tx: parts.command_tx,
            capture_tx: parts.capture_tx,
            diagnostics: parts.diagnostics,
            midi_capture: MidiCapture::new(),
            recording_midi_target: None,
            recording_audio_targets: Vec::new(),
            sample_rate,
            backend: Backend::Stream(stream),
        })
    }

    /// Engine without a device; buffers are pulled with `advance`. Used by
    /// tests and offline rendering.
    pub fn headless(sample_rate: u32) -> Self {
        let parts = bootstrap(sample_rate);
        Self {
            session: parts.session,
            snapshot: parts.snapshot,
            transport: parts.transport,
            recorder: parts.recorder,
            command_tx: parts.command_tx,
            capture_tx: parts.capture_tx,
            diagnostics: parts.diagnostics,
            midi_capture: MidiCapture::new(),
            recording_midi_target: None,
            recording_audio_targets: Vec::new(),
            sample_rate,
            backend: Backend::Headless(parts.render),
        }
    }

    /// Render the next `frames` as interleaved stereo. Headless mode only.
    pub fn advance(&mut self, frames: usize) -> Result<Vec<f32>, EngineError> {
        match &mut self.backend {
            Backend::Headless(render) => {
                let mut buf = vec![0.0f32; frames * 2];
                render.process(&mut buf);
                Ok(buf)
            }
            Backend::Stream(_) => Err(EngineError::NotHeadless),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Sounding synth voices on a track. Headless mode only.
    pub fn active_voice_count(&self, track: TrackId) -> Result<usize, EngineError> {
        match &self.backend {
            Backend::Headless(render) => Ok(render.active_voice_count(track)),
            Backend::Stream(_) => Err(EngineError::NotHeadless),
        }
    }

    fn publish(&self) {
        self.snapshot.store(Arc::new(self.session.build_snapshot()));
    }

    fn send(&self, cmd: EngineCommand) -> Result<(), EngineError> {
        self.command_tx
            .send(cmd)
            .map_err(|_| EngineError::EngineUnresponsive)
    }

    // -- transport ----------------------------------------------------------

    pub fn play(&self) {
        self.transport.play();
    }

    pub fn pause(&self) {
        self.transport.pause();
    }

    /// Stop keeps the playhead and is idempotent; a rewind gesture is a
    /// `seek(0)` from the layer above.
    pub fn stop(&self) {
        self.transport.stop();
    }

    pub fn seek(&self, position_samples: u64) {
        self.transport.seek(position_samples);
    }

    pub fn position(&self) -> u64 {
        self.transport.position()
    }

    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn set_loop_region(&self, start_samples: u64, end_samples: u64) -> Result<(), EngineError> {
        if start_samples >= end_samples {
            return Err(EngineError::InvalidLoopRegion);
        }
        self.transport.set_loop_region(start_samples, end_samples);
        Ok(())
    }

    pub fn set_loop_enabled(&self, enabled: bool) {
        self.transport.set_loop_enabled(enabled);
    }

    // -- tempo and metronome -------------------------------------------------

    pub fn set_tempo(&self, bpm: f64) {
        self.recorder.set_tempo(bpm);
    }

    pub fn tempo(&self) -> f64 {
        self.recorder.tempo()
    }

    pub fn set_time_signature(&self, beats_per_bar: u32) {
        self.recorder.set_time_signature(beats_per_bar);
    }

    pub fn set_count_in_bars(&self, bars: u32) {
        self.recorder.set_count_in_bars(bars);
    }

    pub fn set_metronome_enabled(&self, enabled: bool) {
        self.recorder.set_metronome_enabled(enabled);
    }

    /// (1-indexed beat, fraction within the beat) while counting in.
    pub fn count_in_progress(&self) -> (u32, f32) {
        self.recorder.count_in_progress()
    }

    pub fn recording_state(&self) -> RecordingState {
        self.recorder.state()
    }

    // -- graph ----------------------------------------------------------------

    pub fn add_track(&mut self, kind: TrackKind, name: &str) -> Result<TrackId, EngineError> {
        let id = self.session.add_track(kind, name)?;
        if kind == TrackKind::Midi {
            self.send(EngineCommand::InstallSynth {
                track: id,
                synth: Box::new(Synth::new(self.sample_rate as f32, SynthParams::default())),
            })?;
        }
        self.publish();
        Ok(id)
    }

    pub fn remove_track(&mut self, track: TrackId) -> Result<(), EngineError> {
        self.session.remove_track(track)?;
        self.send(EngineCommand::RemoveTrack { track })?;
        let _ = self.capture_tx.send(CaptureCommand::RemoveTrack { track });
        self.publish();
        Ok(())
    }

    pub fn set_track_param(&mut self, track: TrackId, param: TrackParam) -> Result<(), EngineError> {
        self.session.set_track_param(track, param)?;
        self.publish();
        Ok(())
    }

    pub fn set_synth_params(&mut self, track: TrackId, params: SynthParams) -> Result<(), EngineError> {
        self.session.set_synth_params(track, params)?;
        self.publish();
        Ok(())
    }

    pub fn master_track(&self) -> TrackId {
        self.session.master_id()
    }

    // -- effects --------------------------------------------------------------

    pub fn add_effect(&mut self, track: TrackId, kind: EffectKind) -> Result<EffectId, EngineError> {
        let id = self.session.add_effect(track, kind)?;
        let params = EffectParams::for_kind(kind);
        if let Some(unit) = EffectUnit::for_params(&params, self.sample_rate as f32) {
            self.send(EngineCommand::InstallEffect {
                effect: id,
                unit: Box::new(unit),
            })?;
        }
        self.publish();
        Ok(id)
    }

    /// Host an opaque plugin at the end of a track's chain. Its current
    /// state blob is captured for serialization.
    pub fn add_plugin(
        &mut self,
        track: TrackId,
        unit: Box<dyn PluginUnit>,
    ) -> Result<EffectId, EngineError> {
        let state = BASE64.encode(unit.state());
        let id = self
            .session
            .add_effect_params(track, EffectParams::Plugin { state })?;
        self.send(EngineCommand::InstallEffect {
            effect: id,
            unit: Box::new(EffectUnit::Plugin(unit)),
        })?;
        self.publish();
        Ok(id)
    }

    /// Re-attach a plugin processor after a project load, restoring the
    /// serialized state blob into it.
    pub fn install_plugin_unit(
        &mut self,
        effect: EffectId,
        mut unit: Box<dyn PluginUnit>,
    ) -> Result<(), EngineError> {
        if let EffectParams::Plugin { state } = self.session.effect_params(effect)? {
            if let Ok(blob) = BASE64.decode(state) {
                unit.set_state(&blob);
            }
        } else {
            return Err(EngineError::UnknownEffect(effect));
        }
        self.send(EngineCommand::InstallEffect {
            effect,
            unit: Box::new(EffectUnit::Plugin(unit)),
        })?;
        Ok(())
    }

    pub fn reorder_effects(&mut self, track: TrackId, order: &[EffectId]) -> Result<(), EngineError> {
        self.session.reorder_effects(track, order)?;
        self.publish();
        Ok(())
    }

    pub fn remove_effect(&mut self, effect: EffectId) -> Result<(), EngineError> {
        self.session.remove_effect(effect)?;
        self.send(EngineCommand::RemoveEffect { effect })?;
        self.publish();
        Ok(())
    }

    pub fn set_effect_params(&mut self, effect: EffectId, params: EffectParams) -> Result<(), EngineError> {
        self.session.set_effect_params(effect, params)?;
        self.publish();
        Ok(())
    }

    pub fn set_effect_bypass(&mut self, effect: EffectId, bypass: bool) -> Result<(), EngineError> {
        self.session.set_effect_bypass(effect, bypass)?;
        self.publish();
        Ok(())
    }

    // -- clips ----------------------------------------------------------------

    pub fn add_audio_clip(
        &mut self,
        track: TrackId,
        source_path: &str,
        start_samples: u64,
    ) -> Result<ClipId, EngineError> {
        let id = self.session.add_audio_clip(track, source_path, start_samples)?;
        self.publish();
        Ok(id)
    }

    pub fn add_midi_clip(
        &mut self,
        track: TrackId,
        start_samples: u64,
        duration_beats: f64,
        loop_length_beats: f64,
        notes: Vec<NoteSpec>,
    ) -> Result<ClipId, EngineError> {
        let id = self.session.add_midi_clip(
            track,
            start_samples,
            duration_beats,
            loop_length_beats,
            notes,
        )?;
        self.publish();
        Ok(id)
    }

    pub fn remove_clip(&mut self, clip: ClipId) -> Result<(), EngineError> {
        self.session.remove_clip(clip)?;
        self.publish();
        Ok(())
    }

    pub fn move_clip(&mut self, clip: ClipId, start_samples: u64) -> Result<(), EngineError> {
        self.session.move_clip(clip, start_samples)?;
        self.publish();
        Ok(())
    }

    pub fn set_clip_loop_length(&mut self, clip: ClipId, beats: f64) -> Result<(), EngineError> {
        self.session.set_clip_loop_length(clip, beats)?;
        self.publish();
        Ok(())
    }

    pub fn quantize_clip(&mut self, clip: ClipId, grid_beats: f64) -> Result<(), EngineError> {
        self.session.quantize_clip(clip, grid_beats)?;
        self.publish();
        Ok(())
    }

    pub fn get_clip_duration(&self, clip: ClipId) -> Result<u64, EngineError> {
        let spb = self.recorder.samples_per_beat(self.sample_rate as f32) as f64;
        self.session.clip_duration_samples(clip, spb)
    }

    pub fn get_waveform_peaks(&self, clip: ClipId, buckets: usize) -> Result<Vec<(f32, f32)>, EngineError> {
        self.session.waveform_peaks(clip, buckets)
    }

    // -- live MIDI ------------------------------------------------------------

    pub fn send_note_on(&mut self, note: u8, velocity: u8) -> Result<(), EngineError> {
        self.send(EngineCommand::NoteOn { note, velocity })?;
        self.capture_midi(MidiMessage::NoteOn { note, velocity });
        Ok(())
    }

    pub fn send_note_off(&mut self, note: u8, velocity: u8) -> Result<(), EngineError> {
        self.send(EngineCommand::NoteOff { note, velocity })?;
        self.capture_midi(MidiMessage::NoteOff { note, velocity });
        Ok(())
    }

    pub fn all_notes_off(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::AllNotesOff)
    }

    fn capture_midi(&mut self, message: MidiMessage) {
        let state = self.recorder.state();
        if state == RecordingState::Idle || self.recording_midi_target.is_none() {
            return;
        }
        self.midi_capture.record(
            message,
            self.transport.position(),
            self.recorder.recording_start(),
            state == RecordingState::CountingIn,
        );
    }

    // -- recording ------------------------------------------------------------

    pub fn start_recording(&mut self) -> Result<(), EngineError> {
        if self.recorder.state() != RecordingState::Idle {
            return Err(EngineError::RecorderBusy);
        }

        self.recording_audio_targets = self.session.armed_audio_tracks();
        self.recording_midi_target = self.session.armed_midi_track();
        self.recorder.set_recording_start(self.transport.position());

        for &track in &self.recording_audio_targets {
            let ring = HeapRb::<f32>::new(self.sample_rate as usize * 2 * CAPTURE_RING_SECONDS);
            let (producer, consumer) = ring.split();
            self.send(EngineCommand::ArmCapture { track, producer })?;
            self.capture_tx
                .send(CaptureCommand::AddTrack { track, consumer })
                .map_err(|_| EngineError::EngineUnresponsive)?;
        }
        self.capture_tx
            .send(CaptureCommand::Start)
            .map_err(|_| EngineError::EngineUnresponsive)?;

        self.midi_capture.start();
        self.send(EngineCommand::StartRecording)?;
        eprintln!(
            "[AudioEngine] Recording armed: {} audio, midi {:?}",
            self.recording_audio_targets.len(),
            self.recording_midi_target
        );
        Ok(())
    }

    /// Stop the take and materialize clips at the recording start position.
    pub fn stop_recording(&mut self) -> Result<RecordingOutcome, EngineError> {
        let state = self.recorder.state();
        if state == RecordingState::Idle {
            return Ok(RecordingOutcome::default());
        }
        let cancelled = state == RecordingState::CountingIn;

        // Phase one: the audio thread confirms it stopped pushing capture
        // samples before the worker is drained.
        let (ack_tx, ack_rx) = bounded::<()>(1);
        self.send(EngineCommand::StopRecording { response_tx: ack_tx })?;
        if let Backend::Headless(render) = &mut self.backend {
            let mut empty: [f32; 0] = [];
            render.process(&mut empty);
        }
        ack_rx
            .recv_timeout(Duration::from_secs(1))
            .map_err(|_| EngineError::EngineUnresponsive)?;

        // Phase two: collect the buffered takes.
        let (takes_tx, takes_rx) = bounded(1);
        self.capture_tx
            .send(CaptureCommand::Stop { response_tx: takes_tx })
            .map_err(|_| EngineError::EngineUnresponsive)?;
        let takes = takes_rx
            .recv_timeout(Duration::from_secs(1))
            .map_err(|_| EngineError::EngineUnresponsive)?;

        let start = self.recorder.recording_start();
        let stop_position = self.transport.position();
        let mut outcome = RecordingOutcome::default();

        if !cancelled {
            for (track, samples) in takes {
                let frames = (samples.len() / 2) as u64;
                if frames == 0 {
                    continue;
                }
                let path = format!("[take] track {} @ {}", track, start);
                self.session.sources.insert(AudioSource::from_data(
                    path.clone(),
                    samples,
                    self.sample_rate,
                ));
                let clip = self
                    .session
                    .add_recorded_clip(track, &path, start, frames)?;
                outcome.audio_clips.push((track, clip));
            }

            let spb = self.recorder.samples_per_beat(self.sample_rate as f32) as f64;
            let notes = self.midi_capture.finish(start, stop_position, spb);
            if let Some(track) = self.recording_midi_target {
                if !notes.is_empty() {
                    let end_beats = notes
                        .iter()
                        .map(|n| n.start_beats + n.duration_beats)
                        .fold(0.0f64, f64::max);
                    // Round the clip up to whole bars so it loops cleanly.
                    let beats_per_bar = self.recorder.time_signature() as f64;
                    let bars = (end_beats / beats_per_bar).ceil().max(1.0);
                    let duration = bars * beats_per_bar;
                    let clip = self
                        .session
                        .add_midi_clip(track, start, duration, duration, notes)?;
                    outcome.midi_clip = Some((track, clip));
                }
            }
        } else {
            let spb = self.recorder.samples_per_beat(self.sample_rate as f32) as f64;
            let _ = self.midi_capture.finish(start, stop_position, spb);
        }

        for &track in &self.recording_audio_targets {
            let _ = self.command_tx.send(EngineCommand::DisarmCapture { track });
            let _ = self.capture_tx.send(CaptureCommand::RemoveTrack { track });
        }
        self.recording_audio_targets.clear();
        self.recording_midi_target = None;
        self.publish();

        eprintln!(
            "[AudioEngine] Take finished: {} audio clips, midi {}",
            outcome.audio_clips.len(),
            outcome.midi_clip.is_some()
        );
        Ok(outcome)
    }

    // -- diagnostics -----------------------------------------------------------

    /// Drain events pushed by the audio thread since the last call.
    pub fn diagnostics(&mut self) -> Vec<Diagnostic> {
        let events = self.diagnostics.drain();
        for event in &events {
            eprintln!("[AudioEngine] {:?}", event);
        }
        events
    }

    // -- project ---------------------------------------------------------------

    pub fn export_project(&self) -> Result<String, EngineError> {
        self.session
            .to_project(
                self.recorder.tempo(),
                self.recorder.time_signature(),
                self.recorder.count_in_bars(),
                self.recorder.metronome_enabled(),
            )
            .to_json()
            .map_err(|e| EngineError::Serialization(e.to_string()))
    }

    /// Replace the whole session with a serialized project. Plugin slots are
    /// restored as data; their processors are re-attached by the host through
    /// `install_plugin_unit`.
    pub fn load_project(&mut self, json: &str) -> Result<(), anyhow::Error> {
        let project = ProjectData::from_json(json)?;
        self.recorder.set_tempo(project.tempo_bpm);
        self.recorder.set_time_signature(project.time_signature);
        self.recorder.set_count_in_bars(project.count_in_bars);
        self.recorder.set_metronome_enabled(project.metronome_enabled);
        self.session.load_project(&project);

        // Rebuild audio-thread processors for everything but plugins.
        let mut track_ids = self.session.track_ids();
        track_ids.push(self.session.master_id());
        for id in track_ids {
            let track = self.session.track(id)?;
            if track.kind == TrackKind::Midi {
                let params = track.synth.unwrap_or_default();
                self.send(EngineCommand::InstallSynth {
                    track: id,
                    synth: Box::new(Synth::new(self.sample_rate as f32, params)),
                })?;
            }
            for slot in track.fx_chain.clone() {
                if let Some(unit) = EffectUnit::for_params(&slot.params, self.sample_rate as f32) {
                    self.send(EngineCommand::InstallEffect {
                        effect: slot.id,
                        unit: Box::new(unit),
                    })?;
                }
            }
        }

        self.publish();
        eprintln!("[AudioEngine] Loaded project '{}'", self.session.name);
        Ok(())
    }
}
