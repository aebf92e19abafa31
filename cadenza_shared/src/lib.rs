pub mod params;
pub mod project;

use serde::{Deserialize, Serialize};

pub use params::{
    ChorusParams, CompressorParams, DelayParams, EffectKind, EffectParams, EqParams, LimiterParams,
    ReverbParams,
};
pub use project::{AudioClipData, ClipData, EffectData, MidiClipData, ProjectData, TrackData};

/// Stable track identifier, allocated by the control layer.
pub type TrackId = u64;
/// Stable clip identifier.
pub type ClipId = u64;
/// Stable effect-instance identifier.
pub type EffectId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Audio,
    Midi,
    Master,
    Return,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OscillatorKind {
    Sine,
    Saw,
    Square,
    Triangle,
}

impl Default for OscillatorKind {
    fn default() -> Self {
        OscillatorKind::Saw
    }
}

/// Four-stage ADSR settings, times in seconds, sustain as a 0-1 level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeParams {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.3,
        }
    }
}

/// Built-in synthesizer settings carried by MIDI tracks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynthParams {
    pub oscillator: OscillatorKind,
    /// One-pole lowpass amount, 0.0 (closed) to 1.0 (open).
    pub filter_cutoff: f32,
    pub envelope: EnvelopeParams,
}

impl Default for SynthParams {
    fn default() -> Self {
        Self {
            oscillator: OscillatorKind::Saw,
            filter_cutoff: 1.0,
            envelope: EnvelopeParams::default(),
        }
    }
}

/// One note inside a MIDI clip, in musical time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteSpec {
    pub pitch: u8,
    pub velocity: u8,
    pub start_beats: f64,
    pub duration_beats: f64,
}

/// Mutable per-track mixer parameters settable through the control interface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackParam {
    VolumeDb(f32),
    Pan(f32),
    Mute(bool),
    Solo(bool),
    Armed(bool),
}

/// Typed errors returned by control-interface mutations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown track id {0}")]
    UnknownTrack(TrackId),
    #[error("unknown clip id {0}")]
    UnknownClip(ClipId),
    #[error("unknown effect id {0}")]
    UnknownEffect(EffectId),
    #[error("audio source {0} could not be loaded")]
    SourceUnavailable(String),
    #[error("the master track cannot be removed")]
    MasterImmutable,
    #[error("the master limiter must stay at the end of the chain")]
    LimiterPinned,
    #[error("track kind does not support this operation")]
    KindMismatch,
    #[error("invalid loop region: start must lie before end")]
    InvalidLoopRegion,
    #[error("recorder is busy")]
    RecorderBusy,
    #[error("engine is not running in headless mode")]
    NotHeadless,
    #[error("project serialization failed: {0}")]
    Serialization(String),
    #[error("audio thread did not respond")]
    EngineUnresponsive,
}
