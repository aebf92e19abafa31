use serde::{Deserialize, Serialize};

use crate::params::EffectParams;
use crate::{ClipId, EffectId, NoteSpec, SynthParams, TrackId, TrackKind};

/// Serialized effect-chain slot: the parameter struct plus bypass flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectData {
    pub id: EffectId,
    pub params: EffectParams,
    #[serde(default)]
    pub bypass: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioClipData {
    pub id: ClipId,
    /// Timeline position in samples.
    pub start_samples: u64,
    /// Trim offset into the source, in frames.
    pub source_offset: u64,
    /// Played length in frames.
    pub duration_frames: u64,
    /// Reference to the decoded source; resolution is the caller's job.
    pub source_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiClipData {
    pub id: ClipId,
    pub start_samples: u64,
    pub duration_beats: f64,
    pub loop_length_beats: f64,
    pub notes: Vec<NoteSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClipData {
    Audio(AudioClipData),
    Midi(MidiClipData),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackData {
    pub id: TrackId,
    pub kind: TrackKind,
    pub name: String,
    pub volume_db: f32,
    pub pan: f32,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub armed: bool,
    #[serde(default)]
    pub synth: Option<SynthParams>,
    pub fx_chain: Vec<EffectData>,
    pub clips: Vec<ClipData>,
}

/// Complete serialized engine state. The engine reconstructs its graph from
/// this description and exports an equivalent one on demand; reading and
/// writing project files is the surrounding product's responsibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectData {
    pub name: String,
    pub tempo_bpm: f64,
    pub time_signature: u32,
    pub count_in_bars: u32,
    #[serde(default)]
    pub metronome_enabled: bool,
    pub tracks: Vec<TrackData>,
}

impl Default for ProjectData {
    fn default() -> Self {
        Self {
            name: "Untitled".to_string(),
            tempo_bpm: 120.0,
            time_signature: 4,
            count_in_bars: 1,
            metronome_enabled: true,
            tracks: Vec::new(),
        }
    }
}

impl ProjectData {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}
