use std::sync::Arc;

use cadenza_shared::{ClipId, EffectId, EffectParams, NoteSpec, SynthParams, TrackId, TrackKind};

/// Values below this are treated as silence.
pub const SILENCE_FLOOR_DB: f32 = -70.0;

pub fn db_to_gain(db: f32) -> f32 {
    if db <= SILENCE_FLOOR_DB {
        0.0
    } else {
        10_f32.powf(db / 20.0)
    }
}

#[derive(Clone)]
pub struct EffectSlot {
    pub id: EffectId,
    pub params: EffectParams,
    pub bypass: bool,
}

#[derive(Clone)]
pub struct AudioClipSnapshot {
    pub id: ClipId,
    /// Timeline position in samples.
    pub start: u64,
    /// Trim offset into the source, in frames.
    pub source_offset: u64,
    pub duration_frames: u64,
    /// Interleaved stereo source data. `None` while the source is still
    /// loading; the renderer substitutes silence.
    pub data: Option<Arc<Vec<f32>>>,
}

#[derive(Clone)]
pub struct MidiClipSnapshot {
    pub id: ClipId,
    pub start: u64,
    pub duration_beats: f64,
    pub loop_length_beats: f64,
    pub notes: Arc<Vec<NoteSpec>>,
}

#[derive(Clone)]
pub struct TrackSnapshot {
    pub id: TrackId,
    pub kind: TrackKind,
    /// Linear gain derived from volume_db at snapshot build time.
    pub gain: f32,
    pub pan: f32,
    pub mute: bool,
    pub solo: bool,
    pub armed: bool,
    pub synth: Option<SynthParams>,
    pub audio_clips: Vec<AudioClipSnapshot>,
    pub midi_clips: Vec<MidiClipSnapshot>,
    pub chain: Vec<EffectSlot>,
}

/// Immutable graph view published by the control thread via `ArcSwap` and
/// loaded once at the top of every callback. A callback observes either the
/// old or the new graph, never a partially updated one.
#[derive(Clone)]
pub struct GraphSnapshot {
    /// Every non-master track, in mixer order.
    pub tracks: Vec<TrackSnapshot>,
    pub master: TrackSnapshot,
    /// When set, only soloed tracks render.
    pub any_solo: bool,
}

impl GraphSnapshot {
    pub fn empty(master_id: TrackId, master_chain: Vec<EffectSlot>) -> Self {
        Self {
            tracks: Vec::new(),
            master: TrackSnapshot {
                id: master_id,
                kind: TrackKind::Master,
                gain: 1.0,
                pan: 0.0,
                mute: false,
                solo: false,
                armed: false,
                synth: None,
                audio_clips: Vec::new(),
                midi_clips: Vec::new(),
                chain: master_chain,
            },
            any_solo: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_to_gain() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(-6.0) - 0.501).abs() < 1e-3);
        assert_eq!(db_to_gain(-70.0), 0.0);
        assert_eq!(db_to_gain(-90.0), 0.0);
    }
}
