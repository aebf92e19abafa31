use std::sync::Arc;

use cadenza_shared::{
    AudioClipData, ClipData, ClipId, EffectData, EffectId, EffectKind, EffectParams, EngineError,
    MidiClipData, NoteSpec, ProjectData, SynthParams, TrackData, TrackId, TrackKind, TrackParam,
};

use crate::graph::{
    db_to_gain, AudioClipSnapshot, EffectSlot, GraphSnapshot, MidiClipSnapshot, TrackSnapshot,
};
use crate::midi::quantize_notes;
use crate::sources::SourcePool;

/// Control-thread model of the project graph. Every mutation is validated
/// here, then published to the audio thread as a fresh `GraphSnapshot`.
/// The session never touches audio-thread state directly.
pub struct Session {
    pub name: String,
    next_id: u64,
    master: TrackData,
    tracks: Vec<TrackData>,
    pub sources: SourcePool,
    sample_rate: u32,
}

impl Session {
    pub fn new(sample_rate: u32) -> Self {
        let mut session = Self {
            name: "Untitled".to_string(),
            next_id: 1,
            master: TrackData {
                id: 0,
                kind: TrackKind::Master,
                name: "Master".to_string(),
                volume_db: 0.0,
                pan: 0.0,
                mute: false,
                solo: false,
                armed: false,
                synth: None,
                fx_chain: Vec::new(),
                clips: Vec::new(),
            },
            tracks: Vec::new(),
            sources: SourcePool::new(),
            sample_rate,
        };
        session.master.id = session.alloc_id();
        // The master bus always ends in a limiter.
        let limiter_id = session.alloc_id();
        session.master.fx_chain.push(EffectData {
            id: limiter_id,
            params: EffectParams::for_kind(EffectKind::Limiter),
            bypass: false,
        });
        session
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn master_id(&self) -> TrackId {
        self.master.id
    }

    pub fn master_limiter_id(&self) -> EffectId {
        // Pinned at creation and on load; the chain is never left empty.
        self.master.fx_chain.last().map(|e| e.id).unwrap_or(0)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn track_ids(&self) -> Vec<TrackId> {
        self.tracks.iter().map(|t| t.id).collect()
    }

    // -- tracks ------------------------------------------------------------

    pub fn add_track(&mut self, kind: TrackKind, name: &str) -> Result<TrackId, EngineError> {
        if kind == TrackKind::Master {
            return Err(EngineError::MasterImmutable);
        }
        let id = self.alloc_id();
        self.tracks.push(TrackData {
            id,
            kind,
            name: name.to_string(),
            volume_db: 0.0,
            pan: 0.0,
            mute: false,
            solo: false,
            armed: false,
            synth: if kind == TrackKind::Midi {
                Some(SynthParams::default())
            } else {
                None
            },
            fx_chain: Vec::new(),
            clips: Vec::new(),
        });
        Ok(id)
    }

    pub fn remove_track(&mut self, track: TrackId) -> Result<(), EngineError> {
        if track == self.master.id {
            return Err(EngineError::MasterImmutable);
        }
        let before = self.tracks.len();
        self.tracks.retain(|t| t.id != track);
        if self.tracks.len() == before {
            return Err(EngineError::UnknownTrack(track));
        }
        Ok(())
    }

    pub fn track(&self, track: TrackId) -> Result<&TrackData, EngineError> {
        if track == self.master.id {
            return Ok(&self.master);
        }
        self.tracks
            .iter()
            .find(|t| t.id == track)
            .ok_or(EngineError::UnknownTrack(track))
    }

    fn track_mut(&mut self, track: TrackId) -> Result<&mut TrackData, EngineError> {
        if track == self.master.id {
            return Ok(&mut self.master);
        }
        self.tracks
            .iter_mut()
            .find(|t| t.id == track)
            .ok_or(EngineError::UnknownTrack(track))
    }

    pub fn set_track_param(&mut self, track: TrackId, param: TrackParam) -> Result<(), EngineError> {
        let is_master = track == self.master.id;
        let entry = self.track_mut(track)?;
        match param {
            TrackParam::VolumeDb(db) => entry.volume_db = db,
            TrackParam::Pan(pan) => entry.pan = pan.clamp(-1.0, 1.0),
            TrackParam::Mute(v) if !is_master => entry.mute = v,
            TrackParam::Solo(v) if !is_master => entry.solo = v,
            TrackParam::Armed(v) if !is_master => entry.armed = v,
            _ => return Err(EngineError::MasterImmutable),
        }
        Ok(())
    }

    pub fn set_synth_params(
        &mut self,
        track: TrackId,
        params: SynthParams,
    ) -> Result<(), EngineError> {
        let entry = self.track_mut(track)?;
        if entry.kind != TrackKind::Midi {
            return Err(EngineError::KindMismatch);
        }
        entry.synth = Some(params);
        Ok(())
    }

    /// Tracks whose capture rings should be armed when recording starts.
    pub fn armed_audio_tracks(&self) -> Vec<TrackId> {
        self.tracks
            .iter()
            .filter(|t| t.armed && t.kind == TrackKind::Audio)
            .map(|t| t.id)
            .collect()
    }

    pub fn armed_midi_track(&self) -> Option<TrackId> {
        self.tracks
            .iter()
            .find(|t| t.armed && t.kind == TrackKind::Midi)
            .map(|t| t.id)
    }

    // -- effects -----------------------------------------------------------

    pub fn add_effect(&mut self, track: TrackId, kind: EffectKind) -> Result<EffectId, EngineError> {
        self.add_effect_params(track, EffectParams::for_kind(kind))
    }

    pub fn add_effect_params(
        &mut self,
        track: TrackId,
        params: EffectParams,
    ) -> Result<EffectId, EngineError> {
        let id = self.alloc_id();
        let is_master = track == self.master.id;
        let entry = self.track_mut(track)?;
        let slot = EffectData {
            id,
            params,
            bypass: false,
        };
        if is_master {
            // New master effects go in front of the pinned limiter.
            let at = entry.fx_chain.len().saturating_sub(1);
            entry.fx_chain.insert(at, slot);
        } else {
            entry.fx_chain.push(slot);
        }
        Ok(id)
    }

    /// Rearrange a track's chain. `order` must be a permutation of the
    /// current chain; on the master it must keep the limiter last.
    pub fn reorder_effects(
        &mut self,
        track: TrackId,
        order: &[EffectId],
    ) -> Result<(), EngineError> {
        let is_master = track == self.master.id;
        let limiter = self.master_limiter_id();
        let entry = self.track_mut(track)?;

        for slot in &entry.fx_chain {
            if order.iter().filter(|&&id| id == slot.id).count() != 1 {
                return Err(EngineError::UnknownEffect(slot.id));
            }
        }
        if order.len() != entry.fx_chain.len() {
            let unknown = order
                .iter()
                .find(|&&id| !entry.fx_chain.iter().any(|e| e.id == id))
                .copied()
                .unwrap_or(0);
            return Err(EngineError::UnknownEffect(unknown));
        }
        if is_master && order.last() != Some(&limiter) {
            return Err(EngineError::LimiterPinned);
        }

        entry.fx_chain.sort_by_key(|e| {
            order
                .iter()
                .position(|&id| id == e.id)
                .unwrap_or(usize::MAX)
        });
        Ok(())
    }

    fn effect_mut(&mut self, effect: EffectId) -> Result<&mut EffectData, EngineError> {
        let found = self
            .master
            .fx_chain
            .iter_mut()
            .chain(self.tracks.iter_mut().flat_map(|t| t.fx_chain.iter_mut()))
            .find(|e| e.id == effect);
        found.ok_or(EngineError::UnknownEffect(effect))
    }

    pub fn remove_effect(&mut self, effect: EffectId) -> Result<(), EngineError> {
        if effect == self.master_limiter_id() {
            return Err(EngineError::LimiterPinned);
        }
        let before: usize = self.chain_len();
        self.master.fx_chain.retain(|e| e.id != effect);
        for track in &mut self.tracks {
            track.fx_chain.retain(|e| e.id != effect);
        }
        if self.chain_len() == before {
            return Err(EngineError::UnknownEffect(effect));
        }
        Ok(())
    }

    fn chain_len(&self) -> usize {
        self.master.fx_chain.len()
            + self
                .tracks
                .iter()
                .map(|t| t.fx_chain.len())
                .sum::<usize>()
    }

    pub fn set_effect_params(
        &mut self,
        effect: EffectId,
        params: EffectParams,
    ) -> Result<(), EngineError> {
        if effect == self.master_limiter_id() && !params.is_limiter() {
            return Err(EngineError::LimiterPinned);
        }
        self.effect_mut(effect)?.params = params;
        Ok(())
    }

    pub fn set_effect_bypass(&mut self, effect: EffectId, bypass: bool) -> Result<(), EngineError> {
        if effect == self.master_limiter_id() && bypass {
            return Err(EngineError::LimiterPinned);
        }
        self.effect_mut(effect)?.bypass = bypass;
        Ok(())
    }

    pub fn effect_params(&self, effect: EffectId) -> Result<&EffectParams, EngineError> {
        self.master
            .fx_chain
            .iter()
            .chain(self.tracks.iter().flat_map(|t| t.fx_chain.iter()))
            .find(|e| e.id == effect)
            .map(|e| &e.params)
            .ok_or(EngineError::UnknownEffect(effect))
    }

    // -- clips -------------------------------------------------------------

    pub fn add_audio_clip(
        &mut self,
        track: TrackId,
        source_path: &str,
        start_samples: u64,
    ) -> Result<ClipId, EngineError> {
        let source = self
            .sources
            .load(source_path)
            .map_err(|err| {
                eprintln!("[Session] Failed to load {source_path}: {err:#}");
                EngineError::SourceUnavailable(source_path.to_string())
            })?;
        let id = self.alloc_id();
        let duration_frames = source.frames();
        let entry = self.track_mut(track)?;
        if !matches!(
            entry.kind,
            TrackKind::Audio | TrackKind::Return | TrackKind::Group
        ) {
            return Err(EngineError::KindMismatch);
        }
        entry.clips.push(ClipData::Audio(AudioClipData {
            id,
            start_samples,
            source_offset: 0,
            duration_frames,
            source_path: source_path.to_string(),
        }));
        Ok(id)
    }

    /// Place an already-decoded take (a recording) as a clip.
    pub fn add_recorded_clip(
        &mut self,
        track: TrackId,
        source_path: &str,
        start_samples: u64,
        duration_frames: u64,
    ) -> Result<ClipId, EngineError> {
        let id = self.alloc_id();
        let entry = self.track_mut(track)?;
        entry.clips.push(ClipData::Audio(AudioClipData {
            id,
            start_samples,
            source_offset: 0,
            duration_frames,
            source_path: source_path.to_string(),
        }));
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
        let id = self.alloc_id();
        let entry = self.track_mut(track)?;
        if entry.kind != TrackKind::Midi {
            return Err(EngineError::KindMismatch);
        }
        entry.clips.push(ClipData::Midi(MidiClipData {
            id,
            start_samples,
            duration_beats,
            loop_length_beats: if loop_length_beats > 0.0 {
                loop_length_beats
            } else {
                duration_beats
            },
            notes,
        }));
        Ok(id)
    }

    fn clip_mut(&mut self, clip: ClipId) -> Result<&mut ClipData, EngineError> {
        self.tracks
            .iter_mut()
            .flat_map(|t| t.clips.iter_mut())
            .find(|c| clip_id(c) == clip)
            .ok_or(EngineError::UnknownClip(clip))
    }

    pub fn remove_clip(&mut self, clip: ClipId) -> Result<(), EngineError> {
        let mut removed = false;
        for track in &mut self.tracks {
            let before = track.clips.len();
            track.clips.retain(|c| clip_id(c) != clip);
            removed |= track.clips.len() != before;
        }
        if removed {
            Ok(())
        } else {
            Err(EngineError::UnknownClip(clip))
        }
    }

    pub fn move_clip(&mut self, clip: ClipId, start_samples: u64) -> Result<(), EngineError> {
        match self.clip_mut(clip)? {
            ClipData::Audio(c) => c.start_samples = start_samples,
            ClipData::Midi(c) => c.start_samples = start_samples,
        }
        Ok(())
    }

    /// Change a MIDI clip's loop length. Growing the loop past the clip's
    /// arrangement duration grows the duration with it; shrinking the loop
    /// leaves the duration alone, so the clip repeats more often instead.
    pub fn set_clip_loop_length(&mut self, clip: ClipId, beats: f64) -> Result<(), EngineError> {
        match self.clip_mut(clip)? {
            ClipData::Midi(c) => {
                c.loop_length_beats = if beats > 0.0 { beats } else { c.duration_beats };
                if c.loop_length_beats > c.duration_beats {
                    c.duration_beats = c.loop_length_beats;
                }
                Ok(())
            }
            ClipData::Audio(_) => Err(EngineError::KindMismatch),
        }
    }

    /// Snap note starts in a MIDI clip to the nearest grid line.
    pub fn quantize_clip(&mut self, clip: ClipId, grid_beats: f64) -> Result<(), EngineError> {
        match self.clip_mut(clip)? {
            ClipData::Midi(c) => {
                quantize_notes(&mut c.notes, grid_beats);
                Ok(())
            }
            ClipData::Audio(_) => Err(EngineError::KindMismatch),
        }
    }

    /// Clip length in samples; musical lengths need the current tempo.
    pub fn clip_duration_samples(
        &self,
        clip: ClipId,
        samples_per_beat: f64,
    ) -> Result<u64, EngineError> {
        for track in &self.tracks {
            for c in &track.clips {
                if clip_id(c) == clip {
                    return Ok(match c {
                        ClipData::Audio(c) => c.duration_frames,
                        ClipData::Midi(c) => (c.duration_beats * samples_per_beat) as u64,
                    });
                }
            }
        }
        Err(EngineError::UnknownClip(clip))
    }

    /// Min/max pairs for waveform display, one per bucket.
    pub fn waveform_peaks(
        &self,
        clip: ClipId,
        buckets: usize,
    ) -> Result<Vec<(f32, f32)>, EngineError> {
        for track in &self.tracks {
            for c in &track.clips {
                if let ClipData::Audio(data) = c {
                    if data.id != clip {
                        continue;
                    }
                    let source = self
                        .sources
                        .get(&data.source_path)
                        .ok_or(EngineError::UnknownClip(clip))?;
                    let samples = &source.data;
                    let frames = (samples.len() / 2)
                        .min(data.duration_frames as usize)
                        .saturating_sub(data.source_offset as usize);
                    if buckets == 0 || frames == 0 {
                        return Ok(Vec::new());
                    }
                    let per_bucket = (frames / buckets).max(1);
                    let mut peaks = Vec::with_capacity(buckets);
                    for b in 0..buckets {
                        let from = data.source_offset as usize + b * per_bucket;
                        let to = (from + per_bucket).min(samples.len() / 2);
                        let mut lo = 0.0f32;
                        let mut hi = 0.0f32;
                        for frame in from..to {
                            let mono = (samples[frame * 2] + samples[frame * 2 + 1]) * 0.5;
                            lo = lo.min(mono);
                            hi = hi.max(mono);
                        }
                        peaks.push((lo, hi));
                    }
                    return Ok(peaks);
                }
            }
        }
        Err(EngineError::UnknownClip(clip))
    }

    // -- snapshot ----------------------------------------------------------

    pub fn build_snapshot(&self) -> GraphSnapshot {
        let any_solo = self.tracks.iter().any(|t| t.solo);
        GraphSnapshot {
            tracks: self
                .tracks
                .iter()
                .map(|t| self.snapshot_track(t))
                .collect(),
            master: self.snapshot_track(&self.master),
            any_solo,
        }
    }

    fn snapshot_track(&self, track: &TrackData) -> TrackSnapshot {
        let mut audio_clips = Vec::new();
        let mut midi_clips = Vec::new();
        for clip in &track.clips {
            match clip {
                ClipData::Audio(c) => audio_clips.push(AudioClipSnapshot {
                    id: c.id,
                    start: c.start_samples,
                    source_offset: c.source_offset,
                    duration_frames: c.duration_frames,
                    data: self.sources.get(&c.source_path).map(|s| s.data.clone()),
                }),
                ClipData::Midi(c) => midi_clips.push(MidiClipSnapshot {
                    id: c.id,
                    start: c.start_samples,
                    duration_beats: c.duration_beats,
                    loop_length_beats: c.loop_length_beats,
                    notes: Arc::new(c.notes.clone()),
                }),
            }
        }
        TrackSnapshot {
            id: track.id,
            kind: track.kind,
            gain: db_to_gain(track.volume_db),
            pan: track.pan,
            mute: track.mute,
            solo: track.solo,
            armed: track.armed,
            synth: track.synth,
            audio_clips,
            midi_clips,
            chain: track
                .fx_chain
                .iter()
                .map(|e| EffectSlot {
                    id: e.id,
                    params: e.params.clone(),
                    bypass: e.bypass,
                })
                .collect(),
        }
    }

    // -- project serialization ---------------------------------------------

    pub fn to_project(
        &self,
        tempo_bpm: f64,
        time_signature: u32,
        count_in_bars: u32,
        metronome_enabled: bool,
    ) -> ProjectData {
        let mut tracks = vec![self.master.clone()];
        tracks.extend(self.tracks.iter().cloned());
        ProjectData {
            name: self.name.clone(),
            tempo_bpm,
            time_signature,
            count_in_bars,
            metronome_enabled,
            tracks,
        }
    }

    /// Rebuild the whole session from a project description. Audio sources
    /// are reloaded by path; a missing file leaves its clips silent.
    pub fn load_project(&mut self, project: &ProjectData) {
        self.name = project.name.clone();
        self.tracks.clear();
        let mut max_id = 0u64;
        for data in &project.tracks {
            max_id = max_id.max(data.id);
            for effect in &data.fx_chain {
                max_id = max_id.max(effect.id);
            }
            for clip in &data.clips {
                max_id = max_id.max(clip_id(clip));
                if let ClipData::Audio(c) = clip {
                    if self.sources.get(&c.source_path).is_none() {
                        if let Err(err) = self.sources.load(&c.source_path) {
                            eprintln!(
                                "[Session] Source {} unavailable: {err:#}",
                                c.source_path
                            );
                        }
                    }
                }
            }
            if data.kind == TrackKind::Master {
                self.master = data.clone();
            } else {
                self.tracks.push(data.clone());
            }
        }
        // Re-pin the master limiter for projects saved without one.
        if !self.master.fx_chain.last().map(|e| e.params.is_limiter()).unwrap_or(false) {
            max_id += 1;
            self.master.fx_chain.push(EffectData {
                id: max_id,
                params: EffectParams::for_kind(EffectKind::Limiter),
                bypass: false,
            });
        }
        self.next_id = max_id + 1;
    }
}

fn clip_id(clip: &ClipData) -> ClipId {
    match clip {
        ClipData::Audio(c) => c.id,
        ClipData::Midi(c) => c.id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_created_with_pinned_limiter() {
        let session = Session::new(48000);
        let master = session.track(session.master_id()).unwrap();
        assert_eq!(master.fx_chain.len(), 1);
        assert!(master.fx_chain[0].params.is_limiter());
    }

    #[test]
    fn test_master_cannot_be_removed_or_muted() {
        let mut session = Session::new(48000);
        let master = session.master_id();
        assert!(matches!(
            session.remove_track(master),
            Err(EngineError::MasterImmutable)
        ));
        assert!(matches!(
            session.set_track_param(master, TrackParam::Mute(true)),
            Err(EngineError::MasterImmutable)
        ));
        // Volume stays adjustable.
        assert!(session
            .set_track_param(master, TrackParam::VolumeDb(-6.0))
            .is_ok());
    }

    #[test]
    fn test_limiter_pinned_to_chain_end() {
        let mut session = Session::new(48000);
        let master = session.master_id();
        let limiter = session.master_limiter_id();
        let eq = session.add_effect(master, EffectKind::Eq).unwrap();

        // Inserted before the limiter.
        let chain = &session.track(master).unwrap().fx_chain;
        assert_eq!(chain[0].id, eq);
        assert_eq!(chain[1].id, limiter);

        assert!(matches!(
            session.remove_effect(limiter),
            Err(EngineError::LimiterPinned)
        ));
        assert!(matches!(
            session.set_effect_bypass(limiter, true),
            Err(EngineError::LimiterPinned)
        ));
        assert!(session.remove_effect(eq).is_ok());
    }

    #[test]
    fn test_reorder_effects() {
        let mut session = Session::new(48000);
        let track = session.add_track(TrackKind::Audio, "Gtr").unwrap();
        let a = session.add_effect(track, EffectKind::Eq).unwrap();
        let b = session.add_effect(track, EffectKind::Delay).unwrap();
        session.reorder_effects(track, &[b, a]).unwrap();
        let chain: Vec<_> = session.track(track).unwrap().fx_chain.iter().map(|e| e.id).collect();
        assert_eq!(chain, vec![b, a]);

        // Not a permutation.
        assert!(session.reorder_effects(track, &[a, a]).is_err());
        assert!(session.reorder_effects(track, &[a]).is_err());

        // The master limiter must stay last.
        let master = session.master_id();
        let comp = session.add_effect(master, EffectKind::Compressor).unwrap();
        let limiter = session.master_limiter_id();
        assert!(matches!(
            session.reorder_effects(master, &[limiter, comp]),
            Err(EngineError::LimiterPinned)
        ));
        assert!(session.reorder_effects(master, &[comp, limiter]).is_ok());
    }

    #[test]
    fn test_synth_params_require_midi_track() {
        let mut session = Session::new(48000);
        let audio = session.add_track(TrackKind::Audio, "Gtr").unwrap();
        assert!(matches!(
            session.set_synth_params(audio, SynthParams::default()),
            Err(EngineError::KindMismatch)
        ));
        let midi = session.add_track(TrackKind::Midi, "Keys").unwrap();
        assert!(session.set_synth_params(midi, SynthParams::default()).is_ok());
    }

    #[test]
    fn test_solo_reflected_in_snapshot() {
        let mut session = Session::new(48000);
        let a = session.add_track(TrackKind::Midi, "A").unwrap();
        session.add_track(TrackKind::Midi, "B").unwrap();
        assert!(!session.build_snapshot().any_solo);
        session.set_track_param(a, TrackParam::Solo(true)).unwrap();
        let snapshot = session.build_snapshot();
        assert!(snapshot.any_solo);
        assert!(snapshot.tracks[0].solo);
        assert!(!snapshot.tracks[1].solo);
    }

    #[test]
    fn test_quantize_clip() {
        let mut session = Session::new(48000);
        let track = session.add_track(TrackKind::Midi, "Keys").unwrap();
        let clip = session
            .add_midi_clip(
                track,
                0,
                4.0,
                4.0,
                vec![NoteSpec {
                    pitch: 60,
                    velocity: 100,
                    start_beats: 1.13,
                    duration_beats: 0.5,
                }],
            )
            .unwrap();
        session.quantize_clip(clip, 0.25).unwrap();
        let snapshot = session.build_snapshot();
        assert!((snapshot.tracks[0].midi_clips[0].notes[0].start_beats - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_loop_length_grows_duration_one_way() {
        let mut session = Session::new(48000);
        let track = session.add_track(TrackKind::Midi, "Keys").unwrap();
        let clip = session
            .add_midi_clip(track, 0, 4.0, 4.0, Vec::new())
            .unwrap();

        session.set_clip_loop_length(clip, 8.0).unwrap();
        let snapshot = session.build_snapshot();
        assert_eq!(snapshot.tracks[0].midi_clips[0].duration_beats, 8.0);
        assert_eq!(snapshot.tracks[0].midi_clips[0].loop_length_beats, 8.0);

        // Shrinking the loop keeps the duration; the clip repeats instead.
        session.set_clip_loop_length(clip, 2.0).unwrap();
        let snapshot = session.build_snapshot();
        assert_eq!(snapshot.tracks[0].midi_clips[0].duration_beats, 8.0);
        assert_eq!(snapshot.tracks[0].midi_clips[0].loop_length_beats, 2.0);
    }

    #[test]
    fn test_project_roundtrip_preserves_graph() {
        let mut session = Session::new(48000);
        let midi = session.add_track(TrackKind::Midi, "Keys").unwrap();
        session.add_effect(midi, EffectKind::Delay).unwrap();
        session
            .add_midi_clip(midi, 48000, 4.0, 2.0, Vec::new())
            .unwrap();
        let project = session.to_project(140.0, 3, 2, false);

        let mut restored = Session::new(48000);
        restored.load_project(&project);
        let again = restored.to_project(140.0, 3, 2, false);
        assert_eq!(project, again);
    }

    #[test]
    fn test_load_project_ids_do_not_collide() {
        let mut session = Session::new(48000);
        let midi = session.add_track(TrackKind::Midi, "Keys").unwrap();
        let project = session.to_project(120.0, 4, 1, true);

        let mut restored = Session::new(48000);
        restored.load_project(&project);
        let new_track = restored.add_track(TrackKind::Audio, "Gtr").unwrap();
        assert!(new_track > midi);
    }
}
