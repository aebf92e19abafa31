//! Headless end-to-end tests driving the engine through its public surface.

#[cfg(test)]
mod tests {
    use cadenza_shared::{
        ClipData, EngineError, NoteSpec, ProjectData, TrackKind, TrackParam,
    };

    use crate::diagnostics::Diagnostic;
    use crate::engine::AudioEngine;
    use crate::recorder::RecordingState;
    use crate::transport::TransportState;

    fn engine() -> AudioEngine {
        let mut engine = AudioEngine::headless(48000);
        engine.set_metronome_enabled(false);
        engine
    }

    fn note(pitch: u8, start: f64, dur: f64) -> NoteSpec {
        NoteSpec {
            pitch,
            velocity: 100,
            start_beats: start,
            duration_beats: dur,
        }
    }

    fn peak(buf: &[f32]) -> f32 {
        buf.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_midi_clip_produces_audio_then_decays() {
        let mut engine = engine();
        let track = engine.add_track(TrackKind::Midi, "Keys").unwrap();
        engine
            .add_midi_clip(track, 0, 4.0, 4.0, vec![note(60, 0.0, 1.0)])
            .unwrap();
        engine.play();

        // At 120 BPM the note sounds for 24000 samples, then releases.
        let buf = engine.advance(1024).unwrap();
        assert_eq!(buf.len(), 2048);
        assert!(peak(&buf) > 1e-3);

        // Skip to two beats in: note off plus the 300 ms release are long
        // past, the track must be silent.
        let mut last = Vec::new();
        for _ in 0..46 {
            last = engine.advance(1024).unwrap();
        }
        assert!(peak(&last) < 1e-3);
    }

    #[test]
    fn test_four_beat_clip_voice_lifecycle() {
        let mut engine = engine();
        let track = engine.add_track(TrackKind::Midi, "Keys").unwrap();
        // One note spanning the whole 4-beat clip at 120 BPM.
        engine
            .add_midi_clip(track, 0, 4.0, 4.0, vec![note(60, 0.0, 4.0)])
            .unwrap();
        engine.play();

        // One second in: the note is sounding.
        for _ in 0..48 {
            engine.advance(1000).unwrap();
        }
        assert_eq!(engine.active_voice_count(track).unwrap(), 1);

        // Past the clip end plus the release tail: nothing left.
        for _ in 0..64 {
            engine.advance(1000).unwrap();
        }
        assert_eq!(engine.active_voice_count(track).unwrap(), 0);
    }

    #[test]
    fn test_stop_flushes_sounding_notes() {
        let mut engine = engine();
        let track = engine.add_track(TrackKind::Midi, "Keys").unwrap();
        engine
            .add_midi_clip(track, 0, 8.0, 8.0, vec![note(60, 0.0, 8.0)])
            .unwrap();
        engine.play();
        let buf = engine.advance(2048).unwrap();
        assert!(peak(&buf) > 1e-3);

        engine.stop();
        // Release tail rings for 300 ms, then silence.
        let mut last = Vec::new();
        for _ in 0..20 {
            last = engine.advance(1024).unwrap();
        }
        assert!(peak(&last) < 1e-3);
        assert_eq!(engine.position(), 2048);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut engine = engine();
        engine.play();
        engine.advance(4096).unwrap();
        engine.stop();
        assert_eq!(engine.position(), 4096);
        engine.stop();
        assert_eq!(engine.position(), 4096);
        assert_eq!(engine.transport_state(), TransportState::Stopped);
    }

    #[test]
    fn test_loop_seam_does_not_accumulate_voices() {
        let mut engine = engine();
        let track = engine.add_track(TrackKind::Midi, "Pad").unwrap();
        // One note sustaining the whole 4-beat loop; each wrap must end it
        // before retriggering.
        engine
            .add_midi_clip(track, 0, 4.0, 4.0, vec![note(60, 0.0, 4.0)])
            .unwrap();
        engine.set_loop_region(0, 96_000).unwrap();
        engine.set_loop_enabled(true);
        engine.play();

        // First iteration: settle, then measure.
        let mut first_peak = 0.0f32;
        for i in 0..96 {
            let buf = engine.advance(1000).unwrap();
            if i >= 48 {
                first_peak = first_peak.max(peak(&buf));
            }
        }
        // Three more iterations.
        let mut later_peak = 0.0f32;
        for i in 0..288 {
            let buf = engine.advance(1000).unwrap();
            if i >= 240 {
                later_peak = later_peak.max(peak(&buf));
            }
        }

        assert!(first_peak > 1e-3);
        // A drone would stack voices and grow the signal each pass.
        assert!(later_peak < first_peak * 2.0);
        let stolen = engine
            .diagnostics()
            .iter()
            .any(|d| matches!(d, Diagnostic::VoiceStolen { .. }));
        assert!(!stolen);
    }

    #[test]
    fn test_mute_silences_after_one_ramp_buffer() {
        let mut engine = engine();
        let track = engine.add_track(TrackKind::Midi, "Keys").unwrap();
        engine
            .add_midi_clip(track, 0, 16.0, 16.0, vec![note(60, 0.0, 16.0)])
            .unwrap();
        engine.play();
        engine.advance(2048).unwrap();

        engine
            .set_track_param(track, TrackParam::Mute(true))
            .unwrap();
        engine.advance(1024).unwrap(); // gain ramps to zero here
        let buf = engine.advance(1024).unwrap();
        assert!(peak(&buf) < 1e-5);

        // Unmuting brings it back.
        engine
            .set_track_param(track, TrackParam::Mute(false))
            .unwrap();
        engine.advance(1024).unwrap();
        let buf = engine.advance(1024).unwrap();
        assert!(peak(&buf) > 1e-3);
    }

    #[test]
    fn test_track_removal_mid_playback() {
        let mut engine = engine();
        let keep = engine.add_track(TrackKind::Midi, "A").unwrap();
        let gone = engine.add_track(TrackKind::Midi, "B").unwrap();
        engine
            .add_midi_clip(keep, 0, 8.0, 8.0, vec![note(60, 0.0, 8.0)])
            .unwrap();
        engine
            .add_midi_clip(gone, 0, 8.0, 8.0, vec![note(72, 0.0, 8.0)])
            .unwrap();
        engine.play();
        engine.advance(2048).unwrap();

        engine.remove_track(gone).unwrap();
        let buf = engine.advance(2048).unwrap();
        // The surviving track still sounds.
        assert!(peak(&buf) > 1e-3);
        assert!(matches!(
            engine.remove_track(gone),
            Err(EngineError::UnknownTrack(_))
        ));
    }

    #[test]
    fn test_invalid_loop_region_rejected() {
        let engine = engine();
        assert!(matches!(
            engine.set_loop_region(1000, 1000),
            Err(EngineError::InvalidLoopRegion)
        ));
    }

    #[test]
    fn test_audio_take_creates_clip_at_start_position() {
        let mut engine = engine();
        let track = engine.add_track(TrackKind::Audio, "Gtr").unwrap();
        engine
            .set_track_param(track, TrackParam::Armed(true))
            .unwrap();
        engine.set_count_in_bars(0);

        engine.start_recording().unwrap();
        for _ in 0..47 {
            engine.advance(1024).unwrap();
        }
        let outcome = engine.stop_recording().unwrap();

        assert_eq!(outcome.audio_clips.len(), 1);
        let (clip_track, clip) = outcome.audio_clips[0];
        assert_eq!(clip_track, track);
        assert_eq!(engine.get_clip_duration(clip).unwrap(), 47 * 1024);
        assert_eq!(engine.recording_state(), RecordingState::Idle);

        // Stopping again is a no-op.
        let again = engine.stop_recording().unwrap();
        assert!(again.audio_clips.is_empty());
    }

    #[test]
    fn test_count_in_then_midi_take() {
        let mut engine = engine();
        let track = engine.add_track(TrackKind::Midi, "Keys").unwrap();
        engine
            .set_track_param(track, TrackParam::Armed(true))
            .unwrap();
        // Default: one 4/4 bar of count-in, 96000 samples at 120 BPM.

        engine.start_recording().unwrap();
        engine.advance(1024).unwrap();
        assert_eq!(engine.recording_state(), RecordingState::CountingIn);
        assert_eq!(engine.transport_state(), TransportState::Stopped);
        let (beat, _) = engine.count_in_progress();
        assert_eq!(beat, 1);

        // Key held down during the count-in.
        engine.send_note_on(60, 100).unwrap();

        for _ in 0..93 {
            engine.advance(1024).unwrap();
        }
        assert_eq!(engine.recording_state(), RecordingState::Recording);
        assert_eq!(engine.transport_state(), TransportState::Playing);

        // About one beat of recording, then release.
        for _ in 0..24 {
            engine.advance(1000).unwrap();
        }
        engine.send_note_off(60, 0).unwrap();
        let outcome = engine.stop_recording().unwrap();

        let (clip_track, clip) = outcome.midi_clip.expect("midi take expected");
        assert_eq!(clip_track, track);
        // Rounded up to one whole bar.
        assert_eq!(engine.get_clip_duration(clip).unwrap(), 96_000);

        // The held note was carried across the boundary at timestamp zero.
        let json = engine.export_project().unwrap();
        let project = ProjectData::from_json(&json).unwrap();
        let notes: Vec<NoteSpec> = project
            .tracks
            .iter()
            .flat_map(|t| t.clips.iter())
            .filter_map(|c| match c {
                ClipData::Midi(m) => Some(m.notes.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].pitch, 60);
        assert!(notes[0].start_beats.abs() < 1e-9);
        assert!(notes[0].duration_beats > 0.5);
    }

    #[test]
    fn test_stop_during_count_in_discards_take() {
        let mut engine = engine();
        let track = engine.add_track(TrackKind::Midi, "Keys").unwrap();
        engine
            .set_track_param(track, TrackParam::Armed(true))
            .unwrap();

        engine.start_recording().unwrap();
        engine.advance(4096).unwrap();
        assert_eq!(engine.recording_state(), RecordingState::CountingIn);
        assert!(matches!(
            engine.start_recording(),
            Err(EngineError::RecorderBusy)
        ));

        let outcome = engine.stop_recording().unwrap();
        assert!(outcome.audio_clips.is_empty());
        assert!(outcome.midi_clip.is_none());
        // The transport never started.
        assert_eq!(engine.transport_state(), TransportState::Stopped);
    }

    #[test]
    fn test_metronome_audible_during_count_in() {
        let mut engine = AudioEngine::headless(48000);
        let track = engine.add_track(TrackKind::Midi, "Keys").unwrap();
        engine
            .set_track_param(track, TrackParam::Armed(true))
            .unwrap();
        engine.start_recording().unwrap();
        let buf = engine.advance(1024).unwrap();
        // Downbeat click with no other material playing.
        assert!(peak(&buf) > 0.05);
    }

    #[test]
    fn test_project_roundtrip_through_engine() {
        let mut engine = engine();
        let midi = engine.add_track(TrackKind::Midi, "Keys").unwrap();
        engine.add_track(TrackKind::Audio, "Gtr").unwrap();
        engine
            .add_midi_clip(midi, 48_000, 4.0, 2.0, vec![note(64, 0.5, 0.25)])
            .unwrap();
        engine
            .add_effect(midi, cadenza_shared::EffectKind::Chorus)
            .unwrap();
        engine.set_tempo(140.0);
        engine.set_time_signature(3);

        let json = engine.export_project().unwrap();

        let mut restored = AudioEngine::headless(48000);
        restored.load_project(&json).unwrap();
        assert_eq!(restored.tempo(), 140.0);
        assert_eq!(restored.export_project().unwrap(), json);

        // The restored graph actually plays.
        restored.set_metronome_enabled(false);
        restored.seek(48_000);
        restored.play();
        let mut heard = false;
        for _ in 0..16 {
            let buf = restored.advance(1024).unwrap();
            heard |= peak(&buf) > 1e-4;
        }
        assert!(heard);
    }

    #[test]
    fn test_live_note_sounds_without_transport() {
        let mut engine = engine();
        engine.add_track(TrackKind::Midi, "Keys").unwrap();
        engine.send_note_on(72, 110).unwrap();
        let buf = engine.advance(2048).unwrap();
        assert!(peak(&buf) > 1e-3);

        engine.send_note_off(72, 0).unwrap();
        let mut last = Vec::new();
        for _ in 0..20 {
            last = engine.advance(1024).unwrap();
        }
        assert!(peak(&last) < 1e-3);
    }
}
