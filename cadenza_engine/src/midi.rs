use std::cmp::Ordering;

use cadenza_shared::NoteSpec;

/// MIDI messages the engine routes. Control changes and pitch bend are the
/// plugin host's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8, velocity: u8 },
}

/// A message with its sample-accurate offset inside the current buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    pub message: MidiMessage,
    pub offset: u32,
}

impl MidiEvent {
    pub fn note_on(note: u8, velocity: u8, offset: u32) -> Self {
        Self {
            message: MidiMessage::NoteOn { note, velocity },
            offset,
        }
    }

    pub fn note_off(note: u8, velocity: u8, offset: u32) -> Self {
        Self {
            message: MidiMessage::NoteOff { note, velocity },
            offset,
        }
    }
}

impl PartialOrd for MidiEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MidiEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.offset.cmp(&other.offset) {
            Ordering::Equal => {
                // At the same offset note-offs sort before note-ons so a
                // wrapped loop ends the old note before retriggering it.
                match (&self.message, &other.message) {
                    (MidiMessage::NoteOff { .. }, MidiMessage::NoteOn { .. }) => Ordering::Less,
                    (MidiMessage::NoteOn { .. }, MidiMessage::NoteOff { .. }) => Ordering::Greater,
                    _ => Ordering::Equal,
                }
            }
            other => other,
        }
    }
}

/// A note-on scheduled from a clip, with the sounding length already clipped
/// to the clip's loop seam and arrangement end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledNote {
    pub pitch: u8,
    pub velocity: u8,
    pub offset: u32,
    pub duration_samples: u64,
}

/// Quantize stored note starts to the nearest grid line. Nearest-to-grid is
/// the one policy used everywhere (post-hoc and record-time); an already
/// aligned note is untouched.
pub fn quantize_notes(notes: &mut [NoteSpec], grid_beats: f64) {
    if grid_beats <= 0.0 {
        return;
    }
    for note in notes.iter_mut() {
        note.start_beats = (note.start_beats / grid_beats).round() * grid_beats;
    }
}

/// Emit note-ons from one MIDI clip for the absolute sample window
/// `[window_start, window_start + window_len)`.
///
/// Notes are stored once; playback wraps them every `loop_length_beats`
/// until the clip's arrangement duration runs out. A note sustaining past
/// the seam is clipped so its note-off lands on the seam, where the next
/// iteration's note-on retriggers it.
///
/// `offset_shift` is added to every emitted buffer offset; the renderer uses
/// it for the post-wrap part of a split buffer.
#[allow(clippy::too_many_arguments)]
pub fn schedule_clip_window(
    notes: &[NoteSpec],
    clip_start: u64,
    duration_beats: f64,
    loop_length_beats: f64,
    window_start: u64,
    window_len: u64,
    offset_shift: u32,
    samples_per_beat: f64,
    out: &mut Vec<ScheduledNote>,
) {
    if loop_length_beats <= 0.0 || samples_per_beat <= 0.0 || window_len == 0 {
        return;
    }
    let window_end = window_start + window_len;
    let clip_end = clip_start + (duration_beats * samples_per_beat) as u64;
    if clip_start >= window_end || clip_end <= window_start {
        return;
    }

    // Beat positions of the window relative to the clip start.
    let rel_start_beats = (window_start.saturating_sub(clip_start)) as f64 / samples_per_beat;

    for note in notes {
        if note.start_beats >= loop_length_beats {
            continue;
        }
        // Iterations that could land in this window.
        let first_k = ((rel_start_beats - note.start_beats) / loop_length_beats).floor() as i64 - 1;
        let first_k = first_k.max(0) as u64;
        for k in first_k.. {
            let occ_beats = k as f64 * loop_length_beats + note.start_beats;
            if occ_beats >= duration_beats {
                break;
            }
            let occ = clip_start + (occ_beats * samples_per_beat) as u64;
            if occ >= window_end {
                break;
            }
            if occ < window_start {
                continue;
            }

            // Clip the sounding length to the loop seam and the clip end.
            let mut dur_beats = note
                .duration_beats
                .min(loop_length_beats - note.start_beats);
            dur_beats = dur_beats.min(duration_beats - occ_beats);
            let duration_samples = ((dur_beats * samples_per_beat) as u64).max(1);

            out.push(ScheduledNote {
                pitch: note.pitch,
                velocity: note.velocity,
                offset: (occ - window_start) as u32 + offset_shift,
                duration_samples,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(pitch: u8, start: f64, dur: f64) -> NoteSpec {
        NoteSpec {
            pitch,
            velocity: 100,
            start_beats: start,
            duration_beats: dur,
        }
    }

    #[test]
    fn test_event_ordering_off_before_on() {
        let mut events = vec![
            MidiEvent::note_on(60, 100, 128),
            MidiEvent::note_off(60, 64, 128),
        ];
        events.sort();
        assert!(matches!(events[0].message, MidiMessage::NoteOff { .. }));
        assert!(matches!(events[1].message, MidiMessage::NoteOn { .. }));
    }

    #[test]
    fn test_quantize_nearest() {
        let mut notes = vec![note(60, 0.37, 1.0)];
        quantize_notes(&mut notes, 0.25);
        assert!((notes[0].start_beats - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_quantize_aligned_is_noop() {
        let mut notes = vec![note(60, 0.5, 1.0)];
        quantize_notes(&mut notes, 0.25);
        assert!((notes[0].start_beats - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_schedule_simple_window() {
        // 120 BPM at 48 kHz: one beat = 24000 samples.
        let spb = 24000.0;
        let notes = vec![note(60, 1.0, 1.0)];
        let mut out = Vec::new();
        schedule_clip_window(&notes, 0, 4.0, 4.0, 23_552, 1024, 0, spb, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].offset, (24000 - 23_552) as u32);
        assert_eq!(out[0].duration_samples, 24000);
    }

    #[test]
    fn test_schedule_wraps_every_loop_iteration() {
        let spb = 24000.0;
        let notes = vec![note(60, 0.0, 1.0)];
        let mut out = Vec::new();
        // Second loop iteration of a 2-beat loop inside an 8-beat clip.
        schedule_clip_window(&notes, 0, 8.0, 2.0, 48_000, 1024, 0, spb, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].offset, 0);
    }

    #[test]
    fn test_sustain_across_seam_is_clipped_to_seam() {
        let spb = 24000.0;
        // Note runs 1.5 beats but the loop is 1 beat long past its start.
        let notes = vec![note(60, 1.0, 1.5)];
        let mut out = Vec::new();
        schedule_clip_window(&notes, 0, 8.0, 2.0, 24_000, 64, 0, spb, &mut out);
        assert_eq!(out.len(), 1);
        // Clipped to the seam: 1 beat, not 1.5.
        assert_eq!(out[0].duration_samples, 24000);
    }

    #[test]
    fn test_clip_end_not_exceeded() {
        let spb = 24000.0;
        let notes = vec![note(60, 0.0, 4.0)];
        let mut out = Vec::new();
        // 4-beat non-looping clip: single occurrence, full length.
        schedule_clip_window(&notes, 0, 4.0, 4.0, 0, 64, 0, spb, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].duration_samples, 4 * 24000);

        // A window past the clip end emits nothing.
        out.clear();
        schedule_clip_window(&notes, 0, 4.0, 4.0, 96_000, 1024, 0, spb, &mut out);
        assert!(out.is_empty());
    }
}
