use crossbeam_channel::Sender;
use ringbuf::HeapProd;

use cadenza_shared::{EffectId, TrackId};

use crate::effects::EffectUnit;
use crate::synth::Synth;

/// Commands sent from the control thread to the audio callback over an
/// unbounded channel and drained with `try_recv` at the top of each buffer.
/// Anything that allocates (synths, effect units, capture rings) is built on
/// the control thread and moved in whole.
pub enum EngineCommand {
    /// Live input, routed to the armed MIDI track (or the first MIDI track
    /// when none is armed).
    NoteOn {
        note: u8,
        velocity: u8,
    },
    NoteOff {
        note: u8,
        velocity: u8,
    },
    AllNotesOff,
    InstallSynth {
        track: TrackId,
        synth: Box<Synth>,
    },
    InstallEffect {
        effect: EffectId,
        unit: Box<EffectUnit>,
    },
    RemoveEffect {
        effect: EffectId,
    },
    RemoveTrack {
        track: TrackId,
    },
    /// Hand the callback the producer half of a capture ring for an armed
    /// audio track.
    ArmCapture {
        track: TrackId,
        producer: HeapProd<f32>,
    },
    DisarmCapture {
        track: TrackId,
    },
    StartRecording,
    /// The acknowledgment is sent after the callback has stopped pushing
    /// capture samples, so the control thread can drain the worker safely.
    StopRecording {
        response_tx: Sender<()>,
    },
}

/// State evicted from the callback. Dropping it there could free large
/// buffers inside the audio deadline, so it is shipped to a scavenger
/// thread instead.
pub enum DropPayload {
    Synth(Box<Synth>),
    Effect(Box<EffectUnit>),
    Capture(HeapProd<f32>),
}
