use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use cadenza_shared::{ClipId, EffectId, TrackId};

/// Events originating on the audio thread. The callback never logs; it
/// pushes these into a lock-free ring for the control thread to drain and
/// surface. If the ring is full the event is dropped, never blocked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    /// A clip's source was missing or not ready; silence was substituted.
    SourceNotReady { track: TrackId, clip: ClipId },
    /// The voice pool was exhausted; `count` voices were stolen this buffer.
    VoiceStolen { track: TrackId, count: u32 },
    /// An effect id present in the chain had no installed processor.
    EffectMissing { effect: EffectId },
    /// The capture ring for an armed track overflowed; samples were lost.
    CaptureOverrun { track: TrackId },
    /// The output stream reported an error.
    StreamError,
}

const DIAG_CAPACITY: usize = 256;

pub struct DiagnosticSink {
    prod: HeapProd<Diagnostic>,
}

impl DiagnosticSink {
    pub fn push(&mut self, diag: Diagnostic) {
        let _ = self.prod.try_push(diag);
    }
}

pub struct DiagnosticDrain {
    cons: HeapCons<Diagnostic>,
}

impl DiagnosticDrain {
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        while let Some(d) = self.cons.try_pop() {
            out.push(d);
        }
        out
    }
}

pub fn diagnostic_channel() -> (DiagnosticSink, DiagnosticDrain) {
    let (prod, cons) = HeapRb::<Diagnostic>::new(DIAG_CAPACITY).split();
    (DiagnosticSink { prod }, DiagnosticDrain { cons })
}
