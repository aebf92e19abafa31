use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

impl TransportState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => TransportState::Playing,
            2 => TransportState::Paused,
            _ => TransportState::Stopped,
        }
    }
}

/// Sample-accurate transport shared between the control thread and the audio
/// callback. All fields are atomics; the control thread writes, the callback
/// reads and advances the playhead.
#[derive(Clone)]
pub struct Transport {
    state: Arc<AtomicU8>,
    playhead: Arc<AtomicU64>,
    loop_enabled: Arc<AtomicBool>,
    loop_start: Arc<AtomicU64>,
    loop_end: Arc<AtomicU64>,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(TransportState::Stopped as u8)),
            playhead: Arc::new(AtomicU64::new(0)),
            loop_enabled: Arc::new(AtomicBool::new(false)),
            loop_start: Arc::new(AtomicU64::new(0)),
            loop_end: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_playing(&self) -> bool {
        self.state() == TransportState::Playing
    }

    pub fn position(&self) -> u64 {
        self.playhead.load(Ordering::SeqCst)
    }

    /// Resume in place, except when a loop region is active and the playhead
    /// lies outside it; then playback starts at the loop start.
    pub fn play(&self) {
        if self.loop_enabled.load(Ordering::SeqCst) {
            let pos = self.playhead.load(Ordering::SeqCst);
            let start = self.loop_start.load(Ordering::SeqCst);
            let end = self.loop_end.load(Ordering::SeqCst);
            if pos < start || pos >= end {
                self.playhead.store(start, Ordering::SeqCst);
            }
        }
        self.state.store(TransportState::Playing as u8, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.state.store(TransportState::Paused as u8, Ordering::SeqCst);
    }

    /// Stop keeps the playhead where it is. Double-stop-rewinds-to-reference
    /// behavior belongs to the control layer, which can call `seek` itself.
    pub fn stop(&self) {
        self.state.store(TransportState::Stopped as u8, Ordering::SeqCst);
    }

    /// Valid in any state.
    pub fn seek(&self, position_samples: u64) {
        self.playhead.store(position_samples, Ordering::SeqCst);
    }

    pub fn set_loop_region(&self, start_samples: u64, end_samples: u64) {
        self.loop_start.store(start_samples, Ordering::SeqCst);
        self.loop_end.store(end_samples, Ordering::SeqCst);
    }

    pub fn set_loop_enabled(&self, enabled: bool) {
        self.loop_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn loop_region(&self) -> Option<(u64, u64)> {
        if self.loop_enabled.load(Ordering::SeqCst) {
            Some((
                self.loop_start.load(Ordering::SeqCst),
                self.loop_end.load(Ordering::SeqCst),
            ))
        } else {
            None
        }
    }

    /// Advance the playhead by one buffer. If the new position reaches the
    /// loop end, wrap to `loop_start + (pos - loop_end)`; the remainder is
    /// preserved so downbeats stay aligned across the seam. Returns the new
    /// position and whether a wrap happened (the renderer silences held
    /// notes across the seam in that case).
    pub fn advance(&self, frames: u64) -> (u64, bool) {
        let mut pos = self.playhead.load(Ordering::SeqCst) + frames;
        let mut wrapped = false;
        if self.loop_enabled.load(Ordering::SeqCst) {
            let start = self.loop_start.load(Ordering::SeqCst);
            let end = self.loop_end.load(Ordering::SeqCst);
            if end > start && pos >= end {
                pos = start + (pos - end);
                wrapped = true;
            }
        }
        self.playhead.store(pos, Ordering::SeqCst);
        (pos, wrapped)
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_keeps_position() {
        let t = Transport::new();
        t.seek(48000);
        t.play();
        t.stop();
        let first = t.position();
        t.stop();
        assert_eq!(t.position(), first);
        assert_eq!(t.state(), TransportState::Stopped);
    }

    #[test]
    fn test_loop_wrap_preserves_remainder() {
        let t = Transport::new();
        // Loop [2.0s, 6.0s) at 48 kHz.
        t.set_loop_region(96_000, 288_000);
        t.set_loop_enabled(true);
        t.seek(287_000);
        let (pos, wrapped) = t.advance(2048);
        assert!(wrapped);
        // 287000 + 2048 = 289048; 289048 - 288000 = 1048 past the seam.
        assert_eq!(pos, 96_000 + 1048);
    }

    #[test]
    fn test_exact_boundary_lands_on_loop_start() {
        let t = Transport::new();
        t.set_loop_region(1000, 2000);
        t.set_loop_enabled(true);
        t.seek(1900);
        let (pos, wrapped) = t.advance(100);
        assert!(wrapped);
        assert_eq!(pos, 1000);
    }

    #[test]
    fn test_play_outside_loop_region_seeks_to_start() {
        let t = Transport::new();
        t.set_loop_region(1000, 2000);
        t.set_loop_enabled(true);
        t.seek(5000);
        t.play();
        assert_eq!(t.position(), 1000);

        // Inside the region playback resumes in place.
        t.pause();
        t.seek(1500);
        t.play();
        assert_eq!(t.position(), 1500);
    }
}
