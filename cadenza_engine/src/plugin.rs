use crate::midi::MidiEvent;

/// Opaque third-party processing unit hosted in an effect chain.
///
/// The engine supplies audio and MIDI buffers at fixed points in its
/// processing order and round-trips an opaque state blob for persistence;
/// it never parses the blob.
pub trait PluginUnit: Send {
    /// Process an interleaved stereo buffer in place. `midi` carries the
    /// track's merged events for this buffer, sorted by offset.
    fn process(&mut self, buf: &mut [f32], frames: usize, sample_rate: f32, midi: &[MidiEvent]);

    /// Serialize internal state. Returned bytes are persisted verbatim.
    fn state(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Restore state previously returned by `state`. Unknown or corrupt
    /// blobs should be ignored, not panicked on.
    fn set_state(&mut self, _data: &[u8]) {}
}

/// Trivial gain plugin, used by tests and as a hosting reference.
pub struct GainPlugin {
    pub gain: f32,
}

impl GainPlugin {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }
}

impl PluginUnit for GainPlugin {
    fn process(&mut self, buf: &mut [f32], frames: usize, _sample_rate: f32, _midi: &[MidiEvent]) {
        for sample in buf[..frames * 2].iter_mut() {
            *sample *= self.gain;
        }
    }

    fn state(&self) -> Vec<u8> {
        self.gain.to_le_bytes().to_vec()
    }

    fn set_state(&mut self, data: &[u8]) {
        if let Ok(bytes) = <[u8; 4]>::try_from(data) {
            self.gain = f32::from_le_bytes(bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_plugin_state_roundtrip() {
        let mut a = GainPlugin::new(0.25);
        let blob = a.state();
        let mut b = GainPlugin::new(1.0);
        b.set_state(&blob);
        assert_eq!(b.gain, 0.25);

        let mut buf = vec![1.0f32; 8];
        b.process(&mut buf, 4, 48000.0, &[]);
        assert!(buf.iter().all(|s| (*s - 0.25).abs() < 1e-6));
    }
}
