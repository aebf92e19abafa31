use crate::midi::{MidiEvent, ScheduledNote};

/// Pre-allocated scratch for the audio callback. Tracks render one at a
/// time into `track_buf` and are summed into `master_mix`; event vectors are
/// reused with their capacity kept across buffers.
pub struct AudioBuffers {
    pub track_buf: Vec<f32>,
    pub master_mix: Vec<f32>,
    pub events: Vec<MidiEvent>,
    pub notes: Vec<ScheduledNote>,
}

impl AudioBuffers {
    pub fn new(max_buffer_size: usize) -> Self {
        Self {
            track_buf: vec![0.0; max_buffer_size * 2],
            master_mix: vec![0.0; max_buffer_size * 2],
            events: Vec::with_capacity(256),
            notes: Vec::with_capacity(128),
        }
    }

    /// Resize for this buffer (keeps capacity) and clear the master sum.
    pub fn prepare(&mut self, frames: usize) {
        if self.master_mix.len() != frames * 2 {
            self.master_mix.resize(frames * 2, 0.0);
        }
        self.master_mix.fill(0.0);
        if self.track_buf.len() != frames * 2 {
            self.track_buf.resize(frames * 2, 0.0);
        }
    }

    pub fn clear_track(&mut self) {
        self.track_buf.fill(0.0);
        self.events.clear();
        self.notes.clear();
    }

    /// Sum the track scratch into the master, applying pan and a linear
    /// gain ramp across the buffer so volume changes never click.
    /// Positive pan attenuates the left channel, negative the right.
    pub fn mix_into_master(
        track_buf: &[f32],
        master_mix: &mut [f32],
        frames: usize,
        gain_start: f32,
        gain_end: f32,
        pan: f32,
    ) {
        let step = if frames > 0 {
            (gain_end - gain_start) / frames as f32
        } else {
            0.0
        };
        let mut gain = gain_start;
        for i in 0..frames {
            let mut l_gain = gain;
            let mut r_gain = gain;
            if pan > 0.0 {
                l_gain *= 1.0 - pan;
            } else if pan < 0.0 {
                r_gain *= 1.0 + pan;
            }
            master_mix[i * 2] += track_buf[i * 2] * l_gain;
            master_mix[i * 2 + 1] += track_buf[i * 2 + 1] * r_gain;
            gain += step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pan_law() {
        let track = vec![1.0f32; 8];
        let mut master = vec![0.0f32; 8];
        AudioBuffers::mix_into_master(&track, &mut master, 4, 1.0, 1.0, 0.5);
        // Hard-right-leaning pan halves the left channel.
        assert!((master[0] - 0.5).abs() < 1e-6);
        assert!((master[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_gain_ramp_reaches_target() {
        let track = vec![1.0f32; 200];
        let mut master = vec![0.0f32; 200];
        AudioBuffers::mix_into_master(&track, &mut master, 100, 0.0, 1.0, 0.0);
        assert!(master[0] < 0.02);
        assert!(master[198] > 0.97);
    }

    #[test]
    fn test_prepare_keeps_capacity() {
        let mut bufs = AudioBuffers::new(2048);
        let cap = bufs.master_mix.capacity();
        bufs.prepare(256);
        assert_eq!(bufs.master_mix.len(), 512);
        assert!(bufs.master_mix.capacity() >= cap.min(2048 * 2));
    }
}
