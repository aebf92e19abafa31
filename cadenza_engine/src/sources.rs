use std::collections::HashMap;
use std::sync::Arc;

/// A decoded audio source: interleaved stereo samples, immutable once
/// loaded, shared by every clip that references it.
pub struct AudioSource {
    pub path: String,
    pub data: Arc<Vec<f32>>,
    pub sample_rate: u32,
}

impl AudioSource {
    pub fn frames(&self) -> u64 {
        (self.data.len() / 2) as u64
    }

    /// Wrap already-decoded interleaved stereo samples (recordings).
    pub fn from_data(path: String, data: Vec<f32>, sample_rate: u32) -> Arc<Self> {
        Arc::new(Self {
            path,
            data: Arc::new(data),
            sample_rate,
        })
    }
}

/// Control-thread cache of decoded sources, keyed by path so repeated loads
/// share one buffer. Decoding happens here, never on the audio thread.
pub struct SourcePool {
    sources: HashMap<String, Arc<AudioSource>>,
}

impl SourcePool {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    pub fn load(&mut self, path: &str) -> Result<Arc<AudioSource>, anyhow::Error> {
        if let Some(source) = self.sources.get(path) {
            return Ok(source.clone());
        }

        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let raw: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => {
                reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>()?
            }
            hound::SampleFormat::Int => {
                let max_val = 2.0_f32.powi(spec.bits_per_sample as i32 - 1);
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|x| x as f32 / max_val))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        // Normalize channel layout to interleaved stereo.
        let channels = spec.channels as usize;
        let data = match channels {
            0 => Vec::new(),
            1 => raw.iter().flat_map(|&s| [s, s]).collect(),
            2 => raw,
            _ => raw
                .chunks(channels)
                .flat_map(|frame| [frame[0], frame[1]])
                .collect(),
        };

        let source = Arc::new(AudioSource {
            path: path.to_string(),
            data: Arc::new(data),
            sample_rate: spec.sample_rate,
        });
        eprintln!(
            "[SourcePool] Loaded {}: {} frames @ {} Hz",
            path,
            source.frames(),
            source.sample_rate
        );
        self.sources.insert(path.to_string(), source.clone());
        Ok(source)
    }

    pub fn insert(&mut self, source: Arc<AudioSource>) {
        self.sources.insert(source.path.clone(), source);
    }

    pub fn get(&self, path: &str) -> Option<Arc<AudioSource>> {
        self.sources.get(path).cloned()
    }
}

impl Default for SourcePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_data_frame_count() {
        let source = AudioSource::from_data("[rec]".into(), vec![0.0; 960], 48000);
        assert_eq!(source.frames(), 480);
    }

    #[test]
    fn test_pool_insert_and_get() {
        let mut pool = SourcePool::new();
        let source = AudioSource::from_data("take_1".into(), vec![0.1; 4], 48000);
        pool.insert(source);
        assert!(pool.get("take_1").is_some());
        assert!(pool.get("missing").is_none());
    }
}
