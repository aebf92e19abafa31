use serde::{Deserialize, Serialize};

/// Effect kinds the control layer can instantiate directly.
/// Plugins are installed through their own entry point since they carry a
/// caller-provided processing unit rather than a parameter struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    Eq,
    Compressor,
    Reverb,
    Delay,
    Limiter,
    Chorus,
}

/// Four-band EQ: low shelf, two parametric mids, high shelf.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqParams {
    pub low_freq: f32,
    pub low_gain_db: f32,
    pub mid1_freq: f32,
    pub mid1_gain_db: f32,
    pub mid1_q: f32,
    pub mid2_freq: f32,
    pub mid2_gain_db: f32,
    pub mid2_q: f32,
    pub high_freq: f32,
    pub high_gain_db: f32,
}

impl Default for EqParams {
    fn default() -> Self {
        Self {
            low_freq: 100.0,
            low_gain_db: 0.0,
            mid1_freq: 500.0,
            mid1_gain_db: 0.0,
            mid1_q: 1.0,
            mid2_freq: 2000.0,
            mid2_gain_db: 0.0,
            mid2_q: 1.0,
            high_freq: 8000.0,
            high_gain_db: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorParams {
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub makeup_gain_db: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            threshold_db: -20.0,
            ratio: 4.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            makeup_gain_db: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverbParams {
    pub room_size: f32,
    pub damping: f32,
    pub wet_dry_mix: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            room_size: 0.5,
            damping: 0.5,
            wet_dry_mix: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayParams {
    pub delay_time_ms: f32,
    /// 0.0 to 0.99
    pub feedback: f32,
    pub wet_dry_mix: f32,
}

impl Default for DelayParams {
    fn default() -> Self {
        Self {
            delay_time_ms: 500.0,
            feedback: 0.4,
            wet_dry_mix: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimiterParams {
    pub threshold_db: f32,
    pub release_ms: f32,
}

impl Default for LimiterParams {
    fn default() -> Self {
        Self {
            threshold_db: -0.1,
            release_ms: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChorusParams {
    pub rate_hz: f32,
    pub depth: f32,
    pub wet_dry_mix: f32,
}

impl Default for ChorusParams {
    fn default() -> Self {
        Self {
            rate_hz: 1.5,
            depth: 0.5,
            wet_dry_mix: 0.5,
        }
    }
}

/// Closed tagged variant over every effect a chain slot can hold.
/// The `Plugin` variant carries the opaque state blob (base64) supplied by
/// the hosting layer; the engine never parses it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EffectParams {
    Eq(EqParams),
    Compressor(CompressorParams),
    Reverb(ReverbParams),
    Delay(DelayParams),
    Limiter(LimiterParams),
    Chorus(ChorusParams),
    Plugin { state: String },
}

impl EffectParams {
    pub fn for_kind(kind: EffectKind) -> Self {
        match kind {
            EffectKind::Eq => EffectParams::Eq(EqParams::default()),
            EffectKind::Compressor => EffectParams::Compressor(CompressorParams::default()),
            EffectKind::Reverb => EffectParams::Reverb(ReverbParams::default()),
            EffectKind::Delay => EffectParams::Delay(DelayParams::default()),
            EffectKind::Limiter => EffectParams::Limiter(LimiterParams::default()),
            EffectKind::Chorus => EffectParams::Chorus(ChorusParams::default()),
        }
    }

    pub fn is_limiter(&self) -> bool {
        matches!(self, EffectParams::Limiter(_))
    }
}
