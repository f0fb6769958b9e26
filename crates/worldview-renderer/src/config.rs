use crate::LayerKind;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Layers in draw order, bottom first.
    pub layers: Vec<LayerSettings>,
    pub elevation: ElevationRamp,
    /// Store finished rasters on disk so the next session can skip sampling.
    pub persist_rasters: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            layers: vec![
                LayerSettings::new(LayerKind::Classification, 1.0),
                LayerSettings::new(LayerKind::Elevation, 0.5),
                LayerSettings::new(LayerKind::SpecialChunks, 0.4),
                LayerSettings::new(LayerKind::Features, 1.0),
            ],
            elevation: ElevationRamp::default(),
            persist_rasters: true,
        }
    }
}

impl RenderConfig {
    pub fn opacity(&self, kind: LayerKind) -> f32 {
        self.layers
            .iter()
            .find(|l| l.kind == kind)
            .map_or(1.0, |l| l.opacity)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct LayerSettings {
    pub kind: LayerKind,
    /// In `[0, 1]`.
    pub opacity: f32,
}

impl LayerSettings {
    pub fn new(kind: LayerKind, opacity: f32) -> Self {
        Self { kind, opacity }
    }
}

/// Heights at or below `low` draw black and heights at or above `high` draw white.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ElevationRamp {
    pub low: i32,
    pub high: i32,
}

impl Default for ElevationRamp {
    fn default() -> Self {
        Self { low: 0, high: 256 }
    }
}

impl ElevationRamp {
    pub fn shade(&self, height: i32) -> u8 {
        let span = (self.high - self.low).max(1) as f32;
        let t = ((height - self.low) as f32 / span).clamp(0.0, 1.0);
        (t * 255.0).round() as u8
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shade_clamps_to_ramp() {
        let ramp = ElevationRamp { low: 64, high: 128 };
        assert_eq!(ramp.shade(0), 0);
        assert_eq!(ramp.shade(96), 128);
        assert_eq!(ramp.shade(500), 255);
    }
}
