use std::path::Path;
use std::time::Instant;

use anyhow::Context as _;
use serde::Serialize;

use crate::error::SortlastResult;

/// Wall-clock scope timer.
#[derive(Clone, Copy, Debug)]
pub struct Stopwatch(Instant);

impl Stopwatch {
    pub fn start() -> Self {
        Self(Instant::now())
    }

    pub fn seconds(&self) -> f64 {
        self.0.elapsed().as_secs_f64()
    }
}

/// One run's timing and configuration record, written by rank 0.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimingReport {
    pub composite_algorithm: String,
    pub num_processes: usize,
    pub image_width: u32,
    pub image_height: u32,
    pub pixel_format: String,
    pub geometry: String,
    pub geometry_distribution: String,
    pub rendering_order_dependent: bool,
    pub num_triangles: usize,
    pub paint_seconds: f64,
    pub composite_seconds: f64,
    pub total_seconds: f64,
}

impl TimingReport {
    pub fn write_json(&self, path: &Path) -> SortlastResult<()> {
        let json = serde_json::to_string_pretty(self)
            .with_context(|| "serialize timing report".to_string())?;
        std::fs::write(path, json)
            .with_context(|| format!("write timing report '{}'", path.display()))?;
        Ok(())
    }
}
