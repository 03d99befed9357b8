//! Live/offline parity fingerprints.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use crate::{
    graph::GraphBuilder,
    model::Project,
    renderer::{LiveOptions, RenderOptions, capture_live, render_offline},
    sink::RenderedBuffer,
    wav::quantize_sample,
};

const PARITY_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParityReport {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub bpm: f64,
    pub sample_rate: u32,
    pub frame_count: usize,
    pub noise_seed: u64,
    pub offline_hash: String,
    pub live_hash: String,
    pub matches: bool,
}

/// Renders `project` both ways from the same noise seed and fingerprints the
/// quantized output of each.
#[instrument(skip(project, options, live), fields(bpm = project.bpm))]
pub fn generate_parity_report(
    project: &Project,
    options: &RenderOptions,
    live: &LiveOptions,
    seed: u64,
) -> Result<ParityReport> {
    let offline = render_offline(project, options, &mut GraphBuilder::seeded(seed))
        .context("offline render failed")?;
    let captured = capture_live(project, options, live, &mut GraphBuilder::seeded(seed))
        .context("live capture failed")?;

    let offline_hash = fingerprint(&offline);
    let live_hash = fingerprint(&captured);
    let matches = offline.frame_count() == captured.frame_count() && offline_hash == live_hash;
    if matches {
        info!(%offline_hash, "live and offline renders match");
    } else {
        warn!(%offline_hash, %live_hash, "live and offline renders differ");
    }

    Ok(ParityReport {
        schema_version: PARITY_SCHEMA_VERSION,
        generated_at: Utc::now(),
        bpm: project.bpm,
        sample_rate: options.sample_rate,
        frame_count: offline.frame_count(),
        noise_seed: seed,
        offline_hash,
        live_hash,
        matches,
    })
}

/// SHA-256 over the 16-bit samples the encoder would write.
#[must_use]
pub fn fingerprint(buffer: &RenderedBuffer) -> String {
    let mut hasher = Sha256::new();
    for sample in buffer.interleaved() {
        hasher.update(quantize_sample(sample).to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

pub fn read_parity_report(path: &Path) -> Result<ParityReport> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read parity report: {}", path.display()))?;
    serde_json::from_slice(&bytes).context("failed to parse parity report json")
}

pub fn write_parity_report(path: &Path, report: &ParityReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parity directory: {}", parent.display()))?;
    }

    let json = serde_json::to_vec_pretty(report).context("failed to encode parity report json")?;
    fs::write(path, json)
        .with_context(|| format!("failed to write parity report: {}", path.display()))?;
    Ok(())
}
