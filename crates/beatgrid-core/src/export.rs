use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    thread::{self, JoinHandle},
};

use anyhow::{Context, Result, anyhow};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    graph::GraphBuilder,
    model::Project,
    renderer::{RenderOptions, render_offline},
    wav::encode_wav,
};

pub const DEFAULT_EXPORT_FILE_NAME: &str = "beatgrid_export.wav";

/// Allows one export at a time. Cloning shares the same slot.
#[derive(Debug, Clone, Default)]
pub struct ExportGate {
    in_flight: Arc<Mutex<Option<Uuid>>>,
}

impl ExportGate {
    #[must_use]
    pub fn try_acquire(&self) -> Option<ExportPermit> {
        let mut slot = self.in_flight.lock();
        if let Some(current) = *slot {
            debug!(%current, "export gate busy");
            return None;
        }

        let id = Uuid::new_v4();
        *slot = Some(id);
        Some(ExportPermit {
            id,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    #[must_use]
    pub fn current(&self) -> Option<Uuid> {
        *self.in_flight.lock()
    }
}

/// Held for the lifetime of one export; releases the gate when dropped.
#[derive(Debug)]
pub struct ExportPermit {
    id: Uuid,
    in_flight: Arc<Mutex<Option<Uuid>>>,
}

impl ExportPermit {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for ExportPermit {
    fn drop(&mut self) {
        let mut slot = self.in_flight.lock();
        if *slot == Some(self.id) {
            *slot = None;
        }
    }
}

pub fn render_wav_bytes(
    project: &Project,
    options: &RenderOptions,
    builder: &mut GraphBuilder,
) -> Result<Vec<u8>> {
    let buffer = render_offline(project, options, builder)?;
    encode_wav(&buffer)
}

/// Renders and writes a WAV file. Nothing is written when rendering fails.
#[instrument(skip(project, options, builder), fields(path = %path.display(), bpm = project.bpm))]
pub fn export_wav(
    project: &Project,
    path: &Path,
    options: &RenderOptions,
    builder: &mut GraphBuilder,
) -> Result<()> {
    let bytes = render_wav_bytes(project, options, builder)?;
    write_wav_file(path, &bytes)
}

/// Writes already-encoded WAV bytes, creating parent directories.
pub fn write_wav_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create wav output directory: {}",
                parent.display()
            )
        })?;
    }
    fs::write(path, bytes)
        .with_context(|| format!("failed to write wav file: {}", path.display()))?;

    info!(bytes = bytes.len(), "wav export completed");
    Ok(())
}

#[must_use]
pub fn default_export_path(dir: &Path) -> PathBuf {
    dir.join(DEFAULT_EXPORT_FILE_NAME)
}

/// Export running on a worker thread. The gate stays claimed until the
/// worker finishes.
#[derive(Debug)]
pub struct ExportJob {
    id: Uuid,
    handle: JoinHandle<Result<Vec<u8>>>,
}

impl ExportJob {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) -> Result<Vec<u8>> {
        let id = self.id;
        self.handle
            .join()
            .map_err(|_| anyhow!("export worker {id} panicked"))?
    }
}

/// Starts rendering `project` on its own thread. The caller hands over a
/// snapshot, so later edits never reach an export in progress. The permit
/// moves to the worker and is released when it finishes.
#[instrument(skip(project, options, builder, permit), fields(bpm = project.bpm, export_id = %permit.id()))]
pub fn spawn_export(
    project: Project,
    options: RenderOptions,
    mut builder: GraphBuilder,
    permit: ExportPermit,
) -> ExportJob {
    let id = permit.id();

    let handle = thread::spawn(move || {
        let _permit = permit;
        let result = render_wav_bytes(&project, &options, &mut builder);
        match &result {
            Ok(bytes) => info!(%id, bytes = bytes.len(), "background export finished"),
            Err(error) => warn!(%id, ?error, "background export failed"),
        }
        result
    });

    info!(%id, "background export started");
    ExportJob { id, handle }
}
