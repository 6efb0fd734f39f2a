//! Batch file construction.

use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{error, warn};

use super::{BatchJob, DispatchError};
use crate::record::{RecordCodec, RecordError, WorkRecord};
use crate::sensor::SceneId;
use crate::status::{SceneRef, SceneToProcess};

/// `<YYYYMMDD-HHMMSS.ffffff>-<pid>-reprocess`
pub fn job_name(at: DateTime<Utc>, pid: u32) -> String {
    format!("{}-{}-reprocess", at.format("%Y%m%d-%H%M%S%.6f"), pid)
}

/// A batch file on disk and the scenes it carries.
#[derive(Debug)]
pub struct Batch {
    pub job: BatchJob,
    pub scenes: Vec<SceneRef>,
    /// Scenes left out of the batch and why.
    pub skipped: Vec<(SceneRef, RecordError)>,
}

/// Write one padded record per scene to `<batch_dir>/<job_name>.txt`.
///
/// The file must not exist yet. Scenes whose record cannot be built are
/// skipped, not fatal.
pub async fn write_batch(
    batch_dir: &Path,
    job_name: &str,
    scenes: &[SceneToProcess],
    codec: &RecordCodec,
    callback_address: &str,
) -> Result<Batch, DispatchError> {
    let mut lines = String::with_capacity(scenes.len() * codec.block_size());
    let mut included = Vec::with_capacity(scenes.len());
    let mut skipped = Vec::new();

    for scene in scenes {
        let scene_ref = scene.scene_ref();
        if let Err(e) = SceneId::parse(&scene.scene_id) {
            warn!(order_id = %scene.order_id, scene_id = %scene.scene_id, error = %e, "Skipping unrecognized scene");
            skipped.push((scene_ref, RecordError::InvalidScene(e)));
            continue;
        }

        let record = WorkRecord::new(
            &scene.order_id,
            &scene.scene_id,
            scene.options.clone(),
            callback_address,
        );
        match codec.encode(&record) {
            Ok(line) => {
                lines.push_str(&line);
                included.push(scene_ref);
            }
            Err(e @ RecordError::InvalidBlockSize(_)) => return Err(e.into()),
            Err(e) => {
                error!(order_id = %scene.order_id, scene_id = %scene.scene_id, error = %e, "Record cannot be encoded");
                skipped.push((scene_ref, e));
            }
        }
    }

    let batch_file = batch_dir.join(format!("{}.txt", job_name));
    let write_err = |source| DispatchError::BatchFile {
        path: batch_file.clone(),
        source,
    };

    tokio::fs::create_dir_all(batch_dir).await.map_err(write_err)?;
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&batch_file)
        .await
        .map_err(write_err)?;
    file.write_all(lines.as_bytes()).await.map_err(write_err)?;
    file.flush().await.map_err(write_err)?;

    Ok(Batch {
        job: BatchJob {
            name: job_name.to_string(),
            batch_file: batch_file.clone(),
            record_count: included.len(),
        },
        scenes: included,
        skipped,
    })
}
