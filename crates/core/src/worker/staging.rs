use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use super::{WorkDir, WorkerError};
use crate::process::{CommandRunner, CommandSpec};
use crate::sensor::SceneId;

/// What staging left in the work directory, by file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedInput {
    /// Unpacked Landsat product; `metadata` is its `_MTL.txt` file.
    Landsat { metadata: String },
    Modis { hdf: String },
}

/// Copy a scene's input from the local cache into `dir` and unpack it.
///
/// A missing cache root is a node problem and fails the scene with an
/// error; a missing scene file is reported as [`WorkerError::InputMissing`].
pub async fn stage_input(
    runner: &dyn CommandRunner,
    input_dir: &Path,
    scene: &SceneId,
    dir: &WorkDir,
    timeout: Duration,
) -> Result<StagedInput, WorkerError> {
    if !tokio::fs::try_exists(input_dir).await.unwrap_or(false) {
        return Err(WorkerError::InputRootMissing(input_dir.to_path_buf()));
    }

    let source = input_dir.join(scene.input_relative_path());
    if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
        return Err(WorkerError::InputMissing {
            scene: scene.to_string(),
            path: source,
        });
    }
    let name = file_name(&source)?;

    match scene {
        SceneId::Landsat(_) => {
            let staged = dir.stage().join(&name);
            copy(&source, &staged).await?;

            let spec = CommandSpec::new("tar")
                .arg("-xzf")
                .path_arg(&staged)
                .arg("-C")
                .path_arg(&dir.work())
                .timeout(timeout);
            runner
                .run(&spec)
                .await
                .and_then(|output| output.check("tar"))
                .map_err(WorkerError::Staging)?;

            let metadata = find_metadata(&dir.work()).await?.ok_or_else(|| {
                WorkerError::InputIncomplete {
                    scene: scene.to_string(),
                    what: "_MTL.txt metadata",
                }
            })?;
            info!(scene_id = %scene, metadata = %metadata, "Landsat input staged");
            Ok(StagedInput::Landsat { metadata })
        }
        SceneId::Modis(_) => {
            copy(&source, &dir.work().join(&name)).await?;
            info!(scene_id = %scene, hdf = %name, "MODIS input staged");
            Ok(StagedInput::Modis { hdf: name })
        }
    }
}

async fn copy(from: &Path, to: &Path) -> Result<(), WorkerError> {
    debug!(from = %from.display(), to = %to.display(), "Copying input");
    tokio::fs::copy(from, to)
        .await
        .map(|_| ())
        .map_err(|e| WorkerError::io(format!("copying {} to {}", from.display(), to.display()), e))
}

fn file_name(path: &Path) -> Result<String, WorkerError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| WorkerError::InvalidPath(path.display().to_string()))
}

async fn find_metadata(work: &Path) -> Result<Option<String>, WorkerError> {
    let mut entries = tokio::fs::read_dir(work)
        .await
        .map_err(|e| WorkerError::io(format!("reading {}", work.display()), e))?;
    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| WorkerError::io(format!("reading {}", work.display()), e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.to_lowercase().ends_with("_mtl.txt") {
            found.push(name);
        }
    }
    found.sort();
    Ok(found.into_iter().next())
}
