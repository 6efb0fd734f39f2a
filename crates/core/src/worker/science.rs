//! The ordered list of science tools a scene runs through.
//!
//! The tools themselves are opaque: each step is a typed command whose only
//! contract is its exit code. Which steps run depends on the sensor and on
//! the products requested.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use super::{StagedInput, WorkerError};
use crate::options::{OutputFormat, ProductOptions, SPECTRAL_INDICES};
use crate::process::{CommandRunner, CommandSpec};

/// Environment variable the tools read their ancillary data location from.
pub const ANCILLARY_ENV: &str = "ANCILLARY_DATA_DIR";

/// Cloud pixel ceiling passed to `cfmask`.
const CFMASK_MAX_CLOUD_PIXELS: &str = "5000000";

/// Products that need surface reflectance computed.
const NEEDS_SR: &[&str] = &[
    "include_sr",
    "include_sr_browse",
    "include_sr_nbr",
    "include_sr_nbr2",
    "include_sr_ndvi",
    "include_sr_ndmi",
    "include_sr_savi",
    "include_sr_msavi",
    "include_sr_evi",
    "include_dswe",
];

/// Products that need the LEDAPS chain at all (TOA or SR).
const NEEDS_LEDAPS: &[&str] = &[
    "include_sr_toa",
    "include_sr_thermal",
    "include_sr",
    "include_dswe",
    "include_cfmask",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ScienceStep {
    pub name: &'static str,
    pub spec: CommandSpec,
}

/// Shared settings for every step.
#[derive(Debug, Clone)]
pub struct ScienceContext {
    pub work_dir: PathBuf,
    pub ancillary_path: PathBuf,
    pub timeout: Duration,
}

impl ScienceContext {
    fn command(&self, program: &str) -> CommandSpec {
        CommandSpec::new(program)
            .current_dir(&self.work_dir)
            .env(ANCILLARY_ENV, self.ancillary_path.to_string_lossy())
            .timeout(self.timeout)
    }
}

/// Build the steps for a staged scene.
pub fn plan(
    input: &StagedInput,
    options: &ProductOptions,
    ctx: &ScienceContext,
) -> Vec<ScienceStep> {
    let mut steps = Vec::new();

    let xml = match input {
        StagedInput::Landsat { metadata } => {
            let xml = replace_suffix(metadata, "_MTL.txt", ".xml");
            let stem = replace_suffix(&xml, ".xml", "");
            let dem = format!("{}_dem.img", stem);

            let mut ingest = ctx
                .command("convert_lpgs_to_espa")
                .args(["--mtl", metadata.as_str(), "--xml", xml.as_str()]);
            if !options.flag("include_source_data") {
                ingest = ingest.arg("--del_src_files");
            }
            steps.push(ScienceStep { name: "ingest", spec: ingest });

            if options.any_flag(&["include_dem", "include_dswe"]) {
                steps.push(ScienceStep {
                    name: "elevation",
                    spec: ctx
                        .command("do_create_dem.py")
                        .args(["--mtl", metadata.as_str(), "--dem", dem.as_str()]),
                });
            }

            if options.any_flag(NEEDS_LEDAPS) {
                let process_sr = if options.any_flag(NEEDS_SR) { "True" } else { "False" };
                steps.push(ScienceStep {
                    name: "surface reflectance",
                    spec: ctx
                        .command("do_ledaps.py")
                        .args(["--xml", xml.as_str(), "--process_sr", process_sr]),
                });
            }

            if options.any_flag(&["include_cfmask", "include_dswe", "include_sr"]) {
                steps.push(ScienceStep {
                    name: "cloud mask",
                    spec: ctx.command("cfmask").args([
                        "--verbose",
                        "--max_cloud_pixels",
                        CFMASK_MAX_CLOUD_PIXELS,
                        "--xml",
                        xml.as_str(),
                    ]),
                });
            }

            let indices: Vec<&str> = SPECTRAL_INDICES
                .iter()
                .filter(|(option, _)| options.flag(option))
                .map(|(_, switch)| *switch)
                .collect();
            if !indices.is_empty() {
                steps.push(ScienceStep {
                    name: "spectral indices",
                    spec: ctx
                        .command("do_spectral_indices.py")
                        .args(["--xml", xml.as_str()])
                        .args(indices),
                });
            }

            if options.flag("include_dswe") {
                steps.push(ScienceStep {
                    name: "water extent",
                    spec: ctx.command("do_dynamic_surface_water_extent.py").args([
                        "--xml",
                        xml.as_str(),
                        "--dem",
                        dem.as_str(),
                        "--verbose",
                    ]),
                });
            }
            xml
        }
        StagedInput::Modis { hdf } => {
            let xml = replace_suffix(hdf, ".hdf", ".xml");
            let mut ingest = ctx
                .command("convert_modis_to_espa")
                .args(["--hdf", hdf.as_str(), "--xml", xml.as_str()]);
            if !options.flag("include_source_data") {
                ingest = ingest.arg("--del_src_files");
            }
            steps.push(ScienceStep { name: "ingest", spec: ingest });
            xml
        }
    };

    let stem = replace_suffix(&xml, ".xml", "");
    match options.output_format() {
        OutputFormat::Envi => {}
        OutputFormat::Gtiff => steps.push(ScienceStep {
            name: "reformat",
            spec: ctx.command("convert_espa_to_gtif").args([
                "--del_src_files",
                "--xml",
                xml.as_str(),
                "--gtif",
                stem.as_str(),
            ]),
        }),
        OutputFormat::HdfEos2 => {
            let hdf = format!("{}.hdf", stem);
            steps.push(ScienceStep {
                name: "reformat",
                spec: ctx.command("convert_espa_to_hdf").args([
                    "--del_src_files",
                    "--xml",
                    xml.as_str(),
                    "--hdf",
                    hdf.as_str(),
                ]),
            })
        }
    }

    steps
}

/// Run `steps` in order, stopping at the first failure.
pub async fn run_plan(
    runner: &dyn CommandRunner,
    steps: &[ScienceStep],
    scene_id: &str,
) -> Result<(), WorkerError> {
    for step in steps {
        info!(scene_id, step = step.name, command = %step.spec, "Running science step");
        runner
            .run(&step.spec)
            .await
            .and_then(|output| output.check(step.spec.program_name()))
            .map_err(|source| WorkerError::Science {
                step: step.name,
                source,
            })?;
    }
    Ok(())
}

/// Move every regular file the tools left in `work` into `output`.
pub async fn collect_output(work: &Path, output: &Path) -> Result<usize, WorkerError> {
    let mut entries = tokio::fs::read_dir(work)
        .await
        .map_err(|e| WorkerError::io(format!("reading {}", work.display()), e))?;
    let mut moved = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| WorkerError::io(format!("reading {}", work.display()), e))?
    {
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        let target = output.join(entry.file_name());
        tokio::fs::rename(entry.path(), &target)
            .await
            .map_err(|e| WorkerError::io(format!("moving {} to output", entry.path().display()), e))?;
        moved += 1;
    }
    Ok(moved)
}

fn replace_suffix(name: &str, suffix: &str, replacement: &str) -> String {
    match name.strip_suffix(suffix) {
        Some(stem) => format!("{}{}", stem, replacement),
        None => format!("{}{}", name, replacement),
    }
}
