//! Export pipeline: flatten every step sequentially and write numbered
//! images. One step at a time keeps peak memory at a single frame; a
//! progress callback lets a shell surface completion without threading.

use std::path::PathBuf;

use crate::{
    error::{StepdocError, StepdocResult},
    model::{MarkerAppearance, Project},
    render::{FlattenParams, SceneRenderer, flatten_step},
};

pub const WATERMARK_TEXT: &str = "Created with ClickStep Guide";

#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub out_dir: PathBuf,
    /// Stamp the attribution text bottom-right on every image.
    pub watermark: bool,
}

/// One baked step, yielded in order by [`flatten_all`].
pub struct FlattenedStep {
    pub image: image::RgbaImage,
    pub description: String,
}

/// Flatten every step sequentially, handing each result to `yield_step` as
/// it completes. Memory never holds more than one flattened frame.
pub fn flatten_all<F>(
    project: &Project,
    marker: &MarkerAppearance,
    watermark: bool,
    mut yield_step: F,
) -> StepdocResult<()>
where
    F: FnMut(usize, FlattenedStep) -> StepdocResult<()>,
{
    if project.steps.is_empty() {
        return Err(StepdocError::validation("nothing to export: no steps"));
    }
    let mut scene = SceneRenderer::new();
    for (idx, step) in project.steps.iter().enumerate() {
        let layers = project.layers_for_step(idx)?;
        let params = FlattenParams {
            marker,
            step_number: project.step_number(idx),
            crop: project.crop.as_ref(),
            watermark: watermark.then_some(WATERMARK_TEXT),
        };
        let image = flatten_step(&mut scene, &step.image, &layers, params)?;
        yield_step(
            idx,
            FlattenedStep {
                image,
                description: step.description.clone(),
            },
        )?;
    }
    Ok(())
}

/// Export every step as `step_NN.png` under `out_dir`. `progress` is called
/// after each completed step with (done, total). Returns the written paths
/// in step order.
#[tracing::instrument(skip_all, fields(steps = project.steps.len()))]
pub fn export_images<F>(
    project: &Project,
    marker: &MarkerAppearance,
    opts: &ExportOptions,
    mut progress: F,
) -> StepdocResult<Vec<PathBuf>>
where
    F: FnMut(usize, usize),
{
    std::fs::create_dir_all(&opts.out_dir)
        .map_err(|e| StepdocError::render(format!("create export dir: {e}")))?;

    let total = project.steps.len();
    let mut written = Vec::with_capacity(total);
    flatten_all(project, marker, opts.watermark, |idx, flat| {
        let path = opts.out_dir.join(format!("step_{:02}.png", idx + 1));
        flat.image
            .save(&path)
            .map_err(|e| StepdocError::render(format!("write {}: {e}", path.display())))?;
        tracing::info!(step = idx + 1, path = %path.display(), "exported step");
        written.push(path);
        progress(idx + 1, total);
        Ok(())
    })?;
    Ok(written)
}
