use crate::error::PipelineError;
use crate::metadata::WorkspaceSession;
use crate::runner::CommandRunner;
use crate::toolchain::Toolchain;
use crate::vcs::{Repository, MITM_CHECKPOINT};
use std::path::PathBuf;

pub const EXTRACT_STEP: &str = "Extracting patch";

/// Commit outstanding edits and write everything since the `mitm`
/// checkpoint to `<output>/<name>/<version>.patch`.
pub async fn extract_patch<R: CommandRunner>(
    tools: &Toolchain<'_, R>,
    session: &WorkspaceSession,
) -> Result<PathBuf, PipelineError> {
    let identity = &session.identity;
    let repo = Repository::new(tools, &session.paths.root);

    repo.commit_all(
        EXTRACT_STEP,
        &format!("modded {} {}", identity.name, identity.version),
    )
    .await?;

    let patch_path = tools.config.patch_file(&identity.name, &identity.version);
    if let Some(dir) = patch_path.parent() {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            PipelineError::tool(EXTRACT_STEP, format!("creating {}: {e}", dir.display()))
        })?;
    }

    let diff = repo.diff_since(EXTRACT_STEP, MITM_CHECKPOINT).await?;
    tokio::fs::write(&patch_path, diff).await.map_err(|e| {
        PipelineError::tool(EXTRACT_STEP, format!("writing {}: {e}", patch_path.display()))
    })?;

    Ok(patch_path)
}
