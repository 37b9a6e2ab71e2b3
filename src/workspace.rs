use crate::error::PipelineError;
use crate::metadata::WorkspaceSession;
use crate::pipeline::build_and_install;
use crate::runner::CommandRunner;
use crate::toolchain::{DecodeOptions, Toolchain};
use crate::ui::{self, Step};
use crate::vcs::{Repository, INIT_CHECKPOINT, MITM_CHECKPOINT};
use futures_util::StreamExt;
use log::info;

pub const DECODE_STEP: &str = "Decode APK";
pub const GIT_INIT_STEP: &str = "Init git project";
pub const MITM_STEP: &str = "Prepare for MITM";
pub const EDITOR_STEP: &str = "Open in Editor";
pub const FIRST_BUILD_STEP: &str = "Perform first build & install";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preparation {
    /// The workspace was decoded, patched and built just now.
    Initialized,
    /// An existing workspace was found and reused as is.
    Reused,
}

/// Make sure the session's workspace exists and carries both checkpoints.
///
/// An existing root is never decoded again. It is only checked for the
/// `init` and `mitm` tags; a root without them was left behind by an
/// interrupted initialization and is reported rather than repaired.
pub async fn prepare<R: CommandRunner>(
    tools: &Toolchain<'_, R>,
    session: &WorkspaceSession,
    options: DecodeOptions,
) -> Result<Preparation, PipelineError> {
    let root = &session.paths.root;
    if root.exists() {
        info!("Workspace {} already exists, skipping init", root.display());
        let missing = Repository::new(tools, root)
            .missing_checkpoints(&[INIT_CHECKPOINT, MITM_CHECKPOINT])
            .await?;
        if !missing.is_empty() {
            return Err(PipelineError::IncompleteWorkspace {
                root: root.clone(),
                missing,
            });
        }
        return Ok(Preparation::Reused);
    }

    initialize(tools, session, options).await?;
    Ok(Preparation::Initialized)
}

/// Decode, checkpoint, patch, checkpoint, open the editor and build once.
pub async fn initialize<R: CommandRunner>(
    tools: &Toolchain<'_, R>,
    session: &WorkspaceSession,
    options: DecodeOptions,
) -> Result<(), PipelineError> {
    let root = &session.paths.root;
    let repo = Repository::new(tools, root);

    ui::step(
        DECODE_STEP,
        tools.run(
            DECODE_STEP,
            &tools.decode_invocation(&session.apk_path, root, options),
        ),
    )
    .await?;

    ui::step(GIT_INIT_STEP, async {
        repo.init(GIT_INIT_STEP).await?;
        repo.checkpoint(GIT_INIT_STEP, INIT_CHECKPOINT, "init project")
            .await
    })
    .await?;

    let step = Step::start(MITM_STEP);
    match apply_mitm_patches(tools, &repo, session, &step).await {
        Ok(lines) => {
            step.finish();
            info!("MITM patcher reported {lines} line(s)");
        }
        Err(e) => {
            step.fail();
            return Err(e);
        }
    }

    ui::step(EDITOR_STEP, tools.open_editor(root)).await?;

    ui::info(FIRST_BUILD_STEP);
    build_and_install(tools, session)
        .await
        .map_err(|e| PipelineError::tool(FIRST_BUILD_STEP, e.to_string()))?;
    ui::success("APK installed");
    Ok(())
}

/// Drain the patcher's feed to the end, then checkpoint the result.
async fn apply_mitm_patches<R: CommandRunner>(
    tools: &Toolchain<'_, R>,
    repo: &Repository<'_, '_, R>,
    session: &WorkspaceSession,
    step: &Step,
) -> Result<usize, PipelineError> {
    let mut feed = tools.mitm_feed(&session.paths.root)?;
    let mut count = 0;
    while let Some(line) = feed.next().await {
        let line = line.map_err(|e| PipelineError::tool(MITM_STEP, e.to_string()))?;
        step.output(&line);
        count += 1;
    }
    repo.checkpoint(MITM_STEP, MITM_CHECKPOINT, "mitm").await?;
    Ok(count)
}
