use crate::device::select_device;
use crate::error::PipelineError;
use crate::metadata::WorkspaceSession;
use crate::runner::CommandRunner;
use crate::toolchain::Toolchain;
use crate::ui;
use log::info;

pub const BUILD_STEP: &str = "Building APK";
pub const SIGN_STEP: &str = "Signing APK";
pub const DEVICE_STEP: &str = "Checking for connected devices";
pub const INSTALL_STEP: &str = "Installing APK";
pub const LAUNCH_STEP: &str = "Launching app";

/// Recompile, sign, install and launch the workspace. Stops at the first
/// failing step. Returns the device the app was installed on.
pub async fn build_and_install<R: CommandRunner>(
    tools: &Toolchain<'_, R>,
    session: &WorkspaceSession,
) -> Result<String, PipelineError> {
    let root = &session.paths.root;
    let artifact = &session.paths.dist_artifact;

    ui::step(BUILD_STEP, tools.run(BUILD_STEP, &tools.recompile_invocation(root))).await?;

    ui::step(SIGN_STEP, tools.run(SIGN_STEP, &tools.sign_invocation(artifact))).await?;

    let device = ui::step(DEVICE_STEP, select_device(tools, DEVICE_STEP)).await?;
    info!("Using device {device}");

    ui::step(
        INSTALL_STEP,
        tools.run(INSTALL_STEP, &tools.install_invocation(&device, artifact)),
    )
    .await?;

    ui::step(
        LAUNCH_STEP,
        tools.run(
            LAUNCH_STEP,
            &tools.launch_invocation(&device, &session.identity.name),
        ),
    )
    .await?;

    Ok(device)
}
