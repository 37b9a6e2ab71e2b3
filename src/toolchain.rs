use crate::config::ToolConfig;
use crate::error::PipelineError;
use crate::runner::{CommandOutput, CommandRunner, Invocation, LineFeed};
use std::path::Path;

/// Decode options passed through to apktool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    pub skip_resources: bool,
    pub skip_sources: bool,
}

/// Builds the command line for every external tool and runs it through the
/// configured runner.
pub struct Toolchain<'a, R> {
    pub config: &'a ToolConfig,
    pub runner: &'a R,
}

impl<'a, R: CommandRunner> Toolchain<'a, R> {
    pub fn new(config: &'a ToolConfig, runner: &'a R) -> Self {
        Self { config, runner }
    }

    /// Run `invocation` and turn a spawn error or non-zero exit into a
    /// failure of `step`.
    pub async fn run(
        &self,
        step: &str,
        invocation: &Invocation,
    ) -> Result<CommandOutput, PipelineError> {
        let output = self
            .runner
            .output(invocation)
            .await
            .map_err(|e| {
                let program = invocation.program.to_string_lossy();
                PipelineError::tool(step, format!("{program}: {e}"))
            })?;
        if !output.success {
            return Err(PipelineError::tool(step, output.failure_message()));
        }
        Ok(output)
    }

    fn jar(&self, jar: &Path) -> Invocation {
        Invocation::new(&self.config.java).arg("-jar").arg(jar)
    }

    /// `aapt dump badging`. The output is returned whatever the exit status,
    /// since the identity line is usually printed before any failure.
    pub async fn inspect(&self, apk: &Path) -> Result<CommandOutput, PipelineError> {
        let invocation = Invocation::new(&self.config.aapt)
            .args(["dump", "badging"])
            .arg(apk);
        self.runner.output(&invocation).await.map_err(|e| {
            PipelineError::tool("Get package info", format!("{}: {e}", self.config.aapt))
        })
    }

    pub fn decode_invocation(
        &self,
        apk: &Path,
        out: &Path,
        options: DecodeOptions,
    ) -> Invocation {
        let mut invocation = self.jar(&self.config.apktool_path);
        if options.skip_resources {
            invocation = invocation.arg("-r");
        }
        if options.skip_sources {
            invocation = invocation.arg("-s");
        }
        invocation
            .arg("d")
            .arg(apk)
            .arg("-o")
            .arg(out)
            .arg("--only-main-classes")
    }

    pub fn recompile_invocation(&self, root: &Path) -> Invocation {
        self.jar(&self.config.apktool_path)
            .arg("b")
            .arg(root)
            .arg("--use-aapt2")
    }

    pub fn sign_invocation(&self, artifact: &Path) -> Invocation {
        self.jar(&self.config.uber_apk_signer_path)
            .arg("-a")
            .arg(artifact)
            .args(["--allowResign", "--overwrite"])
    }

    pub fn merge_invocation(&self, xapk: &Path) -> Invocation {
        self.jar(&self.config.apk_editor_path)
            .args(["m", "-i"])
            .arg(xapk)
    }

    pub fn list_devices_invocation(&self) -> Invocation {
        Invocation::new(&self.config.adb).arg("devices")
    }

    pub fn install_invocation(&self, device: &str, artifact: &Path) -> Invocation {
        Invocation::new(&self.config.adb)
            .args(["-s", device, "install", "--bypass-low-target-sdk-block", "-r"])
            .arg(artifact)
    }

    /// One monkey event is enough to bring the launcher activity up.
    pub fn launch_invocation(&self, device: &str, package: &str) -> Invocation {
        Invocation::new(&self.config.adb)
            .args(["-s", device, "shell", "monkey", "-p", package, "1"])
    }

    pub fn editor_invocation(&self, root: &Path) -> Invocation {
        Invocation::new(&self.config.editor).arg(root)
    }

    pub fn mitm_invocation(&self, root: &Path) -> Result<Invocation, PipelineError> {
        let (program, args) = self
            .config
            .mitm_patcher
            .split_first()
            .ok_or_else(|| {
                PipelineError::tool("Prepare for MITM", "mitmPatcher is not configured")
            })?;
        Ok(Invocation::new(program).args(args).arg(root))
    }

    /// Start the interception patcher and hand back its progress feed.
    pub fn mitm_feed(&self, root: &Path) -> Result<LineFeed, PipelineError> {
        let invocation = self.mitm_invocation(root)?;
        self.runner
            .lines(&invocation)
            .map_err(|e| PipelineError::tool("Prepare for MITM", format!("{invocation}: {e}")))
    }

    pub async fn open_editor(&self, root: &Path) -> Result<(), PipelineError> {
        let invocation = self.editor_invocation(root);
        let step = "Open in Editor";
        if self.config.wait_for_editor {
            let success = self
                .runner
                .interactive(&invocation)
                .await
                .map_err(|e| PipelineError::tool(step, format!("{}: {e}", self.config.editor)))?;
            if !success {
                return Err(PipelineError::tool(step, "editor exited unsuccessfully"));
            }
            Ok(())
        } else {
            self.runner
                .spawn_detached(&invocation)
                .map_err(|e| PipelineError::tool(step, format!("{}: {e}", self.config.editor)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::ScriptedRunner;
    use std::path::PathBuf;

    fn config() -> ToolConfig {
        ToolConfig {
            apktool_path: PathBuf::from("/t/apktool.jar"),
            uber_apk_signer_path: PathBuf::from("/t/signer.jar"),
            apk_editor_path: PathBuf::from("/t/APKEditor.jar"),
            ..ToolConfig::default()
        }
    }

    #[test]
    fn decode_passes_skip_flags_before_the_command() {
        let config = config();
        let runner = ScriptedRunner::new(|_| CommandOutput::ok(""));
        let tools = Toolchain::new(&config, &runner);
        let options = DecodeOptions {
            skip_resources: true,
            skip_sources: true,
        };
        let line = tools
            .decode_invocation(Path::new("/a/app.apk"), Path::new("/a/com.x"), options)
            .to_string();
        assert_eq!(
            line,
            "java -jar /t/apktool.jar -r -s d /a/app.apk -o /a/com.x --only-main-classes"
        );
    }

    #[test]
    fn build_commands_match_the_tool_contracts() {
        let config = config();
        let runner = ScriptedRunner::new(|_| CommandOutput::ok(""));
        let tools = Toolchain::new(&config, &runner);
        assert_eq!(
            tools.recompile_invocation(Path::new("/a/com.x")).to_string(),
            "java -jar /t/apktool.jar b /a/com.x --use-aapt2"
        );
        assert_eq!(
            tools
                .sign_invocation(Path::new("/a/com.x/dist/app.apk"))
                .to_string(),
            "java -jar /t/signer.jar -a /a/com.x/dist/app.apk --allowResign --overwrite"
        );
        assert_eq!(
            tools
                .install_invocation("emu", Path::new("/d/app.apk"))
                .to_string(),
            "adb -s emu install --bypass-low-target-sdk-block -r /d/app.apk"
        );
        assert_eq!(
            tools.launch_invocation("emu", "com.x").to_string(),
            "adb -s emu shell monkey -p com.x 1"
        );
        assert_eq!(
            tools.merge_invocation(Path::new("x.xapk")).to_string(),
            "java -jar /t/APKEditor.jar m -i x.xapk"
        );
    }

    #[test]
    fn mitm_patcher_gets_the_workspace_last() {
        let config = ToolConfig {
            mitm_patcher: vec!["node".to_string(), "patch.mjs".to_string()],
            ..config()
        };
        let runner = ScriptedRunner::new(|_| CommandOutput::ok(""));
        let tools = Toolchain::new(&config, &runner);
        let invocation = tools.mitm_invocation(Path::new("/a/com.x")).unwrap();
        assert_eq!(invocation.to_string(), "node patch.mjs /a/com.x");
    }

    #[test]
    fn empty_mitm_patcher_is_a_tool_failure() {
        let config = ToolConfig {
            mitm_patcher: Vec::new(),
            ..config()
        };
        let runner = ScriptedRunner::new(|_| CommandOutput::ok(""));
        let tools = Toolchain::new(&config, &runner);
        let err = tools.mitm_invocation(Path::new("/a")).unwrap_err();
        assert!(matches!(err, PipelineError::Tool { ref step, .. } if step == "Prepare for MITM"));
    }

    #[tokio::test]
    async fn non_zero_exit_becomes_a_named_failure() {
        let config = config();
        let runner = ScriptedRunner::new(|_| CommandOutput::failed(1, "brut.androlib error"));
        let tools = Toolchain::new(&config, &runner);
        let err = tools
            .run("Building APK", &tools.recompile_invocation(Path::new("/r")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Building APK failed: brut.androlib error");
    }

    #[tokio::test]
    async fn editor_is_detached_unless_configured_to_wait() {
        let config = config();
        let runner = ScriptedRunner::new(|_| CommandOutput::failed(1, ""));
        let tools = Toolchain::new(&config, &runner);
        tools.open_editor(Path::new("/a/com.x")).await.unwrap();

        let waiting = ToolConfig {
            wait_for_editor: true,
            ..config.clone()
        };
        let tools = Toolchain::new(&waiting, &runner);
        let err = tools.open_editor(Path::new("/a/com.x")).await.unwrap_err();
        assert!(err.to_string().starts_with("Open in Editor failed"));
        assert_eq!(runner.calls.borrow().len(), 2);
    }
}
