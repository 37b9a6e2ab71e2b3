use crate::error::PipelineError;
use crate::runner::{CommandRunner, Invocation};
use crate::toolchain::Toolchain;
use std::path::Path;

pub const INIT_CHECKPOINT: &str = "init";
pub const MITM_CHECKPOINT: &str = "mitm";

const GITIGNORE: &str = "/build\n/dist\n.DS_Store";

/// Git operations scoped to one workspace directory.
pub struct Repository<'t, 'a, R> {
    tools: &'t Toolchain<'a, R>,
    root: &'t Path,
}

impl<'t, 'a, R: CommandRunner> Repository<'t, 'a, R> {
    pub fn new(tools: &'t Toolchain<'a, R>, root: &'t Path) -> Self {
        Self { tools, root }
    }

    fn git<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        Invocation::new(&self.tools.config.git)
            .args(args)
            .current_dir(self.root)
    }

    /// `git init` plus an ignore list for apktool's build output.
    pub async fn init(&self, step: &str) -> Result<(), PipelineError> {
        self.tools.run(step, &self.git(["init"])).await?;
        tokio::fs::write(self.root.join(".gitignore"), GITIGNORE)
            .await
            .map_err(|e| PipelineError::tool(step, format!("writing .gitignore: {e}")))?;
        Ok(())
    }

    pub async fn commit_all(&self, step: &str, message: &str) -> Result<(), PipelineError> {
        self.tools.run(step, &self.git(["add", "."])).await?;
        self.tools
            .run(step, &self.git(["commit", "--allow-empty", "-m", message]))
            .await?;
        Ok(())
    }

    /// Commit everything and pin the commit under a tag of the same name.
    pub async fn checkpoint(
        &self,
        step: &str,
        tag: &str,
        message: &str,
    ) -> Result<(), PipelineError> {
        self.commit_all(step, message).await?;
        self.tools
            .run(step, &self.git(["tag", "-f", tag]))
            .await?;
        Ok(())
    }

    pub async fn has_checkpoint(&self, tag: &str) -> Result<bool, PipelineError> {
        let refname = format!("refs/tags/{tag}");
        let output = self
            .tools
            .runner
            .output(&self.git(["rev-parse", "--verify", "--quiet", refname.as_str()]))
            .await
            .map_err(|e| PipelineError::tool("Verify workspace", e.to_string()))?;
        Ok(output.success)
    }

    /// Checkpoints from `wanted` that the repository does not have.
    pub async fn missing_checkpoints(
        &self,
        wanted: &[&str],
    ) -> Result<Vec<String>, PipelineError> {
        let mut missing = Vec::new();
        for tag in wanted {
            if !self.has_checkpoint(tag).await? {
                missing.push(tag.to_string());
            }
        }
        Ok(missing)
    }

    /// Raw `git diff <tag> HEAD` bytes; file contents need not be UTF-8.
    pub async fn diff_since(&self, step: &str, tag: &str) -> Result<Vec<u8>, PipelineError> {
        let output = self.tools.run(step, &self.git(["diff", tag, "HEAD"])).await?;
        Ok(output.raw_stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolConfig;
    use crate::runner::testing::ScriptedRunner;
    use crate::runner::CommandOutput;

    #[tokio::test]
    async fn init_writes_the_ignore_list() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolConfig::default();
        let runner = ScriptedRunner::new(|_| CommandOutput::ok(""));
        let tools = Toolchain::new(&config, &runner);
        let repo = Repository::new(&tools, dir.path());

        repo.init("Init git project").await.unwrap();

        let ignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(ignore, "/build\n/dist\n.DS_Store");
        let calls = runner.calls.borrow();
        assert_eq!(calls[0].to_string(), "git init");
        assert_eq!(calls[0].cwd.as_deref(), Some(dir.path()));
    }

    #[tokio::test]
    async fn checkpoint_commits_then_tags() {
        let config = ToolConfig::default();
        let runner = ScriptedRunner::new(|_| CommandOutput::ok(""));
        let tools = Toolchain::new(&config, &runner);
        let repo = Repository::new(&tools, Path::new("/w"));

        repo.checkpoint("Prepare for MITM", MITM_CHECKPOINT, "mitm")
            .await
            .unwrap();

        assert_eq!(
            runner.command_lines(),
            vec![
                "git add .",
                "git commit --allow-empty -m mitm",
                "git tag -f mitm",
            ]
        );
    }

    #[tokio::test]
    async fn reports_missing_checkpoints() {
        let config = ToolConfig::default();
        let runner = ScriptedRunner::new(|invocation| {
            if invocation.arg_str(3).as_deref() == Some("refs/tags/init") {
                CommandOutput::ok("abc123\n")
            } else {
                CommandOutput::failed(1, "")
            }
        });
        let tools = Toolchain::new(&config, &runner);
        let repo = Repository::new(&tools, Path::new("/w"));

        let missing = repo
            .missing_checkpoints(&[INIT_CHECKPOINT, MITM_CHECKPOINT])
            .await
            .unwrap();
        assert_eq!(missing, vec!["mitm"]);
    }

    #[tokio::test]
    async fn commit_failure_stops_before_tagging() {
        let config = ToolConfig::default();
        let runner = ScriptedRunner::new(|invocation| {
            if invocation.arg_str(0).as_deref() == Some("commit") {
                CommandOutput::failed(128, "Please tell me who you are.")
            } else {
                CommandOutput::ok("")
            }
        });
        let tools = Toolchain::new(&config, &runner);
        let repo = Repository::new(&tools, Path::new("/w"));

        let err = repo
            .checkpoint("Init git project", INIT_CHECKPOINT, "init project")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Init git project failed: Please tell me who you are."
        );
        assert_eq!(runner.calls.borrow().len(), 2);
    }
}
