use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the workspace lifecycle.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Can not parse apk info")]
    Parse,

    #[error("{} does not exist!", .0.display())]
    MissingPath(PathBuf),

    #[error("{step} failed: {message}")]
    Tool { step: String, message: String },

    #[error("No devices connected. Please connect a device and try again.")]
    NoDevice,

    #[error(
        "workspace {} is missing checkpoint(s) {}; inspect or remove it and run again",
        .root.display(),
        .missing.join(", ")
    )]
    IncompleteWorkspace { root: PathBuf, missing: Vec<String> },
}

impl PipelineError {
    pub fn tool(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            step: step.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_failure_names_the_step() {
        let err = PipelineError::tool("Signing APK", "exit status 2");
        assert_eq!(err.to_string(), "Signing APK failed: exit status 2");
    }

    #[test]
    fn incomplete_workspace_lists_missing_checkpoints() {
        let err = PipelineError::IncompleteWorkspace {
            root: PathBuf::from("/a/com.x"),
            missing: vec!["init".to_string(), "mitm".to_string()],
        };
        assert!(err.to_string().contains("/a/com.x"));
        assert!(err.to_string().contains("init, mitm"));
    }
}
