//! Host checks run before the lifecycle touches anything, so a missing tool
//! is reported up front instead of halfway through a pipeline.

use crate::config::ToolConfig;
use anyhow::{bail, Result};
use std::path::Path;

/// Check if a command resolves on `PATH` (or is an existing path).
pub fn command_exists(cmd: &str) -> bool {
    !cmd.is_empty() && which::which(cmd).is_ok()
}

/// Tools needed by every build loop.
pub fn check(config: &ToolConfig) -> Result<()> {
    let mut missing = missing_commands(&[
        ("java", config.java.as_str()),
        ("aapt", config.aapt.as_str()),
        ("adb", config.adb.as_str()),
        ("git", config.git.as_str()),
    ]);
    missing.extend(missing_files(&[
        ("apktool", config.apktool_path.as_path()),
        ("uber-apk-signer", config.uber_apk_signer_path.as_path()),
    ]));
    report(missing)
}

/// Extra tools needed only when a workspace is created.
pub fn check_init(config: &ToolConfig) -> Result<()> {
    let patcher = config.mitm_patcher.first().map(String::as_str).unwrap_or("");
    report(missing_commands(&[("mitm patcher", patcher)]))
}

fn missing_commands(tools: &[(&str, &str)]) -> Vec<String> {
    tools
        .iter()
        .filter(|(_, cmd)| !command_exists(cmd))
        .map(|(name, cmd)| format!("  {name} (configured as `{cmd}`)"))
        .collect()
}

fn missing_files(files: &[(&str, &Path)]) -> Vec<String> {
    files
        .iter()
        .filter(|(_, path)| !path.is_file())
        .map(|(name, path)| format!("  {name} ({})", path.display()))
        .collect()
}

fn report(missing: Vec<String>) -> Result<()> {
    if !missing.is_empty() {
        bail!("Missing required tools:\n{}", missing.join("\n"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn empty_command_never_exists() {
        assert!(!command_exists(""));
    }

    #[test]
    fn lists_every_missing_tool() {
        let config = ToolConfig {
            java: "definitely-not-java-4f1c".to_string(),
            aapt: "definitely-not-aapt-4f1c".to_string(),
            apktool_path: PathBuf::from("/nonexistent/apktool.jar"),
            ..ToolConfig::default()
        };
        let message = check(&config).unwrap_err().to_string();
        assert!(message.contains("java (configured as `definitely-not-java-4f1c`)"));
        assert!(message.contains("aapt"));
        assert!(message.contains("/nonexistent/apktool.jar"));
    }

    #[test]
    fn unconfigured_patcher_is_reported() {
        let config = ToolConfig {
            mitm_patcher: Vec::new(),
            ..ToolConfig::default()
        };
        assert!(check_init(&config).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn existing_patcher_passes() {
        let config = ToolConfig {
            mitm_patcher: vec!["sh".to_string(), "patch.sh".to_string()],
            ..ToolConfig::default()
        };
        assert!(check_init(&config).is_ok());
    }
}
