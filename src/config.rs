use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths and commands for every external tool, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolConfig {
    #[serde(alias = "APKTOOL_PATH")]
    pub apktool_path: PathBuf,
    #[serde(alias = "UBER_APK_SIGNER_PATH")]
    pub uber_apk_signer_path: PathBuf,
    #[serde(alias = "APKEDITOR_PATH")]
    pub apk_editor_path: PathBuf,
    #[serde(alias = "OUTPUT_PATCH_PATH")]
    pub output_patch_path: PathBuf,
    #[serde(alias = "EDITOR")]
    pub editor: String,
    /// Block until the editor exits instead of detaching from it.
    pub wait_for_editor: bool,
    pub java: String,
    pub aapt: String,
    pub adb: String,
    pub git: String,
    /// Command prefix of the interception patcher; the workspace directory is
    /// appended as its last argument.
    pub mitm_patcher: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        let tools_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tools");
        Self {
            apktool_path: tools_dir.join("apktool.jar"),
            uber_apk_signer_path: tools_dir.join("uber-apk-signer.jar"),
            apk_editor_path: tools_dir.join("APKEditor.jar"),
            output_patch_path: PathBuf::from("patches"),
            editor: "code".to_string(),
            wait_for_editor: false,
            java: "java".to_string(),
            aapt: "aapt".to_string(),
            adb: "adb".to_string(),
            git: "git".to_string(),
            mitm_patcher: vec!["apk-mitm-patch".to_string()],
        }
    }
}

impl ToolConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("apkloop")
            .join("config.json")
    }

    pub fn template() -> Self {
        Self::default()
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: ToolConfig = json5::from_str(content)?;
        Ok(config.expand_home())
    }

    /// Load `path`, or fall back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Error reading config file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Error parsing config file {}", path.display()))
    }

    /// Tools the lifecycle can not run without, as (name, configured value).
    pub fn tools(&self) -> Vec<(&'static str, String)> {
        vec![
            ("java", self.java.clone()),
            ("aapt", self.aapt.clone()),
            ("adb", self.adb.clone()),
            ("git", self.git.clone()),
            (
                "mitm patcher",
                self.mitm_patcher.first().cloned().unwrap_or_default(),
            ),
            ("editor", self.editor.clone()),
        ]
    }

    pub fn jars(&self) -> Vec<(&'static str, &Path)> {
        vec![
            ("apktool", self.apktool_path.as_path()),
            ("uber-apk-signer", self.uber_apk_signer_path.as_path()),
            ("APKEditor", self.apk_editor_path.as_path()),
        ]
    }

    pub fn patch_file(&self, package_name: &str, version: &str) -> PathBuf {
        self.output_patch_path
            .join(package_name)
            .join(format!("{version}.patch"))
    }

    fn expand_home(mut self) -> Self {
        for path in [
            &mut self.apktool_path,
            &mut self.uber_apk_signer_path,
            &mut self.apk_editor_path,
            &mut self.output_patch_path,
        ] {
            *path = expand_tilde(path);
        }
        self
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
