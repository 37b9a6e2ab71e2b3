use crate::error::PipelineError;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static BADGING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bname='([^']+)'.*?\bversionName='([^']+)'").expect("valid badging pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageIdentity {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub dist_artifact: PathBuf,
}

impl WorkspacePaths {
    /// `root` sits next to the apk and is named after the package;
    /// the recompiled artifact keeps the original file name under `root/dist`.
    pub fn derive(apk_path: &Path, identity: &PackageIdentity) -> Self {
        let parent = apk_path.parent().unwrap_or_else(|| Path::new(""));
        let root = parent.join(&identity.name);
        let apk_name = apk_path.file_name().unwrap_or(apk_path.as_os_str());
        let dist_artifact = root.join("dist").join(apk_name);
        Self {
            root,
            dist_artifact,
        }
    }
}

/// Everything the pipelines need to know about one package, passed explicitly
/// from stage to stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceSession {
    pub apk_path: PathBuf,
    pub identity: PackageIdentity,
    pub paths: WorkspacePaths,
}

impl WorkspaceSession {
    pub fn new(apk_path: &Path, identity: PackageIdentity) -> Self {
        let paths = WorkspacePaths::derive(apk_path, &identity);
        Self {
            apk_path: apk_path.to_path_buf(),
            identity,
            paths,
        }
    }
}

pub fn parse_badging(dump: &str) -> Result<PackageIdentity, PipelineError> {
    let captures = BADGING_RE.captures(dump).ok_or(PipelineError::Parse)?;
    Ok(PackageIdentity {
        name: captures[1].to_string(),
        version: captures[2].to_string(),
    })
}

pub fn resolve(dump: &str, apk_path: &Path) -> Result<WorkspaceSession, PipelineError> {
    let identity = parse_badging(dump)?;
    Ok(WorkspaceSession::new(apk_path, identity))
}

/// aapt prints the package line before bailing out on unrelated warnings, so
/// the error stream is a usable fallback.
pub fn resolve_streams(
    stdout: &str,
    stderr: &str,
    apk_path: &Path,
) -> Result<WorkspaceSession, PipelineError> {
    resolve(stdout, apk_path).or_else(|_| {
        log::info!("Can not parse apk info, try parsing from error...");
        resolve(stderr, apk_path)
    })
}
