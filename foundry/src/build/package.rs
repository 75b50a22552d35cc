//! Artifact validation and package archiving.
//!
//! A build outcome is a flat list of files. Before anything is
//! published the outcome must contain the manifest and the app entry
//! point, and the manifest must parse. Packaging writes everything
//! except the build-instruction file into a deflated zip archive.

use anyhow::{bail, Context};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use foundry_agent::{ArtifactFile, BuildOutcome};

/// Files a build must produce before it can be packaged.
pub const REQUIRED_ARTIFACTS: &[&str] = &["manifest.json", "app/main.qml"];

/// Instruction file handed to the build capability; never shipped.
pub const BUILD_INSTRUCTION_FILE: &str = "BUILD.md";

/// Fields read out of a build's manifest.json.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Check the outcome for required files and parse the manifest.
pub fn validate_artifacts(outcome: &BuildOutcome) -> anyhow::Result<Manifest> {
    let missing: Vec<&str> = REQUIRED_ARTIFACTS
        .iter()
        .copied()
        .filter(|path| outcome.artifact(path).is_none())
        .collect();
    if !missing.is_empty() {
        bail!("missing required files: {}", missing.join(", "));
    }

    let manifest = outcome
        .artifact("manifest.json")
        .context("missing required files: manifest.json")?;
    parse_manifest(manifest)
}

fn parse_manifest(file: &ArtifactFile) -> anyhow::Result<Manifest> {
    let text = file
        .as_text()
        .context("manifest.json is not valid UTF-8")?;
    let value: serde_json::Value =
        serde_json::from_str(text).context("invalid manifest.json")?;
    let fields = value
        .as_object()
        .context("manifest.json is not a JSON object")?;

    if !fields.contains_key("name") || !fields.contains_key("app") {
        bail!("manifest.json missing required fields");
    }

    Ok(Manifest {
        name: fields
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        description: fields
            .get("description")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    })
}

/// Archive file name for a published app version.
pub fn package_file_name(slug: &str, version: &str) -> String {
    format!("{}-{}.zip", slug, version)
}

/// Web path clients download a package from.
pub fn package_web_path(file_name: &str) -> String {
    format!("/packages/{}", file_name)
}

/// Write the outcome's artifacts into a zip at `path`, skipping the
/// build-instruction file. Returns the archived paths in order.
pub fn write_archive(outcome: &BuildOutcome, path: &Path) -> anyhow::Result<Vec<String>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create package dir {}", parent.display()))?;
    }

    let file = File::create(path)
        .with_context(|| format!("failed to create archive {}", path.display()))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let mut added = Vec::new();
    for artifact in &outcome.artifacts {
        if is_instruction_file(&artifact.path) {
            continue;
        }
        writer
            .start_file(&artifact.path, options)
            .with_context(|| format!("failed to add {} to archive", artifact.path))?;
        writer
            .write_all(&artifact.contents)
            .with_context(|| format!("failed to write {} to archive", artifact.path))?;
        added.push(artifact.path.clone());
    }
    writer.finish().context("failed to finalize archive")?;

    Ok(added)
}

pub(crate) fn is_instruction_file(path: &str) -> bool {
    path.rsplit('/').next() == Some(BUILD_INSTRUCTION_FILE)
}

/// A staged archive that deletes itself on drop unless kept.
///
/// Holds the in-progress package while the build finishes its checks,
/// so every failure path cleans the staging file up without each call
/// site having to remember to.
#[derive(Debug)]
pub struct StagedPackage {
    path: std::path::PathBuf,
    keep: bool,
}

impl StagedPackage {
    pub fn new(path: std::path::PathBuf) -> Self {
        Self { path, keep: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Defuse the cleanup and hand the path back, once the archive has
    /// been moved (or promoted) to its final location.
    pub fn keep(mut self) -> std::path::PathBuf {
        self.keep = true;
        self.path.clone()
    }
}

impl Drop for StagedPackage {
    fn drop(&mut self) {
        if !self.keep {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "failed to clean up staged package"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn outcome_with(files: Vec<ArtifactFile>) -> BuildOutcome {
        BuildOutcome {
            success: true,
            artifacts: files,
            transcript: vec![],
        }
    }

    fn complete_outcome() -> BuildOutcome {
        outcome_with(vec![
            ArtifactFile::text(
                "manifest.json",
                r#"{"name": "Weather Widget", "description": "Shows weather", "app": {"entry": "app/main.qml"}}"#.to_string(),
            ),
            ArtifactFile::text("app/main.qml", "import QtQuick\nRectangle {}".to_string()),
            ArtifactFile::text("BUILD.md", "instructions".to_string()),
        ])
    }

    #[test]
    fn test_validate_accepts_complete_outcome() {
        let manifest = validate_artifacts(&complete_outcome()).unwrap();
        assert_eq!(manifest.name.as_deref(), Some("Weather Widget"));
        assert_eq!(manifest.description.as_deref(), Some("Shows weather"));
    }

    #[test]
    fn test_validate_reports_missing_files() {
        let outcome = outcome_with(vec![ArtifactFile::text(
            "manifest.json",
            r#"{"name": "x", "app": {}}"#.to_string(),
        )]);
        let err = validate_artifacts(&outcome).unwrap_err();
        assert!(err.to_string().contains("missing required files"));
        assert!(err.to_string().contains("app/main.qml"));
    }

    #[test]
    fn test_validate_rejects_bad_manifest() {
        let mut outcome = complete_outcome();
        outcome.artifacts[0] = ArtifactFile::text("manifest.json", "{not json".to_string());
        assert!(validate_artifacts(&outcome)
            .unwrap_err()
            .to_string()
            .contains("invalid manifest.json"));

        outcome.artifacts[0] =
            ArtifactFile::text("manifest.json", r#"{"name": "x"}"#.to_string());
        assert!(validate_artifacts(&outcome)
            .unwrap_err()
            .to_string()
            .contains("missing required fields"));
    }

    #[test]
    fn test_archive_excludes_instruction_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather-widget-1.0.0.zip");

        let added = write_archive(&complete_outcome(), &path).unwrap();
        assert_eq!(added, vec!["manifest.json", "app/main.qml"]);

        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"manifest.json".to_string()));
        assert!(names.contains(&"app/main.qml".to_string()));
        assert!(!names.iter().any(|n| n.contains("BUILD.md")));

        let mut entry = archive.by_name("app/main.qml").unwrap();
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        assert!(contents.contains("QtQuick"));
    }

    #[test]
    fn test_instruction_file_skipped_in_subdirectories() {
        assert!(is_instruction_file("BUILD.md"));
        assert!(is_instruction_file("docs/BUILD.md"));
        assert!(!is_instruction_file("BUILD.md.bak"));
        assert!(!is_instruction_file("app/main.qml"));
    }

    #[test]
    fn test_package_naming() {
        assert_eq!(
            package_file_name("weather-widget", "1.0.0"),
            "weather-widget-1.0.0.zip"
        );
        assert_eq!(
            package_web_path("weather-widget-1.0.0.zip"),
            "/packages/weather-widget-1.0.0.zip"
        );
    }

    #[test]
    fn test_staged_package_cleans_up_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stage.zip");
        std::fs::write(&path, b"partial").unwrap();

        {
            let _staged = StagedPackage::new(path.clone());
        }
        assert!(!path.exists());

        std::fs::write(&path, b"complete").unwrap();
        let staged = StagedPackage::new(path.clone());
        let kept = staged.keep();
        assert!(kept.exists());
    }
}
