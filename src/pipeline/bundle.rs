//! BundleStage: fold a multi-file output set into one archive.
//!
//! Rasterizers split multi-page documents into `<key>-<n>.<ext>` siblings
//! instead of the single `<key>.<ext>` the resolver expects. There is no
//! explicit signal that this happened; the only evidence is the filenames.
//! This stage scans the workspace after conversion, and when more than one
//! part matches the naming convention it rewraps them as `<key>.zip` (entry
//! names `<name>-<n>`, ordered by part index) and switches the active
//! format to zip.
//!
//! The detection filter is a typed regex match, not prefix poking: the key
//! is pinned to 64 hex chars and the index to digits, so an unrelated
//! workspace file (a log, the `.tex` source) can never be swept into the
//! archive.

use crate::artifact::ArtifactFormat;
use crate::error::BuildError;
use crate::workspace::Workspace;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::path::PathBuf;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// `<64-hex-key>-<index>.<ext>`
static RE_OUTPUT_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9a-f]{64})-(\d+)\.([A-Za-z0-9]+)$").expect("valid regex"));

/// Parse a workspace filename as an output part of the given job and
/// extension; returns the part index.
fn part_index(key: &str, extension: &str, file_name: &str) -> Option<u64> {
    let caps = RE_OUTPUT_PART.captures(file_name)?;
    if &caps[1] != key || &caps[3] != extension {
        return None;
    }
    caps[2].parse().ok()
}

/// Detect and rewrap a split output set.
///
/// Returns `Some(ArtifactFormat::Zip)` when more than one part was found
/// and archived, `None` when the output was not split (including the
/// pass-through and single-file cases).
pub async fn bundle(
    workspace: &Workspace,
    format: &ArtifactFormat,
    download_stem: &str,
) -> Result<Option<ArtifactFormat>, BuildError> {
    let key = workspace.key().as_str();
    let extension = format.extension();

    let mut parts: Vec<(u64, PathBuf)> = Vec::new();
    let entries = std::fs::read_dir(workspace.dir()).map_err(|e| BuildError::BundleFailed {
        detail: format!("cannot scan workspace: {e}"),
    })?;
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if let Some(index) = part_index(key, extension, name) {
            parts.push((index, entry.path()));
        }
    }

    if parts.len() <= 1 {
        debug!(key = %key, parts = parts.len(), "no multi-file output to bundle");
        return Ok(None);
    }

    parts.sort_by_key(|(index, _)| *index);
    let zip_path = workspace.path(format!("{key}.zip"))?;
    let stem = download_stem.to_string();
    let count = parts.len();

    tokio::task::spawn_blocking(move || write_archive(&zip_path, &parts, &stem))
        .await
        .map_err(|e| BuildError::BundleFailed {
            detail: format!("bundle task panicked: {e}"),
        })??;

    info!(key = %key, parts = count, "multi-file output bundled");
    Ok(Some(ArtifactFormat::Zip))
}

fn write_archive(
    zip_path: &PathBuf,
    parts: &[(u64, PathBuf)],
    stem: &str,
) -> Result<(), BuildError> {
    let file = File::create(zip_path).map_err(|e| BuildError::BundleFailed {
        detail: format!("cannot create archive: {e}"),
    })?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for (index, path) in parts {
        writer
            .start_file(format!("{stem}-{index}"), options)
            .map_err(|e| BuildError::BundleFailed {
                detail: format!("cannot start archive entry: {e}"),
            })?;
        let mut part = File::open(path).map_err(|e| BuildError::BundleFailed {
            detail: format!("cannot read part '{}': {e}", path.display()),
        })?;
        std::io::copy(&mut part, &mut writer).map_err(|e| BuildError::BundleFailed {
            detail: format!("cannot copy part '{}': {e}", path.display()),
        })?;
    }

    writer.finish().map_err(|e| BuildError::BundleFailed {
        detail: format!("cannot finish archive: {e}"),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobkey::JobKey;
    use crate::request::{BuildRequest, RasterFormat};
    use tempfile::TempDir;

    const KEY_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const KEY_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[test]
    fn part_filter_accepts_only_this_jobs_parts() {
        assert_eq!(part_index(KEY_A, "png", &format!("{KEY_A}-1.png")), Some(1));
        assert_eq!(
            part_index(KEY_A, "png", &format!("{KEY_A}-12.png")),
            Some(12)
        );
        // Wrong key, wrong extension, no index, unsplit name
        assert_eq!(part_index(KEY_A, "png", &format!("{KEY_B}-1.png")), None);
        assert_eq!(part_index(KEY_A, "png", &format!("{KEY_A}-1.jpg")), None);
        assert_eq!(part_index(KEY_A, "png", &format!("{KEY_A}-x.png")), None);
        assert_eq!(part_index(KEY_A, "png", &format!("{KEY_A}.png")), None);
        assert_eq!(part_index(KEY_A, "png", "args.log"), None);
    }

    fn open_workspace() -> (TempDir, Workspace) {
        let root = TempDir::new().unwrap();
        let key = JobKey::compute(&BuildRequest::default()).unwrap();
        let ws = Workspace::open(&key, root.path()).unwrap();
        (root, ws)
    }

    #[tokio::test]
    async fn two_parts_become_a_zip() {
        let (_root, ws) = open_workspace();
        let key = ws.key().as_str().to_string();
        std::fs::write(ws.dir().join(format!("{key}-1.png")), b"one").unwrap();
        std::fs::write(ws.dir().join(format!("{key}-2.png")), b"two").unwrap();

        let rewrapped = bundle(&ws, &ArtifactFormat::Raster(RasterFormat::Png), "pages")
            .await
            .unwrap();
        assert_eq!(rewrapped, Some(ArtifactFormat::Zip));

        let archive_path = ws.dir().join(format!("{key}.zip"));
        let mut archive = zip::ZipArchive::new(File::open(archive_path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(names, vec!["pages-1".to_string(), "pages-2".to_string()]);

        let mut entry = archive.by_name("pages-2").unwrap();
        let mut contents = String::new();
        std::io::Read::read_to_string(&mut entry, &mut contents).unwrap();
        assert_eq!(contents, "two");
    }

    #[tokio::test]
    async fn single_part_is_not_bundled() {
        let (_root, ws) = open_workspace();
        let key = ws.key().as_str().to_string();
        std::fs::write(ws.dir().join(format!("{key}-0.png")), b"only").unwrap();

        let rewrapped = bundle(&ws, &ArtifactFormat::Raster(RasterFormat::Png), "pages")
            .await
            .unwrap();
        assert_eq!(rewrapped, None);
    }

    #[tokio::test]
    async fn unsplit_output_is_not_bundled() {
        let (_root, ws) = open_workspace();
        let key = ws.key().as_str().to_string();
        std::fs::write(ws.dir().join(format!("{key}.png")), b"whole").unwrap();

        let rewrapped = bundle(&ws, &ArtifactFormat::Raster(RasterFormat::Png), "pages")
            .await
            .unwrap();
        assert_eq!(rewrapped, None);
    }
}
