//! Bundle archival: download the extraction result, unpack it, and
//! materialise `paper.md` plus `images/` under the paper's backup directory.
//!
//! ## Why a scoped temp file and temp directory?
//!
//! The bundle is only needed long enough to copy two things out of it.
//! Holding the `.zip` in a [`NamedTempFile`] and its contents in a
//! [`TempDir`] means both vanish when this stage returns, whether it
//! succeeded, failed half-way, or panicked.
//!
//! ## Why stage the image directory?
//!
//! Re-parsing a paper must replace its images, not merge them. The new tree
//! is built in a hidden sibling directory, the old tree is removed, and the
//! staging directory is renamed into place, so a reader sees either the old
//! set or the new set.

use crate::config::ExtractionConfig;
use crate::error::PaperFigError;
use crate::output::{BackupRecord, MirrorCopy};
use crate::paper_id::PaperId;
use crate::pipeline::order::discover_images;
use futures::StreamExt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::ZipArchive;

/// Name of the rendered-text file inside a backup or mirror directory.
pub const MARKDOWN_FILE: &str = "paper.md";

/// Name of the image directory inside a backup or mirror directory.
pub const IMAGES_DIR: &str = "images";

/// Downloads result bundles and writes them into the backup store.
pub struct ArchiveExtractor {
    http: reqwest::Client,
    api_key: String,
    backup_root: PathBuf,
}

impl ArchiveExtractor {
    pub fn new(config: &ExtractionConfig) -> Result<Self, PaperFigError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()
            .map_err(|e| PaperFigError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            backup_root: config.backup_root.clone(),
        })
    }

    /// Download `bundle_url`, archive it under the paper's backup directory
    /// and, if `destination` is given, mirror it there.
    ///
    /// The paper id is derived from `document_url`, or from `bundle_url` when
    /// no document URL is known.
    pub async fn extract(
        &self,
        bundle_url: &str,
        document_url: Option<&str>,
        destination: Option<&Path>,
    ) -> Result<BackupRecord, PaperFigError> {
        let paper_id = PaperId::from_locator(document_url.unwrap_or(bundle_url));
        let bundle = self.download(bundle_url).await?;

        let zip_path = bundle.path().to_path_buf();
        let backup_dir = self.backup_root.join(&paper_id);
        let destination = destination.map(Path::to_path_buf);
        let url = bundle_url.to_string();

        let record = tokio::task::spawn_blocking(move || {
            materialise(&zip_path, &url, paper_id, &backup_dir, destination.as_deref())
        })
        .await
        .map_err(|e| PaperFigError::Internal(format!("Archive task panicked: {}", e)))?;

        // Keep the bundle alive until unpacking has finished.
        drop(bundle);
        record
    }

    /// Stream the bundle into a scoped `.zip` temp file.
    async fn download(&self, url: &str) -> Result<NamedTempFile, PaperFigError> {
        let fail = |reason: String| PaperFigError::DownloadFailed {
            url: url.to_string(),
            reason,
        };

        info!("Downloading bundle from: {}", url);
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fail(format!("HTTP {}", response.status())));
        }

        let tmp = tempfile::Builder::new()
            .prefix("paperfig-bundle-")
            .suffix(".zip")
            .tempfile()
            .map_err(|e| PaperFigError::Internal(format!("Failed to create temp file: {}", e)))?;
        let std_file = tmp
            .reopen()
            .map_err(|e| PaperFigError::Internal(format!("Failed to open temp file: {}", e)))?;
        let mut file = tokio::fs::File::from_std(std_file);

        let mut total = 0usize;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| fail(e.to_string()))?;
            total += chunk.len();
            file.write_all(&chunk)
                .await
                .map_err(|e| PaperFigError::Internal(format!("Failed to write temp file: {}", e)))?;
        }
        file.flush()
            .await
            .map_err(|e| PaperFigError::Internal(format!("Failed to write temp file: {}", e)))?;

        info!("Downloaded {} bytes to {}", total, tmp.path().display());
        Ok(tmp)
    }
}

/// Blocking half of [`ArchiveExtractor::extract`]: unpack, locate, copy.
fn materialise(
    zip_path: &Path,
    url: &str,
    paper_id: PaperId,
    backup_dir: &Path,
    destination: Option<&Path>,
) -> Result<BackupRecord, PaperFigError> {
    let unpacked = TempDir::new()
        .map_err(|e| PaperFigError::Internal(format!("Failed to create temp dir: {}", e)))?;
    unpack(zip_path, unpacked.path()).map_err(|detail| PaperFigError::CorruptBundle {
        url: url.to_string(),
        detail,
    })?;

    let markdown_src =
        find_markdown(unpacked.path()).ok_or_else(|| PaperFigError::MarkdownNotInBundle {
            url: url.to_string(),
        })?;
    debug!("Markdown in bundle: {}", markdown_src.display());

    let markdown = fs::read_to_string(&markdown_src).map_err(|source| PaperFigError::ReadFailed {
        path: markdown_src.clone(),
        source,
    })?;

    let relative_images: Vec<PathBuf> = discover_images(unpacked.path())
        .into_iter()
        .filter_map(|p| p.strip_prefix(unpacked.path()).ok().map(Path::to_path_buf))
        .collect();
    info!("Found {} images in bundle", relative_images.len());

    let images_dir = backup_dir.join(IMAGES_DIR);
    let image_files = replace_tree(unpacked.path(), &relative_images, &images_dir)?;
    let markdown_file = backup_dir.join(MARKDOWN_FILE);
    write_atomic(&markdown_file, markdown.as_bytes()).map_err(|source| {
        PaperFigError::WriteFailed {
            path: markdown_file.clone(),
            source,
        }
    })?;
    info!("Backup written to {}", backup_dir.display());

    let mirror = match destination {
        Some(dest) => {
            let mirror_images = dest.join(IMAGES_DIR);
            let relative = relative_to(&images_dir, &image_files);
            let mirror_files = replace_tree(&images_dir, &relative, &mirror_images)?;
            let mirror_md = dest.join(MARKDOWN_FILE);
            write_atomic(&mirror_md, markdown.as_bytes()).map_err(|source| {
                PaperFigError::WriteFailed {
                    path: mirror_md.clone(),
                    source,
                }
            })?;
            info!("Mirrored to {}", dest.display());
            Some(MirrorCopy {
                markdown_file: mirror_md,
                images_dir: mirror_images,
                image_files: mirror_files,
            })
        }
        None => None,
    };

    Ok(BackupRecord {
        paper_id,
        backup_dir: backup_dir.to_path_buf(),
        markdown_file,
        images_dir,
        image_files,
        markdown,
        mirror,
    })
}

fn unpack(zip_path: &Path, into: &Path) -> Result<(), String> {
    let file = fs::File::open(zip_path).map_err(|e| e.to_string())?;
    let mut archive = ZipArchive::new(file).map_err(|e| e.to_string())?;
    archive.extract(into).map_err(|e| e.to_string())
}

/// First `.md` file in a name-sorted walk of `root`.
pub fn find_markdown(root: &Path) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .find(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("md"))
        })
}

fn relative_to(root: &Path, files: &[PathBuf]) -> Vec<PathBuf> {
    files
        .iter()
        .filter_map(|p| p.strip_prefix(root).ok().map(Path::to_path_buf))
        .collect()
}

/// Replace `target` with a directory holding `files` (relative to
/// `source_root`). Returns the new absolute paths, sorted.
fn replace_tree(
    source_root: &Path,
    files: &[PathBuf],
    target: &Path,
) -> Result<Vec<PathBuf>, PaperFigError> {
    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| PaperFigError::WriteFailed { path, source }
    };

    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(write_err(parent))?;

    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(IMAGES_DIR);
    let staging = parent.join(format!(".{name}.staging"));
    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(write_err(&staging))?;
    }
    fs::create_dir_all(&staging).map_err(write_err(&staging))?;

    for rel in files {
        let dest = staging.join(rel);
        if let Some(dir) = dest.parent() {
            fs::create_dir_all(dir).map_err(write_err(dir))?;
        }
        fs::copy(source_root.join(rel), &dest).map_err(write_err(&dest))?;
    }

    if target.exists() {
        fs::remove_dir_all(target).map_err(write_err(target))?;
    }
    fs::rename(&staging, target).map_err(write_err(target))?;

    let mut placed: Vec<PathBuf> = files.iter().map(|rel| target.join(rel)).collect();
    placed.sort();
    Ok(placed)
}

/// Write to a sibling temp file, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_bundle(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn materialise_writes_backup_layout() {
        let work = tempfile::tempdir().unwrap();
        let zip_path = work.path().join("bundle.zip");
        write_bundle(
            &zip_path,
            &[
                ("full.md", b"# Title\n![](images/a.jpg)\n"),
                ("images/a.jpg", b"jpg-a"),
                ("images/b.png", b"png-b"),
                ("layout.json", b"{}"),
            ],
        );

        let backup = work.path().join("backup").join("id1");
        let id = PaperId::from_locator("https://example.com/p.pdf");
        let record = materialise(&zip_path, "u", id.clone(), &backup, None).unwrap();

        assert_eq!(record.paper_id, id);
        assert_eq!(record.markdown_file, backup.join("paper.md"));
        assert_eq!(fs::read_to_string(&record.markdown_file).unwrap(), record.markdown);
        assert_eq!(names(&record.image_files), vec!["a.jpg", "b.png"]);
        assert!(backup.join("images/images/a.jpg").is_file());
        assert!(record.mirror.is_none());
    }

    #[test]
    fn re_extract_replaces_images() {
        let work = tempfile::tempdir().unwrap();
        let backup = work.path().join("backup");
        let id = PaperId::from_locator("p.pdf");

        let first = work.path().join("first.zip");
        write_bundle(&first, &[("full.md", b"v1"), ("images/old.png", b"o")]);
        materialise(&first, "u", id.clone(), &backup, None).unwrap();

        let second = work.path().join("second.zip");
        write_bundle(&second, &[("full.md", b"v2"), ("images/new.png", b"n")]);
        let record = materialise(&second, "u", id, &backup, None).unwrap();

        assert_eq!(names(&record.image_files), vec!["new.png"]);
        assert!(!backup.join("images/images/old.png").exists());
        assert_eq!(fs::read_to_string(backup.join("paper.md")).unwrap(), "v2");
        assert!(!backup.join(".images.staging").exists());
    }

    #[test]
    fn mirror_copies_text_and_images() {
        let work = tempfile::tempdir().unwrap();
        let zip_path = work.path().join("b.zip");
        write_bundle(&zip_path, &[("x/doc.md", b"text"), ("x/images/f.png", b"f")]);

        let dest = work.path().join("out");
        let record = materialise(
            &zip_path,
            "u",
            PaperId::from_locator("p"),
            &work.path().join("backup"),
            Some(&dest),
        )
        .unwrap();

        let mirror = record.mirror.expect("mirror");
        assert_eq!(fs::read_to_string(&mirror.markdown_file).unwrap(), "text");
        assert_eq!(mirror.images_dir, dest.join("images"));
        assert_eq!(names(&mirror.image_files), vec!["f.png"]);
        assert!(mirror.image_files.iter().all(|p| p.is_file()));
    }

    #[test]
    fn bundle_without_markdown_is_fatal() {
        let work = tempfile::tempdir().unwrap();
        let zip_path = work.path().join("b.zip");
        write_bundle(&zip_path, &[("images/a.png", b"a")]);
        let err = materialise(
            &zip_path,
            "https://cdn/b.zip",
            PaperId::from_locator("p"),
            &work.path().join("backup"),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PaperFigError::MarkdownNotInBundle { .. }));
    }

    #[test]
    fn corrupt_bundle_is_fatal() {
        let work = tempfile::tempdir().unwrap();
        let zip_path = work.path().join("b.zip");
        fs::write(&zip_path, b"not a zip").unwrap();
        let err = materialise(&zip_path, "u", PaperId::from_locator("p"), work.path(), None)
            .unwrap_err();
        assert!(matches!(err, PaperFigError::CorruptBundle { .. }));
    }

    #[test]
    fn markdown_choice_is_first_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.md"), "b").unwrap();
        fs::write(dir.path().join("a.md"), "a").unwrap();
        fs::write(dir.path().join("0.txt"), "t").unwrap();
        assert_eq!(find_markdown(dir.path()), Some(dir.path().join("a.md")));
    }

    #[test]
    fn atomic_write_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/paper.md");
        write_atomic(&target, b"one").unwrap();
        write_atomic(&target, b"two").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "two");
        assert!(!dir.path().join("nested/paper.md.tmp").exists());
    }
}
