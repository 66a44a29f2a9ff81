//! Image ordering: analyse figures in the order the paper mentions them.
//!
//! Bundle image directories are flat and named by content hash, so their
//! on-disk order means nothing. The rendered Markdown embeds each figure
//! where it appears in the paper; scanning it for references gives the
//! reading order and filters out images the text never uses (logos,
//! decorations, cropped duplicates).

use crate::error::PaperFigError;
use crate::pipeline::encode::is_supported_image;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// `![alt](path/to/name.png)` with an image extension.
static RE_MD_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)!\[.*?\]\(([^)]+\.(?:png|jpg|jpeg|gif|bmp|tiff|webp))\)").unwrap()
});

/// `<image:name.png>` placeholder tokens.
static RE_IMAGE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<image:([^>]+)>").unwrap());

/// `![image](path)` embeds regardless of extension.
static RE_GENERIC_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)!\[image\]\(([^)]+)\)").unwrap());

/// Every supported image under `dir`, sorted by path.
pub fn discover_images(dir: &Path) -> Vec<PathBuf> {
    let mut images: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_supported_image(e.path()))
        .map(|e| e.into_path())
        .collect();
    images.sort();
    images
}

/// File names referenced by `markdown`, in first-occurrence order and
/// deduplicated case-insensitively.
pub fn referenced_image_names(markdown: &str) -> Vec<String> {
    let mut hits: Vec<(usize, &str)> = [&*RE_MD_IMAGE, &*RE_IMAGE_TOKEN, &*RE_GENERIC_IMAGE]
        .into_iter()
        .flat_map(|re| re.captures_iter(markdown))
        .filter_map(|c| c.get(1))
        .map(|m| (m.start(), m.as_str()))
        .collect();
    hits.sort_by_key(|(offset, _)| *offset);

    let mut seen = HashSet::new();
    hits.into_iter()
        .filter_map(|(_, reference)| {
            let name = Path::new(reference.trim()).file_name()?.to_str()?.to_string();
            seen.insert(name.to_lowercase()).then_some(name)
        })
        .collect()
}

/// Resolve the list of images to analyse.
///
/// * `images` is a single file → that file, if its extension is supported.
/// * no (or empty) `markdown` → every image under the directory, by path.
/// * otherwise → images the text references, in reference order; images
///   the text never mentions are dropped.
pub fn resolve_image_order(
    markdown: Option<&str>,
    images: &Path,
) -> Result<Vec<PathBuf>, PaperFigError> {
    if !images.exists() {
        return Err(PaperFigError::ImagesDirNotFound {
            path: images.to_path_buf(),
        });
    }

    if images.is_file() {
        if !is_supported_image(images) {
            return Err(PaperFigError::UnsupportedImageType {
                path: images.to_path_buf(),
            });
        }
        return Ok(vec![images.to_path_buf()]);
    }

    let on_disk = discover_images(images);
    let markdown = match markdown {
        Some(text) if !text.trim().is_empty() => text,
        _ => {
            debug!("No Markdown supplied; using {} images in path order", on_disk.len());
            return Ok(on_disk);
        }
    };

    let mut by_name: HashMap<String, PathBuf> = HashMap::new();
    for path in &on_disk {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            by_name.entry(name.to_lowercase()).or_insert_with(|| path.clone());
        }
    }

    let referenced = referenced_image_names(markdown);
    let ordered: Vec<PathBuf> = referenced
        .iter()
        .filter_map(|name| by_name.get(&name.to_lowercase()).cloned())
        .collect();

    info!(
        "Resolved {} images from {} references ({} on disk)",
        ordered.len(),
        referenced.len(),
        on_disk.len()
    );
    Ok(ordered)
}
