//! Building the canonical (text, attachment) payload for a batch.
//!
//! Manual mode takes the caller's text and file verbatim; remote-document
//! mode pulls a page's text blocks and first image from a [`BlockSource`].

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;
use url::Url;

use crate::{
    domain::ContentPayload,
    errors::Error,
    ports::{Block, BlockSource, Downloader},
    Result,
};

/// Longest suffix we will carry over from a source URL; keeps the generated
/// temp file name well inside common filesystem limits.
const MAX_SUFFIX: usize = 16;

fn page_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[0-9a-fA-F]{32}$").expect("static regex"))
}

/// Manual-mode payload: verbatim text plus an optional local file that must
/// already exist.
pub fn manual(text: &str, attachment: Option<&Path>) -> Result<ContentPayload> {
    let attachment = match attachment {
        None => None,
        Some(path) => {
            if !path.is_file() {
                return Err(Error::InvalidPath {
                    path: path.to_path_buf(),
                    reason: "attachment does not exist".to_string(),
                });
            }
            Some(path.to_path_buf())
        }
    };

    Ok(ContentPayload {
        text: text.to_string(),
        attachment,
    })
}

/// Pulls the 32-hex document id out of a share link.
///
/// The id is the final path segment, optionally preceded by a
/// hyphen-separated slug; query and fragment are ignored.
pub fn extract_page_id(link: &str) -> Result<String> {
    let parsed = Url::parse(link).map_err(|_| Error::InvalidDocumentLink(link.to_string()))?;
    let tail = parsed.path().rsplit('/').next().unwrap_or("");
    let candidate = tail.rsplit('-').next().unwrap_or(tail);

    if page_id_re().is_match(candidate) {
        Ok(candidate.to_string())
    } else {
        Err(Error::InvalidDocumentLink(link.to_string()))
    }
}

/// One line per text-bearing block, first run only, whole text trimmed at
/// the ends.
pub fn collect_text(blocks: &[Block]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            Block::Text { runs } => runs.first().map(String::as_str),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// First image URL, if any; later images are ignored.
pub fn first_image(blocks: &[Block]) -> Option<&str> {
    blocks.iter().find_map(|block| match block {
        Block::Image { url } => Some(url.as_str()),
        _ => None,
    })
}

/// Local destination for a downloaded attachment. The extension follows the
/// source URL's path (generic binary extension when absent). The file is
/// kept on disk; the caller owns the returned path and its cleanup.
fn temp_target(source_url: &str) -> Result<PathBuf> {
    let base = Url::parse(source_url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_default();

    let mut suffix = Path::new(&base)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    if suffix.len() < 2 || suffix.len() > MAX_SUFFIX {
        suffix = ".bin".to_string();
    }

    let file = tempfile::Builder::new()
        .prefix("crosspost-")
        .suffix(&suffix)
        .tempfile()?;
    let (_handle, path) = file.keep().map_err(|e| Error::Io(e.error))?;
    Ok(path)
}

/// Fetches a remote document and normalizes it into a payload: one line per
/// text block plus the first image downloaded to a local temp file.
///
/// A document with neither text nor image yields an empty payload. That is
/// valid here; the caller decides that an all-empty payload is unsendable.
pub async fn fetch_document(
    source: &dyn BlockSource,
    downloader: &dyn Downloader,
    link: &str,
) -> Result<ContentPayload> {
    let page_id = extract_page_id(link)?;
    let blocks = source.list_blocks(&page_id).await?;

    let text = collect_text(&blocks);
    let attachment = match first_image(&blocks) {
        None => None,
        Some(image_url) => {
            let dest = temp_target(image_url)?;
            downloader.download(image_url, &dest).await?;
            debug!(path = %dest.display(), "attachment downloaded");
            Some(dest)
        }
    };

    Ok(ContentPayload { text, attachment })
}
