//! Environment overlays for specification documents.
//!
//! An overlay is a partial specification. Sequence items that carry
//! `metadata.labels.overlay: <label>` are matched against the base item with
//! the same label; everything else merges structurally.

mod annotate;
mod directive;
mod merge;
mod scan;

use std::path::{Path, PathBuf};

pub use crate::overlay::annotate::annotate;
pub use crate::overlay::directive::{Action, Annotation, Expects, Matcher};
pub use crate::overlay::merge::{OverlayDocument, load_documents, load_overlay, merge_documents};

use crate::error::Error;

pub const LOAD_DIRECTIVE: &str = r#"#@ load("@ytt:overlay", "overlay")"#;
pub const MATCH_ALL_DIRECTIVE: &str = "#@overlay/match by=overlay.all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlaySource {
    pub path: Option<PathBuf>,
    pub bytes: Vec<u8>,
}

impl OverlaySource {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        Ok(Self {
            path: Some(path.to_path_buf()),
            bytes: std::fs::read(path)?,
        })
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: None,
            bytes: bytes.into(),
        }
    }

    fn located(&self, err: Error) -> Error {
        match (err, &self.path) {
            (Error::Overlay { msg }, Some(path)) => {
                Error::overlay(format!("{}: {msg}", path.display()))
            }
            (err, _) => err,
        }
    }
}

/// Merges `overlay` into `base` and returns the first resulting document as YAML.
pub fn apply(base: Option<&[u8]>, overlay: &OverlaySource) -> Result<String, Error> {
    let base = base.ok_or(Error::MissingBaseSpec)?;
    let base = std::str::from_utf8(base)
        .map_err(|err| Error::invalid_spec(format!("specification is not UTF-8: {err}")))?;

    let annotated = match annotate(overlay.bytes.as_slice())? {
        Some(annotated) => annotated,
        None => String::from_utf8(overlay.bytes.clone())
            .map_err(|err| Error::overlay(format!("overlay is not UTF-8: {err}")))?,
    };

    let overlays = load_overlay(&annotated).map_err(|err| overlay.located(err))?;
    let merged = merge_documents(load_documents(base)?, &overlays)
        .map_err(|err| overlay.located(err))?;

    let document = merged
        .into_iter()
        .next()
        .ok_or_else(|| Error::overlay("merge produced no documents"))?;
    Ok(serde_yaml::to_string(&document)?)
}
