//! Structural merge of annotated overlay documents into base documents.
//!
//! Annotations are comments, so they are read off the overlay text with the
//! line scanner and keyed by node path; the document bodies themselves go
//! through `serde_yaml`.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_yaml::Value;

use crate::error::Error;
use crate::overlay::directive::{Action, Annotation, Expects, Matcher, parse_directive};
use crate::overlay::scan::{LineKind, PathDisplay, Segment, scan, segments};

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayDocument {
    pub annotation: Annotation,
    pub body: Value,
    nodes: BTreeMap<Vec<Segment>, Annotation>,
}

impl OverlayDocument {
    fn annotation_at(&self, path: &[Segment]) -> Annotation {
        self.nodes.get(path).cloned().unwrap_or_default()
    }
}

#[derive(Default)]
struct DocumentBuilder {
    annotation: Annotation,
    nodes: BTreeMap<Vec<Segment>, Annotation>,
    text: String,
    has_entries: bool,
}

impl DocumentBuilder {
    fn finish(self, documents: &mut Vec<OverlayDocument>) -> Result<(), Error> {
        if !self.has_entries {
            return Ok(());
        }
        let body = serde_yaml::from_str(&self.text)
            .map_err(|err| Error::overlay(format!("invalid overlay document: {err}")))?;
        documents.push(OverlayDocument {
            annotation: self.annotation,
            body,
            nodes: self.nodes,
        });
        Ok(())
    }
}

/// Splits annotated overlay text into documents with their annotations.
///
/// Directives in front of `---` belong to the document; any other directive
/// belongs to the next key or sequence item.
pub fn load_overlay(text: &str) -> Result<Vec<OverlayDocument>, Error> {
    let mut documents = Vec::new();
    let mut current = DocumentBuilder::default();
    let mut pending: Option<(usize, Annotation)> = None;

    for line in scan(text.lines()) {
        match line.kind {
            LineKind::Comment(comment) => {
                if let Some(directive) = parse_directive(comment, line.number)? {
                    pending
                        .get_or_insert_with(|| (line.number, Annotation::default()))
                        .1
                        .absorb(directive);
                }
                continue;
            }
            LineKind::DocumentStart => {
                std::mem::take(&mut current).finish(&mut documents)?;
                if let Some((_, annotation)) = pending.take() {
                    current.annotation = annotation;
                }
                continue;
            }
            LineKind::Entry {
                ref path,
                item_depth,
                ..
            } => {
                if let Some((_, annotation)) = pending.take() {
                    let target = match item_depth {
                        Some(depth) => segments(&path[..depth]),
                        None => segments(path),
                    };
                    current.nodes.insert(target, annotation);
                }
                current.has_entries = true;
            }
            LineKind::Blank | LineKind::ScalarContent => {}
        }
        current.text.push_str(line.text);
        current.text.push('\n');
    }

    if let Some((line, _)) = pending {
        return Err(Error::overlay(format!(
            "line {line}: annotation is not followed by a node"
        )));
    }
    current.finish(&mut documents)?;
    Ok(documents)
}

/// Loads every document of a multi-document YAML stream.
pub fn load_documents(text: &str) -> Result<Vec<Value>, Error> {
    serde_yaml::Deserializer::from_str(text)
        .map(|document| Value::deserialize(document).map_err(Error::from))
        .filter(|document| !matches!(document, Ok(Value::Null)))
        .collect()
}

/// Applies each overlay document in order to the base documents.
pub fn merge_documents(
    mut base: Vec<Value>,
    overlays: &[OverlayDocument],
) -> Result<Vec<Value>, Error> {
    for overlay in overlays {
        let annotation = &overlay.annotation;
        let matcher = annotation.matcher.clone().unwrap_or(Matcher::All);
        let default = if matcher == Matcher::All {
            Expects::AtLeast(1)
        } else {
            Expects::Exactly(1)
        };

        let mut path = Vec::new();
        place(
            &mut base,
            &overlay.body,
            annotation,
            &matcher,
            default,
            &mut path,
            overlay,
        )?;
    }
    Ok(base)
}

fn merge_node(
    base: &mut Value,
    overlay: &Value,
    path: &mut Vec<Segment>,
    document: &OverlayDocument,
) -> Result<(), Error> {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                path.push(Segment::Key(key_text(key)));
                let annotation = document.annotation_at(path);
                match annotation.action() {
                    Action::Remove => {
                        if base_map.remove(key).is_none() && !annotation.missing_ok {
                            return Err(Error::overlay(format!(
                                "{}: cannot remove a key the base does not have",
                                PathDisplay(path)
                            )));
                        }
                    }
                    Action::Replace => {
                        base_map.insert(key.clone(), value.clone());
                    }
                    Action::Merge | Action::Append => match base_map.get_mut(key) {
                        Some(existing) => merge_node(existing, value, path, document)?,
                        None => {
                            base_map.insert(key.clone(), value.clone());
                        }
                    },
                }
                path.pop();
            }
        }
        (Value::Sequence(base_items), Value::Sequence(overlay_items)) => {
            for (index, item) in overlay_items.iter().enumerate() {
                path.push(Segment::Index(index));
                let annotation = document.annotation_at(path);
                match &annotation.matcher {
                    Some(matcher) if annotation.action() != Action::Append => place(
                        base_items,
                        item,
                        &annotation,
                        matcher,
                        Expects::Exactly(1),
                        path,
                        document,
                    )?,
                    _ => base_items.push(item.clone()),
                }
                path.pop();
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
    Ok(())
}

/// Applies `overlay` to the items selected by `matcher`.
fn place(
    items: &mut Vec<Value>,
    overlay: &Value,
    annotation: &Annotation,
    matcher: &Matcher,
    default: Expects,
    path: &mut Vec<Segment>,
    document: &OverlayDocument,
) -> Result<(), Error> {
    if annotation.action() == Action::Append {
        items.push(overlay.clone());
        return Ok(());
    }

    let matched: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(index, item)| selects(matcher, *index, item, overlay))
        .map(|(index, _)| index)
        .collect();

    if !annotation.accepts(matched.len(), default) {
        return Err(Error::overlay(format!(
            "{}: expected {} matching node(s), found {}",
            PathDisplay(path),
            annotation.expects.unwrap_or(default),
            matched.len()
        )));
    }
    if matched.is_empty() {
        if annotation.action() != Action::Remove {
            items.push(overlay.clone());
        }
        return Ok(());
    }

    match annotation.action() {
        Action::Remove => {
            for index in matched.into_iter().rev() {
                items.remove(index);
            }
        }
        Action::Replace => {
            for index in matched {
                items[index] = overlay.clone();
            }
        }
        Action::Merge | Action::Append => {
            for index in matched {
                merge_node(&mut items[index], overlay, path, document)?;
            }
        }
    }
    Ok(())
}

fn selects(matcher: &Matcher, index: usize, item: &Value, overlay: &Value) -> bool {
    match matcher {
        Matcher::All => true,
        Matcher::Subset(pattern) => is_subset(pattern, item),
        Matcher::Index(wanted) => index == *wanted,
        Matcher::MapKey(key) => match (item.get(key.as_str()), overlay.get(key.as_str())) {
            (Some(existing), Some(wanted)) => is_subset(wanted, existing),
            _ => false,
        },
    }
}

/// True when every entry of `pattern` is present in `value`.
fn is_subset(pattern: &Value, value: &Value) -> bool {
    match (pattern, value) {
        (Value::Mapping(pattern), Value::Mapping(value)) => pattern
            .iter()
            .all(|(key, expected)| value.get(key).is_some_and(|found| is_subset(expected, found))),
        (Value::Sequence(pattern), Value::Sequence(value)) => {
            pattern.len() == value.len()
                && pattern
                    .iter()
                    .zip(value)
                    .all(|(expected, found)| is_subset(expected, found))
        }
        (Value::Tagged(pattern), Value::Tagged(value)) => {
            pattern.tag == value.tag && is_subset(&pattern.value, &value.value)
        }
        (pattern, value) => match (scalar_text(pattern), scalar_text(value)) {
            (Some(expected), Some(found)) => expected == found,
            _ => false,
        },
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some("null".to_string()),
        Value::Bool(value) => Some(value.to_string()),
        Value::Number(value) => Some(value.to_string()),
        Value::String(value) => Some(value.clone()),
        _ => None,
    }
}

fn key_text(key: &Value) -> String {
    scalar_text(key).unwrap_or_default()
}
