use std::collections::BTreeMap;
use std::io::BufRead;

use serde_yaml::Value;

use crate::error::Error;
use crate::overlay::scan::{LineKind, Node, ScannedLine, Segment, scan, unquote};
use crate::overlay::{LOAD_DIRECTIVE, MATCH_ALL_DIRECTIVE};

/// Adds match annotations to an overlay document.
///
/// Every sequence item carrying `metadata.labels.overlay: <label>`, in block or
/// flow style, gets an `overlay.subset` match on that label inserted in front of it, and each
/// document is matched against all base documents. Input that already starts
/// with the load directive is left alone and yields `None`.
pub fn annotate<R: BufRead>(mut reader: R) -> Result<Option<String>, Error> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;

    if text.lines().next().map(str::trim) == Some(LOAD_DIRECTIVE) {
        return Ok(None);
    }

    let scanned = scan(text.lines());
    let anchors = anchors(&scanned);

    let mut out = String::with_capacity(text.len() + 128);
    out.push_str(LOAD_DIRECTIVE);
    out.push('\n');
    out.push_str(MATCH_ALL_DIRECTIVE);
    out.push_str("\n---\n");

    let mut seen_entry = false;
    let mut skipped_start = false;
    for line in &scanned {
        match line.kind {
            LineKind::DocumentStart if !seen_entry && !skipped_start => {
                skipped_start = true;
                continue;
            }
            LineKind::DocumentStart => {
                out.push_str(MATCH_ALL_DIRECTIVE);
                out.push('\n');
            }
            LineKind::Entry { .. } => seen_entry = true,
            _ => {}
        }

        if let Some((indent, label)) = anchors.get(&line.number) {
            out.push_str(&" ".repeat(*indent));
            out.push_str(&subset_directive(label));
            out.push('\n');
        }
        out.push_str(line.text);
        out.push('\n');
    }

    Ok(Some(out))
}

const LABEL_PATH: [&str; 3] = ["metadata", "labels", "overlay"];

/// Maps the line opening each anchored sequence item to its indent and label.
fn anchors(scanned: &[ScannedLine<'_>]) -> BTreeMap<usize, (usize, String)> {
    let mut anchors = BTreeMap::new();
    for line in scanned {
        let LineKind::Entry {
            path,
            value: Some(value),
            ..
        } = &line.kind
        else {
            continue;
        };
        if let Some((item, label)) = anchored_item(path, value) {
            anchors.entry(item.line).or_insert((item.indent, label));
        }
    }
    anchors
}

/// Finds the item whose label path ends on this entry. Keys after the nearest
/// sequence item must follow `metadata.labels.overlay`; whatever part of it the
/// path stops short of is looked up in a flow mapping value.
fn anchored_item<'a>(path: &'a [Node], value: &str) -> Option<(&'a Node, String)> {
    let position = path
        .iter()
        .rposition(|node| matches!(node.segment, Segment::Index(_)))?;
    let keys = &path[position + 1..];
    if keys.len() > LABEL_PATH.len() {
        return None;
    }
    let on_label_path = keys
        .iter()
        .zip(LABEL_PATH)
        .all(|(node, key)| matches!(&node.segment, Segment::Key(name) if name == key));
    if !on_label_path {
        return None;
    }

    let remaining = &LABEL_PATH[keys.len()..];
    let label = if remaining.is_empty() {
        unquote(value).to_string()
    } else {
        flow_label(value, remaining)?
    };
    Some((&path[position], label))
}

fn flow_label(value: &str, keys: &[&str]) -> Option<String> {
    if !value.starts_with('{') {
        return None;
    }
    let parsed: Value = serde_yaml::from_str(value).ok()?;
    let found = keys.iter().try_fold(&parsed, |node, key| node.get(*key))?;
    match found {
        Value::String(label) => Some(label.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn subset_directive(label: &str) -> String {
    format!(
        r#"#@overlay/match by=overlay.subset({{"metadata":{{"labels":{{"overlay":{}}}}}}})"#,
        serde_json::Value::from(label)
    )
}
