//! Line-level view of block-style YAML.
//!
//! Each line is classified and, when it holds a key or a sequence item,
//! reported together with its path from the document root. Annotations are
//! comments, which YAML parsers discard, so this is how they get tied back to
//! the node that follows them.

use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Renders a path as `steps[0].metadata.labels`.
pub struct PathDisplay<'a>(pub &'a [Segment]);

impl fmt::Display for PathDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<document>");
        }
        for (index, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Key(key) if index == 0 => f.write_str(key)?,
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(position) => write!(f, "[{position}]")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub segment: Segment,
    pub indent: usize,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    Blank,
    Comment(&'a str),
    DocumentStart,
    ScalarContent,
    Entry {
        path: Vec<Node>,
        /// Length of `path` up to the sequence item this line opens, if any.
        item_depth: Option<usize>,
        value: Option<&'a str>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedLine<'a> {
    pub number: usize,
    pub text: &'a str,
    pub kind: LineKind<'a>,
}

pub fn segments(path: &[Node]) -> Vec<Segment> {
    path.iter().map(|node| node.segment.clone()).collect()
}

pub fn scan<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<ScannedLine<'a>> {
    let mut stack: Vec<Node> = Vec::new();
    let mut block_scalar: Option<usize> = None;
    let mut scanned = Vec::new();

    for (index, text) in lines.into_iter().enumerate() {
        let number = index + 1;
        let trimmed = text.trim();
        let indent = text.len() - text.trim_start().len();

        if let Some(parent) = block_scalar {
            if trimmed.is_empty() || indent > parent {
                scanned.push(ScannedLine {
                    number,
                    text,
                    kind: LineKind::ScalarContent,
                });
                continue;
            }
            block_scalar = None;
        }

        let kind = if trimmed.is_empty() || trimmed == "..." {
            LineKind::Blank
        } else if trimmed.starts_with('#') {
            LineKind::Comment(trimmed)
        } else if trimmed == "---" || trimmed.starts_with("--- ") {
            stack.clear();
            LineKind::DocumentStart
        } else {
            let (kind, opens_block) = entry(&mut stack, trimmed, indent, number);
            block_scalar = opens_block;
            kind
        };

        scanned.push(ScannedLine { number, text, kind });
    }

    scanned
}

fn entry<'a>(
    stack: &mut Vec<Node>,
    trimmed: &'a str,
    indent: usize,
    number: usize,
) -> (LineKind<'a>, Option<usize>) {
    let mut column = indent;
    let mut rest = trimmed;
    let mut item_depth = None;

    if rest == "-" || rest.starts_with("- ") {
        while stack.last().is_some_and(|node| node.indent > column) {
            stack.pop();
        }
        let next = match stack.last() {
            Some(Node {
                segment: Segment::Index(previous),
                indent: previous_indent,
                ..
            }) if *previous_indent == column => Some(previous + 1),
            _ => None,
        };
        let position = match next {
            Some(next) => {
                stack.pop();
                next
            }
            None => 0,
        };
        stack.push(Node {
            segment: Segment::Index(position),
            indent: column,
            line: number,
        });
        item_depth = Some(stack.len());

        let after = &rest[1..];
        let after_trimmed = after.trim_start();
        column += 1 + (after.len() - after_trimmed.len());
        rest = after_trimmed;
    }

    let mut value = None;
    let mut block_parent = None;
    if !rest.is_empty() {
        if let Some((key, key_value)) = split_key(rest) {
            while stack.last().is_some_and(|node| node.indent >= column) {
                stack.pop();
            }
            stack.push(Node {
                segment: Segment::Key(key),
                indent: column,
                line: number,
            });
            let key_value = strip_comment(key_value);
            if !key_value.is_empty() {
                value = Some(key_value);
            }
            if opens_block_scalar(key_value) {
                block_parent = Some(column);
            }
        } else {
            let scalar = strip_comment(rest);
            value = Some(scalar);
            if opens_block_scalar(scalar) {
                block_parent = Some(indent);
            }
        }
    }

    (
        LineKind::Entry {
            path: stack.clone(),
            item_depth,
            value,
        },
        block_parent,
    )
}

fn opens_block_scalar(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(chars.next(), Some('|' | '>'))
        && chars.all(|ch| ch.is_ascii_digit() || ch == '-' || ch == '+')
}

/// Splits `key: value`, returning the unquoted key.
fn split_key(text: &str) -> Option<(String, &str)> {
    if let Some(quote) = text.chars().next().filter(|ch| *ch == '"' || *ch == '\'') {
        let close = text[1..].find(quote)? + 1;
        let after = text[close + 1..].trim_start();
        let value = after.strip_prefix(':')?;
        if !value.is_empty() && !value.starts_with(char::is_whitespace) {
            return None;
        }
        return Some((text[1..close].to_string(), value.trim()));
    }

    if text.starts_with(['[', '{', '&', '*', '!', '|', '>']) {
        return None;
    }

    let bytes = text.as_bytes();
    for (index, byte) in bytes.iter().enumerate() {
        match byte {
            b'#' if index > 0 && bytes[index - 1].is_ascii_whitespace() => return None,
            b':' if bytes.get(index + 1).is_none_or(|next| next.is_ascii_whitespace()) => {
                let key = text[..index].trim_end();
                if key.is_empty() {
                    return None;
                }
                return Some((key.to_string(), text[index + 1..].trim()));
            }
            _ => {}
        }
    }
    None
}

/// Drops a trailing ` # comment` outside of quotes.
pub fn strip_comment(value: &str) -> &str {
    let mut quote = None;
    let bytes = value.as_bytes();
    for (index, byte) in bytes.iter().enumerate() {
        match (quote, byte) {
            (None, b'"' | b'\'') => quote = Some(*byte),
            (Some(open), byte) if *byte == open => quote = None,
            (None, b'#') if index == 0 || bytes[index - 1].is_ascii_whitespace() => {
                return value[..index].trim_end();
            }
            _ => {}
        }
    }
    value.trim()
}

pub fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use crate::overlay::scan::{
        LineKind, PathDisplay, Segment, scan, segments, split_key, strip_comment,
    };

    fn paths(text: &str) -> Vec<String> {
        scan(text.lines())
            .into_iter()
            .filter_map(|line| match line.kind {
                LineKind::Entry { path, .. } => {
                    Some(PathDisplay(&segments(&path)).to_string())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn tracks_keys_and_sequence_items() {
        let text = "steps:\n- metadata:\n    name: a\n    labels:\n      overlay: build-1\n  tag: x\n- metadata:\n    name: b\ntemplates: []\n";
        assert_eq!(
            paths(text),
            vec![
                "steps",
                "steps[0].metadata",
                "steps[0].metadata.name",
                "steps[0].metadata.labels",
                "steps[0].metadata.labels.overlay",
                "steps[0].tag",
                "steps[1].metadata",
                "steps[1].metadata.name",
                "templates",
            ]
        );
    }

    #[test]
    fn indented_sequences_and_nested_items() {
        let text = "steps:\n  - stages:\n      - base:\n          image: a\n      - base:\n          image: b\n  - tag: c\n";
        assert_eq!(
            paths(text),
            vec![
                "steps",
                "steps[0].stages",
                "steps[0].stages[0].base",
                "steps[0].stages[0].base.image",
                "steps[0].stages[1].base",
                "steps[0].stages[1].base.image",
                "steps[1].tag",
            ]
        );
    }

    #[test]
    fn block_scalars_are_opaque() {
        let text = "run: |\n  overlay: not-a-key\n  - not-an-item\nnext: 1\n";
        let scanned = scan(text.lines());
        assert_eq!(scanned[1].kind, LineKind::ScalarContent);
        assert_eq!(scanned[2].kind, LineKind::ScalarContent);
        assert_eq!(paths(text), vec!["run", "next"]);
    }

    #[test]
    fn item_depth_points_at_opened_item() {
        let scanned = scan("steps:\n- metadata:\n    name: a\n".lines());
        match &scanned[1].kind {
            LineKind::Entry {
                path, item_depth, ..
            } => {
                assert_eq!(*item_depth, Some(2));
                assert_eq!(path[1].segment, Segment::Index(0));
                assert_eq!(path[1].line, 2);
            }
            other => panic!("expected entry, got {other:?}"),
        }
    }

    #[test]
    fn splits_keys_but_not_urls_or_quoted_scalars() {
        assert_eq!(split_key("name: app"), Some(("name".to_string(), "app")));
        assert_eq!(split_key("\"a: b\": c"), Some(("a: b".to_string(), "c")));
        assert_eq!(split_key("url: http://x"), Some(("url".to_string(), "http://x")));
        assert_eq!(split_key("http://example.com"), None);
        assert_eq!(split_key("\"overlay: x\""), None);
        assert_eq!(strip_comment("build-1 # anchor"), "build-1");
        assert_eq!(strip_comment("\"a # b\""), "\"a # b\"");
    }
}
