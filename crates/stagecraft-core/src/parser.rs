use std::path::Path;

use dockerfile_parser::Dockerfile;

use crate::error::Error;
use crate::model::Instruction;

const KEYWORDS: &[&str] = &[
    "add",
    "arg",
    "cmd",
    "copy",
    "entrypoint",
    "env",
    "expose",
    "from",
    "healthcheck",
    "label",
    "maintainer",
    "onbuild",
    "run",
    "shell",
    "stopsignal",
    "user",
    "volume",
    "workdir",
];

/// Not allowed after `ONBUILD`.
const ONBUILD_FORBIDDEN: &[&str] = &["onbuild", "from", "maintainer"];

/// Keywords whose shell form is a single command string rather than a word list.
const SHELL_FORM_KEYWORDS: &[&str] = &["run", "cmd", "entrypoint", "shell", "healthcheck"];

pub fn parse_instructions(input: &str) -> Result<Vec<Instruction>, Error> {
    let dockerfile = match Dockerfile::parse(input) {
        Ok(dockerfile) => dockerfile,
        Err(err) => {
            tracing::debug!(error = %err, "splitting instructions line by line");
            return logical_lines(input)
                .into_iter()
                .map(|(start_line, raw)| decompose(raw.trim_end(), start_line))
                .collect();
        }
    };

    let line_index = LineIndex::new(&dockerfile.content);

    dockerfile
        .instructions
        .iter()
        .map(|instruction| {
            let span = instruction.span();
            let raw = span_slice(&dockerfile.content, span.start, span.end)?;
            let start_line = line_index.line_for_offset(span.start);
            decompose(raw.trim_end(), start_line)
        })
        .collect()
}

pub fn parse_file(path: &Path) -> Result<Vec<Instruction>, Error> {
    let content = std::fs::read_to_string(path)?;
    parse_instructions(&content)
}

/// Splits one instruction's source text into keyword, flags and arguments.
fn decompose(raw: &str, start_line: usize) -> Result<Instruction, Error> {
    let logical = join_continuations(raw);
    let (keyword, rest) = split_keyword(&logical);
    if keyword.is_empty() {
        return Err(Error::malformed_instruction(
            Some(start_line),
            "missing instruction keyword",
        ));
    }

    let cmd = keyword.to_ascii_lowercase();
    if !KEYWORDS.contains(&cmd.as_str()) {
        return Err(Error::malformed_instruction(
            Some(start_line),
            format!("unknown instruction `{keyword}`"),
        ));
    }
    let mut instruction = Instruction {
        original: raw.to_string(),
        start_line,
        ..Instruction::default()
    };

    if cmd == "onbuild" {
        let (nested, nested_rest) = split_keyword(rest);
        if nested.is_empty() {
            return Err(Error::malformed_instruction(
                Some(start_line),
                "ONBUILD requires a nested instruction",
            ));
        }
        let nested_cmd = nested.to_ascii_lowercase();
        if !KEYWORDS.contains(&nested_cmd.as_str())
            || ONBUILD_FORBIDDEN.contains(&nested_cmd.as_str())
        {
            return Err(Error::malformed_instruction(
                Some(start_line),
                format!("`{nested}` is not allowed after ONBUILD"),
            ));
        }
        let nested = nested_cmd;
        fill_arguments(&mut instruction, &nested, nested_rest)?;
        instruction.sub_cmd = Some(nested);
    } else {
        fill_arguments(&mut instruction, &cmd, rest)?;
    }

    instruction.cmd = cmd;
    Ok(instruction)
}

fn fill_arguments(instruction: &mut Instruction, cmd: &str, rest: &str) -> Result<(), Error> {
    let mut rest = rest.trim();
    while rest.starts_with("--") {
        let (flag, remainder) = split_keyword(rest);
        instruction.flags.push(flag.to_string());
        rest = remainder;
    }

    if rest.starts_with('[') {
        if let Ok(elements) = serde_json::from_str::<Vec<String>>(rest) {
            instruction.is_json = true;
            instruction.value = elements;
            return Ok(());
        }
    }

    if SHELL_FORM_KEYWORDS.contains(&cmd) {
        if !rest.is_empty() {
            instruction.value.push(rest.to_string());
        }
        return Ok(());
    }

    instruction.value = split_words(rest).ok_or_else(|| {
        Error::malformed_instruction(Some(instruction.start_line), "unbalanced quotes")
    })?;
    Ok(())
}

fn split_keyword(input: &str) -> (&str, &str) {
    let input = input.trim();
    match input.find(char::is_whitespace) {
        Some(pos) => (&input[..pos], input[pos..].trim_start()),
        None => (input, ""),
    }
}

/// Groups source lines into instructions, returning each with its first line
/// number. Comment and blank lines between instructions are skipped.
fn logical_lines(input: &str) -> Vec<(usize, String)> {
    let mut logical = Vec::new();
    let mut current: Option<(usize, Vec<&str>)> = None;

    for (index, line) in input.lines().enumerate() {
        let trimmed = line.trim();
        let skipped = trimmed.is_empty() || trimmed.starts_with('#');
        let continues = trimmed.ends_with('\\');

        if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
            if skipped || continues {
                continue;
            }
            if let Some((start_line, lines)) = current.take() {
                logical.push((start_line, lines.join("\n")));
            }
            continue;
        }

        if skipped {
            continue;
        }
        if continues {
            current = Some((index + 1, vec![line.trim_start()]));
        } else {
            logical.push((index + 1, line.trim_start().to_string()));
        }
    }

    if let Some((start_line, lines)) = current {
        logical.push((start_line, lines.join("\n")));
    }
    logical
}

/// Joins `\`-continued lines and drops comment lines inside the continuation.
fn join_continuations(raw: &str) -> String {
    let mut pieces = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if index > 0 && (trimmed.is_empty() || trimmed.starts_with('#')) {
            continue;
        }
        let piece = trimmed.strip_suffix('\\').unwrap_or(trimmed).trim_end();
        if !piece.is_empty() {
            pieces.push(piece);
        }
    }
    pieces.join(" ")
}

/// Whitespace split that keeps quoted sections (quotes included) in one word.
fn split_words(input: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in input.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match (quote, ch) {
            (_, '\\') => {
                current.push(ch);
                escaped = true;
            }
            (Some(open), ch) if ch == open => {
                current.push(ch);
                quote = None;
            }
            (Some(_), ch) => current.push(ch),
            (None, '"' | '\'') => {
                current.push(ch);
                quote = Some(ch);
            }
            (None, ch) if ch.is_whitespace() => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            (None, ch) => current.push(ch),
        }
    }

    if quote.is_some() {
        return None;
    }
    if !current.is_empty() {
        words.push(current);
    }
    Some(words)
}

fn span_slice(content: &str, start: usize, end: usize) -> Result<String, Error> {
    let bytes = content.as_bytes();
    if start > end || end > bytes.len() {
        return Err(Error::malformed_instruction(
            None,
            format!("invalid instruction span {start}..{end}"),
        ));
    }

    let slice = &bytes[start..end];
    let text = std::str::from_utf8(slice).map_err(|_| {
        Error::malformed_instruction(None, format!("invalid utf-8 in span {start}..{end}"))
    })?;
    Ok(text.to_string())
}

struct LineIndex {
    newline_offsets: Vec<usize>,
}

impl LineIndex {
    fn new(content: &str) -> Self {
        let newline_offsets = content
            .as_bytes()
            .iter()
            .enumerate()
            .filter_map(|(index, byte)| (*byte == b'\n').then_some(index))
            .collect();
        Self { newline_offsets }
    }

    fn line_for_offset(&self, offset: usize) -> usize {
        self.newline_offsets
            .partition_point(|value| *value < offset)
            + 1
    }
}
