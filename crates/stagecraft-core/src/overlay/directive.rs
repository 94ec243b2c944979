use core::fmt;

use serde_yaml::Value;

use crate::error::Error;

/// Selects which base nodes an overlay node applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    All,
    Subset(Value),
    Index(usize),
    MapKey(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expects {
    Exactly(usize),
    AtLeast(usize),
}

impl Expects {
    pub fn allows(self, count: usize) -> bool {
        match self {
            Self::Exactly(expected) => count == expected,
            Self::AtLeast(minimum) => count >= minimum,
        }
    }
}

impl fmt::Display for Expects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exactly(expected) => write!(f, "{expected}"),
            Self::AtLeast(minimum) => write!(f, "at least {minimum}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Merge,
    Replace,
    Remove,
    Append,
}

/// Everything the annotations in front of one node asked for.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Annotation {
    pub matcher: Option<Matcher>,
    pub expects: Option<Expects>,
    pub missing_ok: bool,
    pub action: Option<Action>,
}

impl Annotation {
    pub fn action(&self) -> Action {
        self.action.unwrap_or_default()
    }

    /// Checks how many base nodes matched against `expects` and `missing_ok`.
    pub fn accepts(&self, count: usize, default: Expects) -> bool {
        let expects = self.expects.unwrap_or(default);
        expects.allows(count) || (self.missing_ok && count == 0)
    }

    pub fn absorb(&mut self, directive: Directive) {
        match directive {
            Directive::Match {
                matcher,
                expects,
                missing_ok,
            } => {
                if matcher.is_some() {
                    self.matcher = matcher;
                }
                if expects.is_some() {
                    self.expects = expects;
                }
                self.missing_ok |= missing_ok;
            }
            Directive::Action(action) => self.action = Some(action),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Match {
        matcher: Option<Matcher>,
        expects: Option<Expects>,
        missing_ok: bool,
    },
    Action(Action),
}

/// Parses one comment line. Plain comments and `load` statements yield `None`.
pub fn parse_directive(comment: &str, line: usize) -> Result<Option<Directive>, Error> {
    let comment = comment.trim();
    let Some(body) = comment.strip_prefix("#@") else {
        return Ok(None);
    };
    let body = body.trim();
    if body.starts_with("load(") {
        return Ok(None);
    }

    let (name, args) = match body.find(char::is_whitespace) {
        Some(pos) => (&body[..pos], body[pos..].trim()),
        None => (body, ""),
    };

    let action = match name {
        "overlay/match" => return parse_match(args, line).map(Some),
        "overlay/merge" => Action::Merge,
        "overlay/replace" => Action::Replace,
        "overlay/remove" => Action::Remove,
        "overlay/append" => Action::Append,
        _ => {
            return Err(Error::overlay(format!(
                "line {line}: unsupported annotation `{comment}`"
            )));
        }
    };

    if !args.is_empty() {
        return Err(Error::overlay(format!(
            "line {line}: `{name}` does not take arguments"
        )));
    }
    Ok(Some(Directive::Action(action)))
}

fn parse_match(args: &str, line: usize) -> Result<Directive, Error> {
    let mut matcher = None;
    let mut expects = None;
    let mut missing_ok = false;

    for arg in split_args(args) {
        let Some((key, value)) = arg.split_once('=') else {
            return Err(Error::overlay(format!(
                "line {line}: expected key=value argument, found `{arg}`"
            )));
        };
        let value = value.trim();
        match key.trim() {
            "by" => matcher = Some(parse_matcher(value, line)?),
            "expects" => expects = Some(parse_expects(value, line)?),
            "missing_ok" => missing_ok = parse_bool(value, line)?,
            other => {
                return Err(Error::overlay(format!(
                    "line {line}: unsupported overlay/match argument `{other}`"
                )));
            }
        }
    }

    Ok(Directive::Match {
        matcher,
        expects,
        missing_ok,
    })
}

fn parse_matcher(value: &str, line: usize) -> Result<Matcher, Error> {
    if value == "overlay.all" {
        return Ok(Matcher::All);
    }
    if let Some(inner) = call_argument(value, "overlay.subset") {
        let pattern: Value = serde_yaml::from_str(inner)
            .map_err(|err| Error::overlay(format!("line {line}: invalid subset pattern: {err}")))?;
        return Ok(Matcher::Subset(pattern));
    }
    if let Some(inner) = call_argument(value, "overlay.index") {
        let index = inner.trim().parse().map_err(|_| {
            Error::overlay(format!("line {line}: invalid index `{inner}`"))
        })?;
        return Ok(Matcher::Index(index));
    }
    if let Some(inner) = call_argument(value, "overlay.map_key") {
        return Ok(Matcher::MapKey(string_literal(inner, line)?));
    }
    if value.starts_with(['"', '\'']) {
        return Ok(Matcher::MapKey(string_literal(value, line)?));
    }

    Err(Error::overlay(format!(
        "line {line}: unsupported matcher `{value}`"
    )))
}

fn parse_expects(value: &str, line: usize) -> Result<Expects, Error> {
    let text = if value.starts_with(['"', '\'']) {
        string_literal(value, line)?
    } else {
        value.to_string()
    };
    let invalid = || Error::overlay(format!("line {line}: invalid expects value `{value}`"));

    match text.strip_suffix('+') {
        Some(minimum) => Ok(Expects::AtLeast(
            minimum.trim().parse().map_err(|_| invalid())?,
        )),
        None => Ok(Expects::Exactly(text.trim().parse().map_err(|_| invalid())?)),
    }
}

fn parse_bool(value: &str, line: usize) -> Result<bool, Error> {
    match value {
        "True" | "true" => Ok(true),
        "False" | "false" => Ok(false),
        _ => Err(Error::overlay(format!(
            "line {line}: expected True or False, found `{value}`"
        ))),
    }
}

fn call_argument<'a>(value: &'a str, function: &str) -> Option<&'a str> {
    value
        .strip_prefix(function)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
}

fn string_literal(value: &str, line: usize) -> Result<String, Error> {
    let value = value.trim();
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if !quoted {
        return Err(Error::overlay(format!(
            "line {line}: expected a string literal, found `{value}`"
        )));
    }
    Ok(value[1..value.len() - 1].to_string())
}

/// Splits on commas that are not nested in brackets or quotes.
fn split_args(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote = None;
    let mut start = 0;

    for (index, ch) in args.char_indices() {
        match (quote, ch) {
            (Some(open), ch) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(args[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    let last = args[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}
