use core::fmt;

#[derive(Debug)]
pub enum Error {
    MalformedInstruction { line: Option<usize>, msg: String },
    TemplateNotFound { name: String, stage: String },
    DuplicateTemplate { name: String },
    MissingBaseImage { stage: String },
    InvalidSpec { msg: String },
    MissingBaseSpec,
    Overlay { msg: String },
    Fetch { url: String, msg: String },
    Io { source: std::io::Error },
}

impl Error {
    pub fn malformed_instruction(line: Option<usize>, msg: impl Into<String>) -> Self {
        Self::MalformedInstruction {
            line,
            msg: msg.into(),
        }
    }

    pub fn template_not_found(name: impl Into<String>, stage: impl Into<String>) -> Self {
        Self::TemplateNotFound {
            name: name.into(),
            stage: stage.into(),
        }
    }

    pub fn duplicate_template(name: impl Into<String>) -> Self {
        Self::DuplicateTemplate { name: name.into() }
    }

    pub fn missing_base_image(stage: impl Into<String>) -> Self {
        Self::MissingBaseImage {
            stage: stage.into(),
        }
    }

    pub fn invalid_spec(msg: impl Into<String>) -> Self {
        Self::InvalidSpec { msg: msg.into() }
    }

    pub fn overlay(msg: impl Into<String>) -> Self {
        Self::Overlay { msg: msg.into() }
    }

    pub fn fetch(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            msg: msg.into(),
        }
    }

    pub fn io(source: std::io::Error) -> Self {
        Self::Io { source }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedInstruction { line, msg } => {
                if let Some(line) = line {
                    write!(f, "malformed instruction at line {line}: {msg}")
                } else {
                    write!(f, "malformed instruction: {msg}")
                }
            }
            Self::TemplateNotFound { name, stage } => {
                write!(f, "template `{name}` referenced by stage `{stage}` not found")
            }
            Self::DuplicateTemplate { name } => write!(f, "template `{name}` is defined twice"),
            Self::MissingBaseImage { stage } => {
                write!(f, "stage `{stage}` has no base image")
            }
            Self::InvalidSpec { msg } => write!(f, "invalid specification: {msg}"),
            Self::MissingBaseSpec => write!(f, "overlay requires a base specification"),
            Self::Overlay { msg } => write!(f, "overlay error: {msg}"),
            Self::Fetch { url, msg } => write!(f, "failed to fetch {url}: {msg}"),
            Self::Io { source } => write!(f, "io error: {source}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Self::Io { source } = self {
            Some(source)
        } else {
            None
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::io(value)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(value: serde_yaml::Error) -> Self {
        Self::invalid_spec(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;

    #[test]
    fn messages_carry_location_context() {
        assert_eq!(
            Error::malformed_instruction(Some(3), "unbalanced quotes").to_string(),
            "malformed instruction at line 3: unbalanced quotes"
        );
        assert_eq!(
            Error::template_not_found("go-build", "builder").to_string(),
            "template `go-build` referenced by stage `builder` not found"
        );
    }
}
