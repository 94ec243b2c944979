use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    MalformedInstruction = 2,
    Template = 3,
    InvalidSpec = 4,
    Overlay = 5,
    Io = 6,
    Fetch = 7,
    Usage = 64,
}

impl ExitCode {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

impl From<&Error> for ExitCode {
    fn from(value: &Error) -> Self {
        match value {
            Error::MalformedInstruction { .. } => Self::MalformedInstruction,
            Error::TemplateNotFound { .. } | Error::DuplicateTemplate { .. } => Self::Template,
            Error::MissingBaseImage { .. } | Error::InvalidSpec { .. } => Self::InvalidSpec,
            Error::MissingBaseSpec | Error::Overlay { .. } => Self::Overlay,
            Error::Fetch { .. } => Self::Fetch,
            Error::Io { .. } => Self::Io,
        }
    }
}
