pub mod ansible;
pub mod compile;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod exit_code;
pub mod model;
pub mod overlay;
pub mod parser;
pub mod resolve;
pub mod reverse;
pub mod spec;

pub use crate::compile::{compile_all, render};
pub use crate::context::{
    BuildContext, LocalContext, NoRemoteFetch, RemoteFetch, ResolveCredential, StaticCredentials,
};
pub use crate::diagnostics::{Diagnostics, Event, NoopDiagnostics, TracingDiagnostics};
pub use crate::error::Error;
pub use crate::exit_code::ExitCode;
pub use crate::model::Instruction;
pub use crate::overlay::OverlaySource;
pub use crate::resolve::Resolver;
pub use crate::reverse::reverse;
pub use crate::spec::{
    AnsibleStep, BaseImage, BuildStep, BuildTemplateStep, CredentialSpec, DockerStep, Metadata,
    Specification, Stage, Template,
};
