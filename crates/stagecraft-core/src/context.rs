//! Seams to the collaborators that materialize inputs for the compiler:
//! build contexts, remote fragment downloads and credentials.

use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::spec::CredentialSpec;

pub trait BuildContext {
    /// Materializes the context and returns the directory build files go into.
    fn read(&self) -> Result<PathBuf, Error>;
}

/// A context that already exists on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalContext {
    path: PathBuf,
}

impl LocalContext {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for LocalContext {
    fn default() -> Self {
        Self::new(".")
    }
}

impl BuildContext for LocalContext {
    fn read(&self) -> Result<PathBuf, Error> {
        let metadata = std::fs::metadata(&self.path)?;
        if !metadata.is_dir() {
            return Err(Error::io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("build context {} is not a directory", self.path.display()),
            )));
        }
        Ok(self.path.clone())
    }
}

pub trait RemoteFetch {
    /// Downloads `url` into `dest`; `dest` is parsed as a Dockerfile fragment afterwards.
    fn fetch(&self, url: &str, dest: &Path, credentials: Option<&CredentialSpec>)
    -> Result<(), Error>;
}

/// Rejects every download. Used when no fetcher is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemoteFetch;

impl RemoteFetch for NoRemoteFetch {
    fn fetch(
        &self,
        url: &str,
        _dest: &Path,
        _credentials: Option<&CredentialSpec>,
    ) -> Result<(), Error> {
        Err(Error::fetch(url, "remote fetching is not configured"))
    }
}

pub trait ResolveCredential {
    fn resolve(&self, spec: &CredentialSpec) -> Result<String, Error>;
}

/// Resolves inline values and environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticCredentials;

impl ResolveCredential for StaticCredentials {
    fn resolve(&self, spec: &CredentialSpec) -> Result<String, Error> {
        match spec {
            CredentialSpec::Plain(value) => Ok(value.clone()),
            CredentialSpec::Env(name) => std::env::var(name).map_err(|_| {
                Error::invalid_spec(format!("credential variable `{name}` is not set"))
            }),
        }
    }
}
