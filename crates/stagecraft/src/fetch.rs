use std::path::Path;

use reqwest::blocking::Client;
use stagecraft_core::context::{RemoteFetch, ResolveCredential};
use stagecraft_core::{CredentialSpec, Error};

/// Downloads `url` build steps over HTTP, sending credentials as a bearer token.
pub struct HttpFetch<C> {
    client: Client,
    credentials: C,
}

impl<C: ResolveCredential> HttpFetch<C> {
    pub fn new(credentials: C) -> Self {
        Self {
            client: Client::new(),
            credentials,
        }
    }
}

impl<C: ResolveCredential> RemoteFetch for HttpFetch<C> {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        credentials: Option<&CredentialSpec>,
    ) -> Result<(), Error> {
        let mut request = self.client.get(url);
        if let Some(spec) = credentials {
            request = request.bearer_auth(self.credentials.resolve(spec)?);
        }

        tracing::debug!(url, dest = %dest.display(), "fetching build fragment");
        let response = request
            .send()
            .map_err(|err| Error::fetch(url, err.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::fetch(url, format!("HTTP {}", response.status())));
        }

        let body = response
            .bytes()
            .map_err(|err| Error::fetch(url, format!("failed to read response body: {err}")))?;
        std::fs::write(dest, &body)?;
        Ok(())
    }
}
