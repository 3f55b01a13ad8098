//! Byte transfer: retrieving resource payloads named by URI.

use std::future::Future;

use anyhow::Context;
use url::Url;

/// Retrieves the bytes behind a source URI.
pub trait ResourceFetcher: Send + Sync {
    fn fetch(&self, uri: &Url) -> impl Future<Output = anyhow::Result<Vec<u8>>> + Send;
}

/// Fetches `file://` URIs from disk and `http(s)://` URIs over the network.
#[derive(Debug, Clone)]
pub struct UriResourceFetcher {
    client: reqwest::Client,
}

impl UriResourceFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("keel/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    async fn fetch_file(uri: &Url) -> anyhow::Result<Vec<u8>> {
        let path = uri
            .to_file_path()
            .map_err(|()| anyhow::anyhow!("Not a local file URI: {}", uri))?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read resource file: {}", path.display()))
    }

    async fn fetch_http(&self, uri: &Url) -> anyhow::Result<Vec<u8>> {
        let response = self
            .client
            .get(uri.clone())
            .send()
            .await
            .with_context(|| format!("Failed to download resource from {}", uri))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Failed to download resource: HTTP {} from {}",
                response.status(),
                uri
            );
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body from {}", uri))?;

        Ok(bytes.to_vec())
    }
}

impl ResourceFetcher for UriResourceFetcher {
    async fn fetch(&self, uri: &Url) -> anyhow::Result<Vec<u8>> {
        match uri.scheme() {
            "file" => Self::fetch_file(uri).await,
            "http" | "https" => self.fetch_http(uri).await,
            other => anyhow::bail!("Unsupported resource URI scheme '{}': {}", other, uri),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fetch_file_uri() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lib-1.0.0.bundle");
        std::fs::write(&path, b"bytes").unwrap();

        let fetcher = UriResourceFetcher::new().unwrap();
        let uri = Url::from_file_path(&path).unwrap();

        assert_eq!(fetcher.fetch(&uri).await.unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn test_fetch_missing_file_fails() {
        let tmp = TempDir::new().unwrap();
        let fetcher = UriResourceFetcher::new().unwrap();
        let uri = Url::from_file_path(tmp.path().join("missing")).unwrap();

        let err = fetcher.fetch(&uri).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read resource file"));
    }

    #[tokio::test]
    async fn test_unsupported_scheme_fails() {
        let fetcher = UriResourceFetcher::new().unwrap();
        let uri = Url::parse("ftp://example.com/lib.bundle").unwrap();
        assert!(fetcher.fetch(&uri).await.is_err());
    }
}
