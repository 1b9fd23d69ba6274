use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use http::{header::CONTENT_TYPE, HeaderValue, Request, Response, StatusCode};
use log::trace;

use crate::error::TaskError;

/// Produces the response for an intercepted request.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TaskError>;
}

/// Forwards intercepted requests to the network.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TaskError> {
        let url = request.uri().to_string();
        let fetch_error = |e: reqwest::Error| TaskError::Fetch { url: url.clone(), message: e.to_string() };

        let request = reqwest::Request::try_from(request).map_err(fetch_error)?;
        trace!("forwarding {} {}", request.method(), request.url());
        let upstream = self.client.execute(request).await.map_err(fetch_error)?;
        let status = upstream.status();
        let headers = upstream.headers().clone();
        let body = upstream.bytes().await.map_err(fetch_error)?;

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Serves files below a root directory, addressing them by URL path.
/// The URL authority is ignored, so `app-resource://bundle/index.html`
/// maps to `<root>/index.html`.
#[derive(Clone, Debug)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, url_path: &str) -> Option<PathBuf> {
        let relative = Path::new(url_path.trim_start_matches('/'));
        // only plain names; no `..`, no absolute paths
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl Fetch for FileFetcher {
    async fn fetch(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TaskError> {
        let url = request.uri().to_string();
        let path = self.resolve(request.uri().path())
            .ok_or_else(|| TaskError::NotFound(url.clone()))?;

        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(TaskError::NotFound(url)),
            Err(e) => return Err(TaskError::Fetch { url, message: e.to_string() }),
        };

        let mime = mime_guess::from_path(&path).first_or_octet_stream();
        let content_type = HeaderValue::from_str(mime.as_ref())
            .map_err(|e| TaskError::from(anyhow::anyhow!("invalid content type {mime}: {e}")))?;

        let mut response = Response::new(Bytes::from(body));
        *response.status_mut() = StatusCode::OK;
        response.headers_mut().insert(CONTENT_TYPE, content_type);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(uri: &str) -> Request<Bytes> {
        let mut request = Request::new(Bytes::new());
        *request.uri_mut() = uri.parse().unwrap();
        request
    }

    #[tokio::test]
    async fn serves_files_with_guessed_content_type() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("pages")).unwrap();
        std::fs::write(dir.path().join("pages").join("bing.html"), b"<html></html>").unwrap();
        let fetcher = FileFetcher::new(dir.path());

        let response = fetcher.fetch(get("easydict-resource://bundle/pages/bing.html")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html");
        assert_eq!(response.body().as_ref(), b"<html></html>");
    }

    #[tokio::test]
    async fn missing_and_escaping_paths_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FileFetcher::new(dir.path().join("www"));

        for uri in ["easydict-resource://bundle/nothing.html", "easydict-resource://bundle/../secret.txt"] {
            let err = fetcher.fetch(get(uri)).await.unwrap_err();
            assert!(matches!(err, TaskError::NotFound(_)), "{uri}: {err}");
        }
    }
}
