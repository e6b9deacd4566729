use std::{convert::TryFrom, path::Path};

use axum::body::Body as AxumBody;
use eyre::{Result, WrapErr};
use http_body_util::BodyExt;
use hyper::{Request, Response};
use percent_encoding::percent_decode_str;
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};

use crate::ports::file_system::{FileSystem, FileSystemError};

/// File system adapter using tower-http ServeDir for the static fallback
#[derive(Debug, Default, Clone)]
pub struct FileSystemAdapter;

impl FileSystemAdapter {
    pub fn new() -> Self {
        Self
    }
}

/// Reject any `..` segment, percent-encoded or not, before the path reaches the file system.
pub(crate) fn check_path(path: &str) -> Result<(), FileSystemError> {
    let decoded = percent_decode_str(path).decode_utf8_lossy();
    let traverses = decoded.split(['/', '\\']).any(|segment| segment == "..");
    if traverses {
        return Err(FileSystemError::InvalidPath(
            "Path traversal attempt detected".to_string(),
        ));
    }
    Ok(())
}

impl FileSystem for FileSystemAdapter {
    async fn serve_file(
        &self,
        root: &str,
        index_file: &str,
        path: &str,
        req: Request<AxumBody>,
    ) -> Result<Response<AxumBody>, FileSystemError> {
        check_path(path)?;

        let uri_string = format!("/{path}", path = path.trim_start_matches('/'));
        let uri = hyper::Uri::try_from(uri_string)
            .wrap_err("Failed to parse URI for file serving")
            .map_err(|e| FileSystemError::InvalidPath(e.to_string()))?;

        let (parts, body) = req.into_parts();
        let mut new_req = Request::from_parts(parts, body);
        *new_req.uri_mut() = uri;

        // Unknown paths get the index file, so client-side routes keep working.
        let serve_dir = ServeDir::new(root)
            .append_index_html_on_directories(true)
            .fallback(ServeFile::new(Path::new(root).join(index_file)));

        let response = serve_dir
            .oneshot(new_req)
            .await
            .wrap_err("ServeDir failed to serve file")
            .map_err(|e| {
                FileSystemError::IoError(std::io::Error::other(format!("ServeDir error: {e}")))
            })?;

        let (parts, tower_body) = response.into_parts();
        let axum_body = AxumBody::new(tower_body.map_err(|e| {
            tracing::error!("Error reading static file body: {}", e);
            axum::Error::new(e)
        }));

        Ok(Response::from_parts(parts, axum_body))
    }
}
