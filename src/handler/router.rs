//! Request routing dispatch module
//!
//! Entry point for reassembled requests: method validation, route matching
//! and dispatch.

use bytes::Bytes;
use http::header::IF_NONE_MATCH;
use http::{Method, Request, Response};

use crate::config::AppState;
use crate::handler::{static_files, upload};
use crate::http::response;
use crate::logger;

pub const UPLOAD_PATH: &str = "/upload";

/// Page shown for `GET /upload`
const UPLOAD_FORM_PAGE: &str = "/upload.html";

/// Where a request goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route<'a> {
    /// `POST /upload`
    Upload,
    /// `GET /upload`, the manual upload form
    UploadForm,
    /// Any other `GET` or `HEAD` path
    Page(&'a str),
    Options,
    MethodNotAllowed,
}

impl<'a> Route<'a> {
    pub fn resolve(method: &Method, path: &'a str) -> Self {
        match (method, path) {
            (&Method::OPTIONS, _) => Self::Options,
            (&Method::POST, UPLOAD_PATH) => Self::Upload,
            (&Method::GET | &Method::HEAD, UPLOAD_PATH) => Self::UploadForm,
            (&Method::GET | &Method::HEAD, _) => Self::Page(path),
            _ => Self::MethodNotAllowed,
        }
    }
}

/// Main entry point for request handling
pub async fn handle_request(req: Request<Bytes>, state: &AppState) -> Response<Bytes> {
    let static_dir = state.config.storage.static_dir.as_path();
    let path = req.uri().path().to_string();
    let if_none_match = req
        .headers()
        .get(IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);

    match Route::resolve(req.method(), &path) {
        Route::Upload => upload::handle_upload(req, state).await,
        Route::UploadForm => {
            static_files::serve_page(static_dir, UPLOAD_FORM_PAGE, if_none_match.as_deref()).await
        }
        Route::Page(page) => {
            static_files::serve_page(static_dir, page, if_none_match.as_deref()).await
        }
        Route::Options => response::build_options_response(),
        Route::MethodNotAllowed => {
            logger::log_warning(&format!("Method not allowed: {} {path}", req.method()));
            response::build_405_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testing::state_in;
    use http::header::ALLOW;
    use http::StatusCode;

    fn request(method: &str, uri: &str) -> Request<Bytes> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Bytes::new())
            .unwrap()
    }

    #[test]
    fn test_resolve() {
        assert_eq!(Route::resolve(&Method::POST, "/upload"), Route::Upload);
        assert_eq!(Route::resolve(&Method::GET, "/upload"), Route::UploadForm);
        assert_eq!(Route::resolve(&Method::HEAD, "/"), Route::Page("/"));
        assert_eq!(Route::resolve(&Method::GET, "/a.css"), Route::Page("/a.css"));
        assert_eq!(Route::resolve(&Method::OPTIONS, "/upload"), Route::Options);
        assert_eq!(Route::resolve(&Method::POST, "/"), Route::MethodNotAllowed);
        assert_eq!(Route::resolve(&Method::DELETE, "/upload"), Route::MethodNotAllowed);
    }

    #[tokio::test]
    async fn test_index_page() {
        let root = tempfile::tempdir().unwrap();
        let state = state_in(root.path());

        let resp = handle_request(request("GET", "/"), &state).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.body(), "<h1>collector</h1>");
    }

    #[tokio::test]
    async fn test_upload_form_page() {
        let root = tempfile::tempdir().unwrap();
        let state = state_in(root.path());

        let resp = handle_request(request("GET", "/upload"), &state).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.body(), "<form></form>");
    }

    #[tokio::test]
    async fn test_unknown_path_serves_404_page() {
        let root = tempfile::tempdir().unwrap();
        let state = state_in(root.path());

        let resp = handle_request(request("GET", "/does/not/exist"), &state).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.body(), "<h1>not here</h1>");
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let root = tempfile::tempdir().unwrap();
        let state = state_in(root.path());

        let resp = handle_request(request("PUT", "/upload"), &state).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(resp.headers().contains_key(ALLOW));
    }
}
