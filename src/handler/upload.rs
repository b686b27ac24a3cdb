//! Upload handler
//!
//! `POST /upload`: validates the multipart form, names the file and stores
//! it in the upload directory.

use bytes::Bytes;
use chrono::Local;
use http::header::CONTENT_TYPE;
use http::{Request, Response, StatusCode};

use crate::config::AppState;
use crate::error::UploadError;
use crate::http::response;
use crate::logger;
use crate::upload::UploadForm;

pub async fn handle_upload(req: Request<Bytes>, state: &AppState) -> Response<Bytes> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);

    match store_upload(content_type.as_deref(), req.into_body(), state).await {
        Ok(file_name) => {
            logger::log_info(&format!("[Upload] Saved '{file_name}'"));
            response::build_text_response(
                StatusCode::OK,
                format!("File successfully saved to '{file_name}'."),
            )
        }
        Err(e) if e.is_client_error() => {
            logger::log_warning(&format!("[Upload] Rejected: {e}"));
            response::build_text_response(e.status(), e.to_string())
        }
        Err(e) => {
            logger::log_error(&format!("[Upload] {e}"));
            response::build_error_response(e.status())
        }
    }
}

async fn store_upload(
    content_type: Option<&str>,
    body: Bytes,
    state: &AppState,
) -> Result<String, UploadError> {
    let storage = &state.config.storage;
    let form = UploadForm::parse(content_type, body, &storage.upload_field).await?;
    let record = form.into_record(&storage.allowed_extensions, Local::now())?;

    let file_name = record.file_name();
    state.uploads.save(&file_name, &record.contents).await?;
    Ok(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testing::state_in;
    use crate::upload::form::tests::{content_type, multipart_body};

    const FIELDS: &[(&str, &str)] = &[
        ("data_type", "gps"),
        ("transport", "bike"),
        ("journey_id", "42"),
        ("device_id", "phone1"),
    ];

    fn upload_request(body: Vec<u8>) -> Request<Bytes> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(CONTENT_TYPE, content_type())
            .body(Bytes::from(body))
            .unwrap()
    }

    fn stored_files(dir: &std::path::Path) -> Vec<String> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_upload_saved() {
        let root = tempfile::tempdir().unwrap();
        let state = state_in(root.path());
        let payload = b"\x1f\x8b\x08\x00\x00\x00\x00\x00measurements";

        let resp = handle_upload(
            upload_request(multipart_body("track.gz", payload, FIELDS)),
            &state,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let files = stored_files(&root.path().join("data"));
        assert_eq!(files.len(), 1);
        let name = &files[0];
        assert!(name.starts_with("gps.bike.42."));
        assert!(name.ends_with(".phone1.gz"));
        assert_eq!(
            std::str::from_utf8(resp.body()).unwrap(),
            format!("File successfully saved to '{name}'.")
        );
        assert_eq!(
            std::fs::read(root.path().join("data").join(name)).unwrap(),
            payload
        );
    }

    #[tokio::test]
    async fn test_wrong_extension_stores_nothing() {
        let root = tempfile::tempdir().unwrap();
        let state = state_in(root.path());

        let resp = handle_upload(
            upload_request(multipart_body("track.txt", b"text", FIELDS)),
            &state,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(stored_files(&root.path().join("data")).is_empty());
    }

    #[tokio::test]
    async fn test_not_multipart() {
        let root = tempfile::tempdir().unwrap();
        let state = state_in(root.path());
        let req = Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Bytes::from_static(b"measurements=1"))
            .unwrap();

        let resp = handle_upload(req, &state).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_storage_failure_is_500() {
        let root = tempfile::tempdir().unwrap();
        let state = state_in(root.path());
        std::fs::write(root.path().join("data"), b"not a directory").unwrap();

        let resp = handle_upload(
            upload_request(multipart_body("track.gz", b"x", FIELDS)),
            &state,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.body(), "500 Internal Server Error");
    }
}
