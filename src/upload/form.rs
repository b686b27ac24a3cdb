//! Multipart upload form
//!
//! Collects the file part and the four text fields from a buffered
//! `multipart/form-data` body.

use bytes::Bytes;
use chrono::{DateTime, Local};
use futures_util::stream;
use multer::Multipart;
use std::convert::Infallible;

use super::naming::{self, UploadName};
use crate::error::UploadError;

/// Multipart field names of the describing text fields
pub const DATA_TYPE_FIELD: &str = "data_type";
pub const TRANSPORT_FIELD: &str = "transport";
pub const JOURNEY_ID_FIELD: &str = "journey_id";
pub const DEVICE_ID_FIELD: &str = "device_id";

/// File part as sent by the client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub contents: Bytes,
}

/// Raw form contents, not yet validated
#[derive(Debug, Default)]
pub struct UploadForm {
    /// Name of the multipart field expected to carry the file
    pub file_field: String,
    pub file: Option<UploadedFile>,
    pub data_type: Option<String>,
    pub transport: Option<String>,
    pub journey_id: Option<String>,
    pub device_id: Option<String>,
}

/// A validated upload ready to be stored
#[derive(Debug)]
pub struct UploadRecord {
    pub name: UploadName,
    pub contents: Bytes,
}

impl UploadRecord {
    pub fn file_name(&self) -> String {
        self.name.file_name()
    }
}

impl UploadForm {
    /// Parse a buffered multipart body
    ///
    /// `file_field` names the file part. Unknown fields are skipped, and a
    /// repeated field keeps its first value.
    pub async fn parse(
        content_type: Option<&str>,
        body: Bytes,
        file_field: &str,
    ) -> Result<Self, UploadError> {
        let boundary = multer::parse_boundary(content_type.unwrap_or_default())
            .map_err(UploadError::NotMultipart)?;
        let mut multipart = Multipart::new(
            stream::once(async move { Ok::<Bytes, Infallible>(body) }),
            boundary,
        );

        let mut form = Self {
            file_field: file_field.to_string(),
            ..Self::default()
        };
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(ToString::to_string) else {
                continue;
            };

            if name == file_field {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let contents = field.bytes().await?;
                form.file.get_or_insert(UploadedFile {
                    file_name,
                    contents,
                });
                continue;
            }

            let slot = match name.as_str() {
                DATA_TYPE_FIELD => &mut form.data_type,
                TRANSPORT_FIELD => &mut form.transport,
                JOURNEY_ID_FIELD => &mut form.journey_id,
                DEVICE_ID_FIELD => &mut form.device_id,
                _ => continue,
            };
            let text = field.text().await?;
            slot.get_or_insert(text);
        }

        Ok(form)
    }

    /// Validate the form and derive the stored file name
    ///
    /// Checks run in order: file present, extension allowed, text fields.
    pub fn into_record(
        self,
        allowed_extensions: &[String],
        uploaded_at: DateTime<Local>,
    ) -> Result<UploadRecord, UploadError> {
        let file = self
            .file
            .filter(|f| !f.file_name.is_empty())
            .ok_or(UploadError::MissingFile(self.file_field))?;

        if !naming::extension_allowed(&file.file_name, allowed_extensions) {
            return Err(UploadError::ExtensionNotAllowed(file.file_name));
        }

        let name = UploadName::new(
            self.data_type.as_deref(),
            self.transport.as_deref(),
            self.journey_id.as_deref(),
            self.device_id.as_deref(),
            uploaded_at,
        )?;

        Ok(UploadRecord {
            name,
            contents: file.contents,
        })
    }
}
