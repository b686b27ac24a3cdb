//! Stored file naming
//!
//! Uploads are stored as
//! `{data_type}.{transport}.{journey_id}.{timestamp}.{device_id}.gz`.

use chrono::{DateTime, Local};

use crate::error::UploadError;

/// Local time format used in stored file names, e.g. `2026-10-19.134502`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d.%H%M%S";

/// Suffix of every stored file
pub const STORED_EXTENSION: &str = "gz";

/// Text after the last `.` of a client file name
pub fn extension_of(file_name: &str) -> Option<&str> {
    file_name.rsplit_once('.').map(|(_, ext)| ext)
}

/// Whether the client file name carries one of the allowed extensions
///
/// Comparison is case-sensitive. A name without a dot is never allowed.
pub fn extension_allowed(file_name: &str, allowed: &[String]) -> bool {
    extension_of(file_name).is_some_and(|ext| allowed.iter().any(|a| a == ext))
}

/// Validated components of a stored file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadName {
    pub data_type: String,
    pub transport: String,
    pub journey_id: String,
    pub device_id: String,
    pub uploaded_at: DateTime<Local>,
}

impl UploadName {
    pub fn new(
        data_type: Option<&str>,
        transport: Option<&str>,
        journey_id: Option<&str>,
        device_id: Option<&str>,
        uploaded_at: DateTime<Local>,
    ) -> Result<Self, UploadError> {
        Ok(Self {
            data_type: component("data_type", data_type)?,
            transport: component("transport", transport)?,
            journey_id: component("journey_id", journey_id)?,
            device_id: component("device_id", device_id)?,
            uploaded_at,
        })
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}.{}.{}.{}.{}.{STORED_EXTENSION}",
            self.data_type,
            self.transport,
            self.journey_id,
            self.uploaded_at.format(TIMESTAMP_FORMAT),
            self.device_id
        )
    }
}

/// Check one form value before it becomes part of a path
fn component(field: &'static str, value: Option<&str>) -> Result<String, UploadError> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(UploadError::MissingField(field));
    }
    if value.contains(['/', '\\', '\0']) || value.contains("..") {
        return Err(UploadError::InvalidField(field));
    }
    Ok(value.to_string())
}
