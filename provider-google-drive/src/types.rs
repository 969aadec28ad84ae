//! Google Drive API request and response types
//!
//! Only the fields the document client reads are modelled.

use serde::{Deserialize, Serialize};

/// Google Drive API file resource (subset)
///
/// See: https://developers.google.com/drive/api/v3/reference/files#resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// RFC 3339
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
}

/// Google Drive API files.list response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesListResponse {
    #[serde(default)]
    pub files: Vec<DriveFile>,
}

/// Metadata body for files.create
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileRequest<'a> {
    pub name: &'a str,
    pub mime_type: &'a str,
}

/// Error envelope returned by Google APIs
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_files_list_response() {
        let json = r#"{
            "kind": "drive#fileList",
            "files": [
                {
                    "id": "file1",
                    "name": "sermon-organizer-data.json",
                    "mimeType": "application/json",
                    "modifiedTime": "2024-05-01T10:00:00.000Z"
                }
            ]
        }"#;

        let response: FilesListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.files.len(), 1);
        assert_eq!(response.files[0].id, "file1");
        assert_eq!(
            response.files[0].mime_type.as_deref(),
            Some("application/json")
        );
    }

    #[test]
    fn test_empty_list_response() {
        let response: FilesListResponse = serde_json::from_str("{}").unwrap();
        assert!(response.files.is_empty());
    }

    #[test]
    fn test_create_request_serialization() {
        let body = serde_json::to_value(CreateFileRequest {
            name: "data.json",
            mime_type: "application/json",
        })
        .unwrap();
        assert_eq!(body["mimeType"], "application/json");
        assert_eq!(body["name"], "data.json");
    }

    #[test]
    fn test_deserialize_api_error() {
        let json = r#"{"error":{"code":404,"message":"File not found: abc.","errors":[]}}"#;
        let parsed: ApiErrorResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.error.code, 404);
        assert!(parsed.error.message.starts_with("File not found"));
    }
}
