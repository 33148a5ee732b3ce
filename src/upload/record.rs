//! Server-side record shapes
//!
//! The API answers with camelCase objects from its listing endpoint but may
//! return raw snake_case rows from the upload endpoint, and numeric columns
//! can arrive as JSON strings. Both spellings are accepted.

use crate::fabricate::ArtifactKind;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A document record as persisted by the API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    #[serde(default, alias = "document_type")]
    pub document_type: Option<String>,
    #[serde(default, alias = "document_name")]
    pub document_name: Option<String>,
    #[serde(default, alias = "file_url")]
    pub file_url: Option<String>,
    #[serde(default, alias = "file_size", deserialize_with = "lenient_u64")]
    pub file_size: Option<u64>,
    #[serde(default, alias = "mime_type")]
    pub mime_type: Option<String>,
    #[serde(default, alias = "is_primary")]
    pub is_primary: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
}

impl StoredRecord {
    /// Kind of the record, if its document type is part of the enumeration
    pub fn kind(&self) -> Option<ArtifactKind> {
        self.document_type.as_deref()?.parse().ok()
    }
}

/// What the server reported when it accepted an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRecordRef {
    pub kind: ArtifactKind,
    pub id: Option<i64>,
    pub name: Option<String>,
    pub size: Option<u64>,
    /// Retrievable URL (photos, and documents when reported)
    pub url: Option<String>,
}

impl StoredRecordRef {
    pub(crate) fn from_document(kind: ArtifactKind, record: StoredRecord) -> Self {
        Self {
            kind,
            id: record.id,
            name: record.document_name,
            size: record.file_size,
            url: record.file_url,
        }
    }

    pub(crate) fn from_photo(name: &str, size: u64, url: String) -> Self {
        Self {
            kind: ArtifactKind::ProfilePhoto,
            id: None,
            name: Some(name.to_string()),
            size: Some(size),
            url: Some(url),
        }
    }
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}
