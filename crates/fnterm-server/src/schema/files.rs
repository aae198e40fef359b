//! Request bodies of the file verbs.

use serde::Deserialize;

/// Body of `write`, `update`, `append` and `delete`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileRequest {
    pub file: Option<String>,
    pub content: Option<String>,
}

/// Body of `update-config`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdateRequest {
    pub content: Option<String>,
}
