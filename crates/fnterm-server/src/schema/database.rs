//! Request and response types of `POST /database`.

use serde::{Deserialize, Serialize};

/// Fields of a database request, from a JSON body or multipart text fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseRequest {
    pub command: Option<String>,
    pub database: Option<String>,
    pub query: Option<String>,
    pub source_db: Option<String>,
    pub dest_db: Option<String>,
}

impl DatabaseRequest {
    /// Sets a field by its form name; unknown names are ignored.
    pub fn set_field(&mut self, name: &str, value: String) {
        let slot = match name {
            "command" => &mut self.command,
            "database" => &mut self.database,
            "query" => &mut self.query,
            "source_db" => &mut self.source_db,
            "dest_db" => &mut self.dest_db,
            _ => return,
        };
        *slot = Some(value);
    }
}

/// SQL file received with `upload-sql`.
#[derive(Debug, Clone)]
pub struct SqlUpload {
    pub file_name: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableRow {
    pub table_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewRow {
    pub view_name: String,
}
