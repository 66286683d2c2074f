// Database models (internal, may differ from core document types)

use agentdesk_core::RawDocument;
use serde_json::{Map, Value};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: String,
    pub fields: sqlx::types::JsonValue,
}

impl From<DocumentRow> for RawDocument {
    fn from(row: DocumentRow) -> Self {
        let fields = match row.fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        RawDocument::new(row.id, fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_into_document() {
        let row = DocumentRow {
            id: "a1".to_string(),
            fields: json!({"name": "Ava", "conversationCount": 2}),
        };
        let doc = RawDocument::from(row);
        assert_eq!(doc.id, "a1");
        assert_eq!(doc.get("name"), Some(&json!("Ava")));
    }

    #[test]
    fn test_non_object_fields_become_empty() {
        let row = DocumentRow {
            id: "a2".to_string(),
            fields: json!(["not", "an", "object"]),
        };
        let doc = RawDocument::from(row);
        assert!(doc.fields.is_empty());
    }
}
