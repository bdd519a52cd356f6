use crate::error::{FieldsError, Result};
use serde::{Deserialize, Serialize};

/// Field types understood by the entity model
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    LongText,
    Integer,
    Float,
    Boolean,
    Datetime,
}

/// Field definition
///
/// A field marked `system` is always visible to anyone allowed to see the
/// record at all, regardless of field masks (ids, revision markers and the
/// like).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub system: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Field {
    /// Create a new field with minimal configuration
    pub fn new(id: impl Into<String>, field_type: FieldType, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            field_type,
            label: label.into(),
            required: false,
            system: false,
            description: None,
        }
    }

    /// Set the field as required
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Mark the field as an always-visible system field
    pub fn system(mut self, system: bool) -> Self {
        self.system = system;
        self
    }

    /// Set the field description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Validate the field configuration
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(FieldsError::Validation("Field ID cannot be empty".to_string()));
        }

        if self.label.is_empty() {
            return Err(FieldsError::Validation(format!(
                "Field '{}' label cannot be empty",
                self.id
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_names() {
        let types: Vec<FieldType> =
            serde_yaml::from_str("[text, long_text, integer, float, boolean, datetime]").unwrap();
        assert_eq!(types[1], FieldType::LongText);
        assert_eq!(types[5], FieldType::Datetime);
        assert!(serde_yaml::from_str::<FieldType>("slug").is_err());
    }

    #[test]
    fn test_field_builder() {
        let field = Field::new("owner", FieldType::Text, "Owner")
            .required(true)
            .system(true)
            .with_description("Who owns the record");

        assert_eq!(field.id, "owner");
        assert_eq!(field.field_type, FieldType::Text);
        assert!(field.required);
        assert!(field.system);
        assert_eq!(field.description.as_deref(), Some("Who owns the record"));
    }

    #[test]
    fn test_field_validation() {
        assert!(Field::new("test", FieldType::Text, "Test").validate().is_ok());
        assert!(Field::new("", FieldType::Text, "Test").validate().is_err());
        assert!(Field::new("test", FieldType::Text, "").validate().is_err());
    }

    #[test]
    fn test_field_from_yaml() {
        let field: Field = serde_yaml::from_str(
            r#"
id: id
type: text
label: Id
system: true
"#,
        )
        .unwrap();
        assert!(field.system);
        assert!(!field.required);
    }
}
