use crate::entity::{EntityDefinition, EntityModel};
use crate::error::{EntitiesError, Result};
use std::path::Path;
use tracing::{debug, error, info};

/// Load entity definitions from YAML files
pub struct SchemaLoader;

impl SchemaLoader {
    /// Parse a single entity definition from YAML text
    pub fn parse_entity(content: &str) -> Result<EntityDefinition> {
        serde_yaml::from_str(content)
            .map_err(|e| EntitiesError::SchemaParsing(format!("Failed to parse YAML: {}", e)))
    }

    /// Load a single entity definition from a YAML file
    pub fn load_entity_from_file(path: &Path) -> Result<EntityDefinition> {
        debug!("Loading entity schema from: {:?}", path);

        let content = std::fs::read_to_string(path)
            .map_err(|e| EntitiesError::SchemaParsing(format!("Failed to read file: {}", e)))?;

        let definition = Self::parse_entity(&content)?;
        info!("Loaded entity '{}' from {:?}", definition.id, path);

        Ok(definition)
    }

    /// Load every `*.schema.yaml` / `*.schema.yml` file of a directory into
    /// an entity model.
    ///
    /// Unreadable files are logged and skipped; an invalid or duplicate
    /// definition fails the whole load.
    pub fn load_model_from_directory(dir: &Path) -> Result<EntityModel> {
        info!("Loading entity schemas from directory: {:?}", dir);

        if !dir.exists() {
            return Err(EntitiesError::SchemaParsing(format!(
                "Schema directory does not exist: {:?}",
                dir
            )));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_yaml = path
                .extension()
                .map_or(false, |ext| ext == "yaml" || ext == "yml");
            let is_schema = path
                .file_stem()
                .map_or(false, |stem| stem.to_string_lossy().ends_with(".schema"));
            if is_yaml && is_schema {
                paths.push(path);
            }
        }
        paths.sort();

        let mut model = EntityModel::new();
        for path in paths {
            match Self::load_entity_from_file(&path) {
                Ok(definition) => model.add(definition)?,
                Err(e) => error!("Failed to load schema from {:?}: {}", path, e),
            }
        }

        info!("Loaded {} entity schemas", model.len());

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fields::FieldType;
    use std::fs;
    use tempfile::TempDir;

    const DOCUMENT_SCHEMA: &str = r#"
id: document
name: Document
description: A text document
fields:
  - id: id
    type: text
    label: Id
    system: true
  - id: title
    type: text
    label: Title
    required: true
  - id: owner
    type: text
    label: Owner
"#;

    #[test]
    fn test_parse_entity() {
        let definition = SchemaLoader::parse_entity(DOCUMENT_SCHEMA).unwrap();
        assert_eq!(definition.id, "document");
        assert_eq!(definition.fields.len(), 3);
        assert_eq!(definition.fields[1].field_type, FieldType::Text);
        assert!(definition.fields[1].required);
    }

    #[test]
    fn test_load_model_from_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("document.schema.yaml"), DOCUMENT_SCHEMA).unwrap();
        fs::write(dir.path().join("notes.yaml"), "not: a schema").unwrap();
        fs::write(dir.path().join("broken.schema.yaml"), "id: [").unwrap();

        let model = SchemaLoader::load_model_from_directory(dir.path()).unwrap();
        assert_eq!(model.len(), 1);
        let document = model.get("document").unwrap();
        // system flags survive the load
        assert!(document.is_system_field(0));
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(SchemaLoader::load_model_from_directory(&missing).is_err());
    }
}
