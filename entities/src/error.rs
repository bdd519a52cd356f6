use thiserror::Error;

pub type Result<T> = std::result::Result<T, EntitiesError>;

#[derive(Error, Debug)]
pub enum EntitiesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema parsing error: {0}")]
    SchemaParsing(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Duplicate entity: {0}")]
    DuplicateEntity(String),

    #[error("Field '{field}' not found on entity '{entity}'")]
    FieldNotFound { entity: String, field: String },

    #[error("Validation error: {0}")]
    Validation(String),
}
