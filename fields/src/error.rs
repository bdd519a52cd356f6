use thiserror::Error;

pub type Result<T> = std::result::Result<T, FieldsError>;

#[derive(Error, Debug)]
pub enum FieldsError {
    #[error("Field validation error: {0}")]
    Validation(String),

    #[error("Field not found: {0}")]
    NotFound(String),
}
