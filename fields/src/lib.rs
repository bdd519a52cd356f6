pub mod error;
pub mod field_types;
pub mod mask;

pub use error::{FieldsError, Result};
pub use field_types::{Field, FieldType};
pub use mask::FieldMask;

/// Resolve field names against an ordered field list, producing a mask of
/// their positions.
pub fn mask_for_names<S: AsRef<str>>(fields: &[Field], names: &[S]) -> Result<FieldMask> {
    let mut mask = FieldMask::new();
    for name in names {
        let name = name.as_ref();
        let index = fields
            .iter()
            .position(|f| f.id == name)
            .ok_or_else(|| FieldsError::NotFound(name.to_string()))?;
        mask.insert(index);
    }
    Ok(mask)
}

/// Mask of every field flagged as a system field.
pub fn system_mask(fields: &[Field]) -> FieldMask {
    fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.system)
        .map(|(i, _)| i)
        .collect()
}
