use super::aliases::AliasTable;
use super::domain::{CategoryBucket, FixedField, NormalizedProfile, RawProfile};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum NormalizationError {
    #[error("profile is missing a visa type")]
    MissingVisaType,
    #[error("unrecognized visa type '{visa_type}'")]
    UnrecognizedCategory { visa_type: String },
}

/// Reshapes flat client profiles into the worker's nested schema.
#[derive(Debug, Clone)]
pub struct FieldNormalizer {
    table: Arc<AliasTable>,
}

impl FieldNormalizer {
    pub fn new(table: Arc<AliasTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &AliasTable {
        &self.table
    }

    pub fn normalize(&self, raw: &RawProfile) -> Result<NormalizedProfile, NormalizationError> {
        let visa_type = self.visa_type_of(raw)?;
        let label = visa_type
            .as_str()
            .ok_or_else(|| NormalizationError::UnrecognizedCategory {
                visa_type: visa_type.to_string(),
            })?;
        let category = self.table.category_of(label).cloned().ok_or_else(|| {
            NormalizationError::UnrecognizedCategory {
                visa_type: label.to_string(),
            }
        })?;

        let mut profile = NormalizedProfile::new(visa_type.clone(), CategoryBucket::new(category));

        for (key, value) in raw.iter() {
            if let Some(field) = self.table.fixed_field(key) {
                profile.set_fixed(field, value.clone());
                continue;
            }

            let target = self.table.canonical_of(key).unwrap_or(key);
            if profile
                .extra
                .insert(target.to_string(), value.clone())
                .is_some()
            {
                debug!(
                    field = target,
                    source = key.as_str(),
                    "profile supplied the same field under several names, keeping the last"
                );
            }
        }

        Ok(profile)
    }

    fn visa_type_of<'a>(&self, raw: &'a RawProfile) -> Result<&'a Value, NormalizationError> {
        raw.iter()
            .filter(|(key, _)| self.table.fixed_field(key) == Some(FixedField::VisaType))
            .map(|(_, value)| value)
            .last()
            .ok_or(NormalizationError::MissingVisaType)
    }
}
