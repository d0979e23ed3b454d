use super::backend::{InferenceBackend, InvocationError};
use super::domain::{EligibilityResult, RawProfile};
use super::normalizer::{FieldNormalizer, NormalizationError};
use std::sync::Arc;
use tracing::debug;

/// Service composing the field normalizer with an inference backend.
pub struct EligibilityService<B> {
    normalizer: FieldNormalizer,
    backend: Arc<B>,
}

#[derive(Debug, thiserror::Error)]
pub enum EligibilityError {
    #[error(transparent)]
    Normalization(#[from] NormalizationError),
    #[error(transparent)]
    Invocation(#[from] InvocationError),
}

impl EligibilityError {
    pub fn kind(&self) -> &'static str {
        match self {
            EligibilityError::Normalization(NormalizationError::MissingVisaType) => {
                "missing_visa_type"
            }
            EligibilityError::Normalization(NormalizationError::UnrecognizedCategory { .. }) => {
                "unrecognized_category"
            }
            EligibilityError::Invocation(err) => err.kind(),
        }
    }

    pub fn details(&self) -> String {
        match self {
            EligibilityError::Normalization(err) => err.to_string(),
            EligibilityError::Invocation(err) => err.details(),
        }
    }
}

impl<B> EligibilityService<B>
where
    B: InferenceBackend + 'static,
{
    pub fn new(normalizer: FieldNormalizer, backend: Arc<B>) -> Self {
        Self {
            normalizer,
            backend,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Normalize `raw` and ask the backend for a verdict. Profiles that fail
    /// normalization never reach the backend.
    pub async fn check(&self, raw: RawProfile) -> Result<EligibilityResult, EligibilityError> {
        let profile = self.normalizer.normalize(&raw)?;
        debug!(
            category = profile.category().as_str(),
            fields = profile.extra.fields().len(),
            "profile normalized"
        );

        let result = self.backend.evaluate(profile).await?;
        Ok(result)
    }
}
