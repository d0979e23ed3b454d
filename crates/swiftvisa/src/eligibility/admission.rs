use super::backend::{InferenceBackend, InvocationError};
use super::domain::{EligibilityResult, NormalizedProfile};
use crate::config::AdmissionPolicy;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Semaphore, TryAcquireError};
use tracing::warn;

/// Caps how many evaluations the wrapped backend runs at once.
pub struct AdmissionControlled<B> {
    inner: B,
    permits: Arc<Semaphore>,
    limit: usize,
    policy: AdmissionPolicy,
}

impl<B> AdmissionControlled<B> {
    pub fn new(inner: B, limit: usize, policy: AdmissionPolicy) -> Self {
        let limit = limit.max(1);
        Self {
            inner,
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            policy,
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl<B> InferenceBackend for AdmissionControlled<B>
where
    B: InferenceBackend,
{
    async fn evaluate(
        &self,
        profile: NormalizedProfile,
    ) -> Result<EligibilityResult, InvocationError> {
        let overloaded = InvocationError::Overloaded { limit: self.limit };
        let _permit = match self.policy {
            AdmissionPolicy::Queue => self
                .permits
                .acquire()
                .await
                .map_err(|_| overloaded)?,
            AdmissionPolicy::Reject => match self.permits.try_acquire() {
                Ok(permit) => permit,
                Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => {
                    warn!(limit = self.limit, "rejecting eligibility check, worker slots exhausted");
                    return Err(overloaded);
                }
            },
        };

        self.inner.evaluate(profile).await
    }
}
