//! Eligibility bridge: reshapes client profiles for the reasoning worker,
//! runs the worker as a child process, and relays its verdict.

pub mod admission;
pub mod aliases;
pub mod backend;
pub mod domain;
pub mod gate;
pub mod invoker;
pub mod normalizer;
pub mod relay;
pub mod router;
pub mod service;

pub use admission::AdmissionControlled;
pub use aliases::{AliasTable, AliasTableError};
pub use backend::{InferenceBackend, InvocationError};
pub use domain::{
    CategoryBucket, CategoryCode, Decision, EligibilityResult, FixedField, NormalizedProfile,
    RawProfile, ResultShapeError, REQUIRED_RESULT_KEYS,
};
pub use gate::{AllowAll, AuthGate, BearerTokenGate};
pub use invoker::{InvocationResult, ProcessInvoker};
pub use normalizer::{FieldNormalizer, NormalizationError};
pub use relay::{relay, BoundaryResponse, FAILURE_MESSAGE};
pub use router::eligibility_router;
pub use service::{EligibilityError, EligibilityService};
