use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use swiftvisa::config::AppConfig;
use swiftvisa::eligibility::{
    AdmissionControlled, AliasTable, AllowAll, AuthGate, BearerTokenGate, EligibilityService,
    FieldNormalizer, ProcessInvoker,
};
use swiftvisa::error::AppError;
use tracing::info;

pub(crate) type WorkerBackend = AdmissionControlled<ProcessInvoker>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn alias_table(config: &AppConfig) -> Result<AliasTable, AppError> {
    match &config.alias_table_path {
        Some(path) => {
            let table = AliasTable::from_path(path)?;
            info!(path = %path.display(), "loaded alias table");
            Ok(table)
        }
        None => Ok(AliasTable::standard()),
    }
}

pub(crate) fn eligibility_service(
    config: &AppConfig,
) -> Result<EligibilityService<WorkerBackend>, AppError> {
    let normalizer = FieldNormalizer::new(Arc::new(alias_table(config)?));
    let worker = &config.worker;
    let backend = AdmissionControlled::new(
        ProcessInvoker::new(worker.clone()),
        worker.max_concurrent,
        worker.admission,
    );
    Ok(EligibilityService::new(normalizer, Arc::new(backend)))
}

pub(crate) fn auth_gate(config: &AppConfig) -> Arc<dyn AuthGate> {
    match &config.auth.api_token {
        Some(token) => Arc::new(BearerTokenGate::new(token.clone())),
        None => Arc::new(AllowAll),
    }
}
