use tenantguard_auth::{EvalContext, PolicyError};
use tenantguard_infra::{IsolationConfig, IsolationLayer};
use tracing::info;

/// Everything the handlers need, shared behind an `Arc`.
pub struct AppServices {
    pub layer: IsolationLayer,
}

impl AppServices {
    /// Evaluation context for probes that bypass the gateways.
    pub fn eval_context(&self) -> EvalContext {
        EvalContext::now().with_timeout(self.layer.config.evaluation_timeout())
    }
}

/// Wire the isolation layer over in-memory stores.
pub fn build_services(config: IsolationConfig) -> Result<AppServices, PolicyError> {
    let layer = IsolationLayer::in_memory(config)?;
    info!(
        foreign_filter_mode = ?layer.config.foreign_filter_mode,
        unique_tenant_names = layer.config.unique_tenant_names,
        "services ready"
    );
    Ok(AppServices { layer })
}
