use std::sync::Arc;
use std::time::Duration;

use crate::audit::AuditSink;
use crate::cases::CaseManager;
use crate::error::FraudResult;
use crate::pipeline::DetectionPipeline;
use crate::policy::{PolicyEvaluator, PolicyWatcher};
use crate::risk::CreditRiskStore;
use crate::storage::Stores;
use crate::velocity::{VelocityConfig, VelocityLimiter};
use crate::whitelist::WhitelistResolver;
use crate::workflow::ActionWorkflow;

/// Every component, wired over one set of stores.
#[derive(Clone)]
pub struct Services {
    pub whitelist: Arc<WhitelistResolver>,
    pub cases: Arc<CaseManager>,
    pub risk: Arc<CreditRiskStore>,
    pub workflow: Arc<ActionWorkflow>,
    pub pipeline: Arc<DetectionPipeline>,
    pub policy: Arc<PolicyWatcher>,
}

impl Services {
    /// Wire the components. Fails if the velocity thresholds are invalid.
    pub fn build(
        stores: Stores,
        policy: Arc<PolicyWatcher>,
        velocity: VelocityConfig,
        event_deadline: Duration,
        audit: Arc<dyn AuditSink>,
    ) -> FraudResult<Self> {
        velocity.validate()?;

        let whitelist = Arc::new(WhitelistResolver::new(stores.whitelist, audit.clone()));
        let cases = Arc::new(CaseManager::new(stores.cases, audit.clone()));
        let risk = Arc::new(CreditRiskStore::new(stores.risk, audit.clone()));
        let workflow = Arc::new(ActionWorkflow::new(
            stores.actions,
            cases.clone(),
            risk.clone(),
            audit,
        ));
        let pipeline = Arc::new(DetectionPipeline::new(
            whitelist.clone(),
            Arc::new(VelocityLimiter::new(stores.counters, velocity)),
            PolicyEvaluator::new(policy.subscribe()),
            cases.clone(),
            risk.clone(),
            event_deadline,
        ));

        Ok(Services {
            whitelist,
            cases,
            risk,
            workflow,
            pipeline,
            policy,
        })
    }
}
