//! Entry points tying graph building, planning and execution together.

use crate::{
    ArgResolver, DependencyGraph, DeploymentPlan, DescriptorRegistry, Executor, LedgerClient,
    OrchestratorError, ProgressSink, RunReport,
};

/// Build the dependency graph of `registry` and plan its deployment.
pub fn plan(registry: &DescriptorRegistry) -> Result<DeploymentPlan, OrchestratorError> {
    let graph = DependencyGraph::build(registry)?;
    DeploymentPlan::from_graph(&graph)
}

/// Plan and deploy every component of `registry`.
///
/// Graph and planning errors are returned before the ledger is touched.
/// Once execution starts, the report is always returned, including when the
/// run halted on a failure or was cancelled.
pub async fn deploy<L, R, S>(
    registry: &DescriptorRegistry,
    executor: &Executor<L, R, S>,
) -> Result<RunReport, OrchestratorError>
where
    L: LedgerClient,
    R: ArgResolver,
    S: ProgressSink,
{
    let plan = plan(registry)?;
    Ok(executor.run(&plan).await)
}
