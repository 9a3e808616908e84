//! Deployment execution: walks a plan, resolves arguments and deploys each
//! component through the ledger client.

use std::{
    collections::{BTreeMap, HashMap},
    time::Instant,
};

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::Instrument;

use crate::{
    ArgResolver, ArgSpec, DeploymentPlan, LedgerClient, OrchestratorError, PlanStep,
    ProgressEvent, ProgressSink, ResolvedArg, RunReport, StaticResolver, TracingSink,
};

/// What to do with the rest of the plan when a deployment fails.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop at the first failure.
    #[default]
    Halt,
    /// Skip the components that depend on the failed one, deploy the rest.
    SkipDependents,
}

/// Executes deployment plans against a ledger client.
///
/// Components are deployed strictly in plan order, one at a time. Successful
/// deployments are never rolled back.
#[derive(Debug)]
pub struct Executor<L, R = StaticResolver, S = TracingSink> {
    ledger: L,
    resolver: R,
    sink: S,
    policy: FailurePolicy,
    cancel: Option<watch::Receiver<bool>>,
}

impl<L: LedgerClient> Executor<L> {
    /// Create an executor with the static resolver and tracing progress sink.
    pub fn new(ledger: L) -> Self {
        Self {
            ledger,
            resolver: StaticResolver,
            sink: TracingSink,
            policy: FailurePolicy::default(),
            cancel: None,
        }
    }
}

impl<L, R, S> Executor<L, R, S>
where
    L: LedgerClient,
    R: ArgResolver,
    S: ProgressSink,
{
    /// Use another resolver for literal and account list arguments.
    pub fn resolver<R2: ArgResolver>(self, resolver: R2) -> Executor<L, R2, S> {
        Executor {
            ledger: self.ledger,
            resolver,
            sink: self.sink,
            policy: self.policy,
            cancel: self.cancel,
        }
    }

    /// Send progress events to another sink.
    pub fn sink<S2: ProgressSink>(self, sink: S2) -> Executor<L, R, S2> {
        Executor {
            ledger: self.ledger,
            resolver: self.resolver,
            sink,
            policy: self.policy,
            cancel: self.cancel,
        }
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stop the run before the next deployment once `cancel` holds `true`.
    ///
    /// A deployment already submitted to the ledger always runs to completion.
    pub fn cancel_on(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Run the plan to completion, to the first halting failure, or to cancellation.
    pub async fn run(&self, plan: &DeploymentPlan) -> RunReport {
        let mut report = RunReport::new(plan.fingerprint(), plan.len());
        let mut addresses: HashMap<&str, Address> = HashMap::with_capacity(plan.len());
        // Failed or skipped component -> the failed component that blocks it.
        let mut blocked: BTreeMap<&str, &str> = BTreeMap::new();

        tracing::info!(
            components = plan.len(),
            fingerprint = %report.plan_fingerprint(),
            policy = %self.policy,
            "Starting deployment run"
        );

        for step in plan.iter() {
            let name = step.name.as_str();

            if self.is_cancelled() {
                tracing::warn!(next = name, "Run cancelled before next deployment");
                report.mark_cancelled();
                break;
            }

            if let Some(root) = step
                .dependencies
                .iter()
                .find_map(|dep| blocked.get(dep.as_str()).copied())
            {
                report.record_skipped(name, root);
                self.sink.emit(&ProgressEvent::skipped(name, root));
                blocked.insert(name, root);
                continue;
            }

            self.sink.emit(&ProgressEvent::started(name));
            let started = Instant::now();

            let result = match self.resolve_args(step, &addresses) {
                Ok(args) => self
                    .ledger
                    .deploy(name, &args)
                    .instrument(tracing::info_span!("deploy", component = name))
                    .await
                    .map_err(|source| OrchestratorError::DeploymentFailed {
                        component: step.name.clone(),
                        source,
                    }),
                Err(e) => Err(e),
            };
            let elapsed = started.elapsed();

            match result {
                Ok(address) => {
                    let deployed = report.record_success(name, address, elapsed);
                    tracing::debug!(
                        component = name,
                        sequence = deployed.deployed_at,
                        elapsed = ?elapsed,
                        "Component recorded"
                    );
                    addresses.insert(name, address);
                    self.sink.emit(&ProgressEvent::succeeded(name, address));
                }
                Err(e) => {
                    let kind = e.kind();
                    let message = e.to_string();
                    report.record_failure(name, kind, message.clone(), elapsed);
                    self.sink.emit(&ProgressEvent::failed(name, kind, message));

                    if e.is_fatal() || self.policy == FailurePolicy::Halt {
                        break;
                    }
                    blocked.insert(name, name);
                }
            }
        }

        tracing::info!(
            deployed = report.success_count(),
            planned = plan.len(),
            cancelled = report.was_cancelled(),
            "Deployment run finished"
        );

        report
    }

    /// Resolve every constructor argument of `step`.
    fn resolve_args(
        &self,
        step: &PlanStep,
        addresses: &HashMap<&str, Address>,
    ) -> Result<Vec<ResolvedArg>, OrchestratorError> {
        step.args
            .iter()
            .enumerate()
            .map(|(index, arg)| match arg {
                ArgSpec::Literal(value) => self.resolver.resolve_literal(&step.name, index, value),
                ArgSpec::AccountList(accounts) => {
                    self.resolver.resolve_accounts(&step.name, index, accounts)
                }
                ArgSpec::ComponentRef(dependency) => addresses
                    .get(dependency.as_str())
                    .copied()
                    .map(ResolvedArg::Address)
                    .ok_or_else(|| OrchestratorError::UnresolvedDependency {
                        component: step.name.clone(),
                        dependency: dependency.clone(),
                    }),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        ComponentDescriptor, DescriptorRegistry, ErrorKind, LedgerError, Phase, Status, plan,
    };

    /// Ledger returning sequential addresses, failing for listed components.
    #[derive(Default)]
    struct ScriptedLedger {
        failing: Vec<&'static str>,
        calls: Mutex<Vec<(String, Vec<ResolvedArg>)>>,
    }

    impl ScriptedLedger {
        fn failing(failing: Vec<&'static str>) -> Self {
            Self {
                failing,
                ..Default::default()
            }
        }

        fn deployed_names(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
        }
    }

    impl LedgerClient for ScriptedLedger {
        async fn deploy(&self, name: &str, args: &[ResolvedArg]) -> Result<Address, LedgerError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push((name.to_string(), args.to_vec()));
            if self.failing.iter().any(|f| *f == name) {
                return Err(LedgerError::Reverted("boom".to_string()));
            }
            Ok(Address::with_last_byte(calls.len() as u8))
        }
    }

    fn registry(entries: &[(&str, &[&str])]) -> DescriptorRegistry {
        DescriptorRegistry::from_descriptors(entries.iter().map(|(name, deps)| {
            ComponentDescriptor::new(*name, deps.iter().map(|d| ArgSpec::component(*d)).collect())
        }))
        .expect("unique names")
    }

    #[tokio::test]
    async fn test_skip_dependents_keeps_independent_components() {
        let plan = plan(&registry(&[
            ("A", &[]),
            ("B", &["A"]),
            ("C", &["B"]),
            ("D", &[]),
        ]))
        .expect("plannable");
        assert_eq!(plan.names().collect::<Vec<_>>(), ["A", "B", "C", "D"]);

        let executor = Executor::new(ScriptedLedger::failing(vec!["A"]))
            .policy(FailurePolicy::SkipDependents);
        let report = executor.run(&plan).await;

        assert_eq!(executor.ledger().deployed_names(), ["A", "D"]);
        let statuses: Vec<_> = report.outcomes().iter().map(|o| &o.status).collect();
        assert!(matches!(statuses[0], Status::Failed { kind: ErrorKind::DeploymentFailed, .. }));
        assert_eq!(*statuses[1], Status::Skipped { blocked_by: "A".to_string() });
        assert_eq!(*statuses[2], Status::Skipped { blocked_by: "A".to_string() });
        assert!(matches!(statuses[3], Status::Success { .. }));
        assert_eq!(report.success_count(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_account_reference_is_fatal_under_any_policy() {
        let registry = DescriptorRegistry::from_descriptors([
            ComponentDescriptor::new(
                "Roles",
                vec![ArgSpec::AccountList(vec![crate::AccountRef::Index(0)])],
            ),
            ComponentDescriptor::new("Other", vec![]),
        ])
        .expect("unique names");
        let plan = plan(&registry).expect("plannable");

        let executor = Executor::new(ScriptedLedger::default()).policy(FailurePolicy::SkipDependents);
        let report = executor.run(&plan).await;

        // "Other" sorts first and deploys; "Roles" fails to resolve and halts.
        assert_eq!(executor.ledger().deployed_names(), ["Other"]);
        let failure = report.first_failure().expect("Roles failed");
        assert_eq!(failure.name, "Roles");
        assert!(matches!(
            failure.status,
            Status::Failed { kind: ErrorKind::UnsupportedArgKind, .. }
        ));
    }

    #[tokio::test]
    async fn test_reference_to_undeployed_component_is_unresolved() {
        let plan = plan(&registry(&[("A", &[])])).expect("plannable");
        let step = PlanStep {
            name: "B".to_string(),
            args: vec![ArgSpec::component("A")],
            dependencies: vec!["A".to_string()],
        };

        let executor = Executor::new(ScriptedLedger::default());
        let err = executor.resolve_args(&step, &HashMap::new()).unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::UnresolvedDependency {
                component: "B".to_string(),
                dependency: "A".to_string(),
            }
        );
        assert!(executor.run(&plan).await.is_complete());
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_next_deployment() {
        let plan = plan(&registry(&[("A", &[]), ("B", &[])])).expect("plannable");
        let (cancel_tx, cancel_rx) = watch::channel(true);

        let executor = Executor::new(ScriptedLedger::default()).cancel_on(cancel_rx);
        let report = executor.run(&plan).await;
        drop(cancel_tx);

        assert!(executor.ledger().deployed_names().is_empty());
        assert!(report.was_cancelled());
        assert!(report.outcomes().is_empty());
        assert!(report.into_result().is_err());
    }

    /// Ledger that raises the cancel flag while its first deployment is in flight.
    struct CancellingLedger {
        cancel: watch::Sender<bool>,
        calls: Mutex<Vec<String>>,
    }

    impl LedgerClient for CancellingLedger {
        async fn deploy(&self, name: &str, _args: &[ResolvedArg]) -> Result<Address, LedgerError> {
            self.calls.lock().unwrap().push(name.to_string());
            self.cancel.send_replace(true);
            tokio::task::yield_now().await;
            Ok(Address::with_last_byte(0xa))
        }
    }

    #[tokio::test]
    async fn test_cancellation_lets_in_flight_deployment_finish() {
        let plan = plan(&registry(&[("A", &[]), ("B", &["A"]), ("C", &[])])).expect("plannable");
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let ledger = CancellingLedger {
            cancel: cancel_tx,
            calls: Mutex::new(Vec::new()),
        };

        let executor = Executor::new(ledger).cancel_on(cancel_rx);
        let report = executor.run(&plan).await;

        assert_eq!(*executor.ledger().calls.lock().unwrap(), ["A"]);
        assert_eq!(report.outcomes().len(), 1);
        assert_eq!(
            report.outcomes()[0].status,
            Status::Success { address: Address::with_last_byte(0xa) }
        );
        assert_eq!(report.address_of("A"), Some(Address::with_last_byte(0xa)));
        assert!(report.was_cancelled());
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_progress_events_cover_every_phase() {
        let plan = plan(&registry(&[("A", &[]), ("B", &["A"])])).expect("plannable");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let executor = Executor::new(ScriptedLedger::failing(vec!["B"])).sink(tx);
        executor.run(&plan).await;

        let mut phases = Vec::new();
        while let Ok(event) = rx.try_recv() {
            phases.push((event.component, event.phase));
        }
        assert_eq!(
            phases,
            [
                ("A".to_string(), Phase::Started),
                ("A".to_string(), Phase::Succeeded),
                ("B".to_string(), Phase::Started),
                ("B".to_string(), Phase::Failed),
            ]
        );
    }

    #[test]
    fn test_failure_policy_parsing() {
        assert_eq!("halt".parse::<FailurePolicy>(), Ok(FailurePolicy::Halt));
        assert_eq!(
            "skip-dependents".parse::<FailurePolicy>(),
            Ok(FailurePolicy::SkipDependents)
        );
    }
}
