//! Multi-component measurement run.
//!
//! For every component in the plan: wait for the operator to install it, run
//! the configured number of sweeps into numbered repeat files, then aggregate
//! them into the component's profile. Strictly sequential: one sweep owns the
//! instrument at a time.
//!
//! Failure policy:
//! - malformed responses and misaligned repeats cost only the current
//!   component, whose outcome records the reason
//! - transport and filesystem failures abort the run, since nothing after them
//!   can be trusted

use super::confirmation::SwapConfirmation;
use super::plan::RunPlan;
use super::state::{ComponentOutcome, RunReport, RunState};
use crate::component::ComponentUnderTest;
use crate::data::{AggregationEngine, DataLayout};
use crate::error::AppResult;
use crate::instrument::InstrumentChannel;
use crate::sweep::{SweepConfig, SweepExecutor, SweepSummary};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

/// Drives a [`RunPlan`] against one instrument channel.
pub struct Orchestrator<C> {
    plan: RunPlan,
    layout: DataLayout,
    confirmation: C,
    state_tx: watch::Sender<RunState>,
}

impl<C: SwapConfirmation> Orchestrator<C> {
    /// Orchestrator writing under `layout`, gated by `confirmation`.
    pub fn new(plan: RunPlan, layout: DataLayout, confirmation: C) -> Self {
        let (state_tx, _) = watch::channel(RunState::Idle);
        Self {
            plan,
            layout,
            confirmation,
            state_tx,
        }
    }

    /// Observe state transitions. The receiver always holds the latest state.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state_tx.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        self.state_tx.borrow().clone()
    }

    /// The plan being executed.
    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    fn set_state(&self, state: RunState) {
        info!(state = %state, "Run state changed");
        self.state_tx.send_replace(state);
    }

    /// Measure and aggregate every component in plan order.
    ///
    /// # Errors
    /// Returns the first run-fatal failure (transport, filesystem or operator
    /// abort). Component-local failures are reported in the [`RunReport`].
    #[instrument(skip_all, fields(components = self.plan.components().len(), repeats = self.plan.repeats()))]
    pub async fn run(&mut self, channel: &mut InstrumentChannel) -> AppResult<RunReport> {
        let executor = SweepExecutor::new(self.plan.sweep().clone())?;
        let engine = AggregationEngine::new(self.layout.clone(), self.plan.sweep().clone());
        let components = self.plan.components().to_vec();

        let mut report = RunReport::default();
        for component in &components {
            match self.run_component(channel, &executor, &engine, component).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    error!(component = %component, error = %e, "Run aborted");
                    self.set_state(RunState::Aborted);
                    return Err(e);
                }
            }
        }

        self.set_state(RunState::Finished);
        info!(
            succeeded = report.outcomes.iter().filter(|o| o.succeeded()).count(),
            failed = report.failures().count(),
            "Run finished"
        );
        Ok(report)
    }

    async fn run_component(
        &mut self,
        channel: &mut InstrumentChannel,
        executor: &SweepExecutor,
        engine: &AggregationEngine,
        component: &ComponentUnderTest,
    ) -> AppResult<ComponentOutcome> {
        let mut outcome = ComponentOutcome::new(component.name());
        let repeats = self.plan.repeats();

        self.set_state(RunState::AwaitingSwap {
            component: component.name().to_string(),
        });
        self.confirmation.confirm_installed(component).await?;
        self.layout.ensure_component_dir(component)?;

        for repeat in 0..repeats {
            self.set_state(RunState::Sweeping {
                component: component.name().to_string(),
                repeat,
                repeats,
            });
            let dest = self.layout.repeat_path(component, repeat);
            match executor.execute(channel, component, &dest).await {
                Ok(_) => outcome.completed_repeats += 1,
                Err(e) if e.is_fatal_to_run() => return Err(e),
                Err(e) => {
                    warn!(
                        component = %component,
                        repeat,
                        error = %e,
                        "Repeat failed, skipping remaining repeats and aggregation"
                    );
                    outcome.failure = Some(e.to_string());
                    return Ok(outcome);
                }
            }
        }

        self.set_state(RunState::Aggregating {
            component: component.name().to_string(),
        });
        match engine.aggregate(component) {
            Ok(profile) => outcome.profile = Some(profile.path),
            Err(e) if e.is_fatal_to_run() => return Err(e),
            Err(e) => {
                warn!(component = %component, error = %e, "Aggregation failed");
                outcome.failure = Some(e.to_string());
            }
        }
        Ok(outcome)
    }
}

/// One standalone sweep of `component` into `<root>/<comp>/<comp>.txt`.
///
/// No swap checkpoint and no aggregation; for quick checks of a single part.
#[instrument(skip_all, fields(component = %component))]
pub async fn collect_single(
    channel: &mut InstrumentChannel,
    layout: &DataLayout,
    sweep: SweepConfig,
    component: &ComponentUnderTest,
) -> AppResult<SweepSummary> {
    layout.ensure_component_dir(component)?;
    let dest = layout.single_sweep_path(component);
    SweepExecutor::new(sweep)?
        .execute(channel, component, &dest)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::confirmation::{confirmation_channel, AutoConfirm};
    use crate::instrument::{ChannelSettings, MockInstrument};
    use std::time::Duration;

    fn plan(components: &[&str], repeats: usize) -> RunPlan {
        RunPlan::new(
            SweepConfig::new(0.0, 1.0, 3, Duration::ZERO).unwrap(),
            components.iter().map(|c| c.to_string()).collect(),
            repeats,
        )
        .unwrap()
    }

    async fn channel(mock: MockInstrument) -> InstrumentChannel {
        InstrumentChannel::connect(Box::new(mock.spawn()), ChannelSettings::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn run_writes_repeats_and_profile_per_component() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(tmp.path());
        let mut channel = channel(MockInstrument::diode()).await;

        let mut orchestrator =
            Orchestrator::new(plan(&["test_0", "test_1"], 2), layout.clone(), AutoConfirm);
        let report = orchestrator.run(&mut channel).await.unwrap();

        assert!(report.all_succeeded());
        assert_eq!(report.outcomes.len(), 2);
        for outcome in &report.outcomes {
            let component = ComponentUnderTest::new(outcome.component.as_str()).unwrap();
            assert_eq!(outcome.completed_repeats, 2);
            assert_eq!(outcome.profile, Some(layout.profile_path(&component)));
            assert!(layout.repeat_path(&component, 0).exists());
            assert!(layout.repeat_path(&component, 1).exists());
        }
        assert_eq!(orchestrator.state(), RunState::Finished);
    }

    #[tokio::test]
    async fn waits_for_operator_before_each_component() {
        let tmp = tempfile::tempdir().unwrap();
        let mut channel = channel(MockInstrument::diode()).await;
        let (confirmer, confirmation) = confirmation_channel();

        let mut orchestrator =
            Orchestrator::new(plan(&["test_0", "test_1"], 1), DataLayout::new(tmp.path()), confirmation);
        let mut states = orchestrator.subscribe();

        let operator = tokio::spawn(async move {
            for expected in ["test_0", "test_1"] {
                states
                    .wait_for(|s| {
                        *s == RunState::AwaitingSwap {
                            component: expected.to_string(),
                        }
                    })
                    .await
                    .unwrap();
                confirmer.confirm(expected).await.unwrap();
            }
        });

        let report = orchestrator.run(&mut channel).await.unwrap();
        operator.await.unwrap();
        assert!(report.all_succeeded());
    }

    #[tokio::test]
    async fn malformed_response_skips_only_that_component() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(tmp.path());
        // third current reply of the run is garbled: test_0, repeat 0, point 2
        let mock = MockInstrument::scripted(vec![0.1, 0.2, 0.3]).with_malformed_current_at(2);
        let mut channel = channel(mock).await;

        let mut orchestrator = Orchestrator::new(plan(&["test_0", "test_1"], 2), layout.clone(), AutoConfirm);
        let report = orchestrator.run(&mut channel).await.unwrap();

        let first = &report.outcomes[0];
        assert_eq!(first.completed_repeats, 0);
        assert!(first.profile.is_none());
        assert!(first.failure.is_some());
        let test_0 = ComponentUnderTest::new("test_0").unwrap();
        assert!(!layout.profile_path(&test_0).exists());

        let second = &report.outcomes[1];
        assert!(second.succeeded());
        assert_eq!(second.completed_repeats, 2);
        assert!(!report.all_succeeded());
    }

    #[tokio::test]
    async fn transport_failure_aborts_the_run() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = MockInstrument::scripted(vec![0.1]).with_close_after(5);
        let mut channel = channel(mock).await;

        let mut orchestrator =
            Orchestrator::new(plan(&["test_0", "test_1"], 2), DataLayout::new(tmp.path()), AutoConfirm);
        let err = orchestrator.run(&mut channel).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(orchestrator.state(), RunState::Aborted);
    }

    #[tokio::test]
    async fn collect_writes_a_single_unnumbered_file() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(tmp.path());
        let mut channel = channel(MockInstrument::scripted(vec![0.5])).await;
        let component = ComponentUnderTest::new("red_LED").unwrap();

        let summary = collect_single(
            &mut channel,
            &layout,
            SweepConfig::new(0.0, 2.0, 5, Duration::ZERO).unwrap(),
            &component,
        )
        .await
        .unwrap();
        assert_eq!(summary.path, tmp.path().join("red_LED").join("red_LED.txt"));
        assert_eq!(summary.rows, 5);
        assert!(!layout.profile_path(&component).exists());
    }

    #[tokio::test]
    async fn operator_abort_stops_the_run() {
        let tmp = tempfile::tempdir().unwrap();
        let mut channel = channel(MockInstrument::diode()).await;
        let (confirmer, confirmation) = confirmation_channel();
        drop(confirmer);

        let mut orchestrator =
            Orchestrator::new(plan(&["test_0"], 1), DataLayout::new(tmp.path()), confirmation);
        assert!(orchestrator.run(&mut channel).await.is_err());
        assert_eq!(orchestrator.state(), RunState::Aborted);
    }
}
