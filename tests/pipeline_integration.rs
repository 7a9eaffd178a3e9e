//! End-to-end tests: simulated instrument, orchestrated run, profiles on disk.

use async_trait::async_trait;
use iv_daq::component::ComponentUnderTest;
use iv_daq::data::sample_file::SampleWriter;
use iv_daq::data::{AggregatedRow, AggregationEngine, DataLayout, RawSampleRow, SampleFile, SweepHeader};
use iv_daq::error::{AppResult, DaqError};
use iv_daq::experiment::{
    confirmation_channel, AutoConfirm, Orchestrator, RunPlan, RunState, SwapConfirmation,
};
use iv_daq::instrument::{ChannelSettings, InstrumentChannel, MockInstrument};
use iv_daq::sweep::SweepConfig;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn sweep() -> SweepConfig {
    SweepConfig::new(0.0, 1.0, 3, Duration::ZERO).unwrap()
}

fn component(name: &str) -> ComponentUnderTest {
    ComponentUnderTest::new(name).unwrap()
}

async fn connect(mock: MockInstrument) -> InstrumentChannel {
    InstrumentChannel::connect(Box::new(mock.spawn()), ChannelSettings::default())
        .await
        .unwrap()
}

/// Confirms every component and remembers which ones were asked for.
#[derive(Clone, Default)]
struct RecordingConfirm {
    asked: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl SwapConfirmation for RecordingConfirm {
    async fn confirm_installed(&mut self, component: &ComponentUnderTest) -> AppResult<()> {
        self.asked.lock().unwrap().push(component.name().to_string());
        Ok(())
    }
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-12,
        "expected {expected}, got {actual}"
    );
}

#[tokio::test]
async fn two_repeats_average_into_profile() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(tmp.path());
    let mut channel =
        connect(MockInstrument::scripted(vec![0.1, 0.2, 0.3, 0.3, 0.2, 0.1])).await;

    let plan = RunPlan::new(sweep(), vec!["test_0".into()], 2).unwrap();
    let (confirmer, confirmation) = confirmation_channel();
    let mut orchestrator = Orchestrator::new(plan, layout.clone(), confirmation);
    let mut states = orchestrator.subscribe();

    let operator = tokio::spawn(async move {
        states.wait_for(RunState::is_awaiting_swap).await.unwrap();
        confirmer.confirm("test_0").await.unwrap();
    });

    let report = orchestrator.run(&mut channel).await.unwrap();
    operator.await.unwrap();
    assert!(report.all_succeeded());

    let c = component("test_0");
    let raw = SampleFile::<RawSampleRow>::read(&layout.repeat_path(&c, 1)).unwrap();
    let currents: Vec<f64> = raw.rows.iter().map(|r| r.current).collect();
    assert_eq!(currents, vec![0.3, 0.2, 0.1]);

    let profile = SampleFile::<AggregatedRow>::read(&layout.profile_path(&c)).unwrap();
    assert_eq!(profile.header.component, "test_0");
    assert_eq!(profile.rows.len(), 3);

    let expected_std = [0.1, 0.0, 0.1];
    for (row, (voltage, std)) in profile.rows.iter().zip([0.0, 0.5, 1.0].iter().zip(expected_std)) {
        assert_close(row.mean_voltage, *voltage);
        assert_close(row.std_voltage, 0.0);
        assert_close(row.mean_current, 0.2);
        assert_close(row.std_current, std);
    }
    assert_eq!(orchestrator.state(), RunState::Finished);
}

#[tokio::test]
async fn malformed_reply_costs_one_component_only() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(tmp.path());
    // test_0, repeat 1, second point
    let mock = MockInstrument::scripted(vec![0.1, 0.2, 0.3]).with_malformed_current_at(4);
    let mut channel = connect(mock).await;

    let plan = RunPlan::new(sweep(), vec!["test_0".into(), "test_1".into()], 2).unwrap();
    let mut orchestrator = Orchestrator::new(plan, layout.clone(), AutoConfirm);
    let report = orchestrator.run(&mut channel).await.unwrap();

    let test_0 = component("test_0");
    let first = &report.outcomes[0];
    assert_eq!(first.completed_repeats, 1);
    assert!(first.failure.as_deref().unwrap_or_default().contains("<I1>"));
    assert!(!layout.profile_path(&test_0).exists());
    assert!(layout.repeat_path(&test_0, 0).exists());

    // the aborted repeat is left as a partial file and never aggregated
    let partial = tmp.path().join("test_0").join("test_0_1.txt.partial");
    assert_eq!(SampleFile::<RawSampleRow>::read(&partial).unwrap().rows.len(), 1);
    assert_eq!(layout.discover_repeats(&test_0).unwrap().len(), 1);

    let second = &report.outcomes[1];
    assert!(second.succeeded());
    assert!(layout.profile_path(&component("test_1")).exists());
}

#[tokio::test]
async fn reaggregation_reflects_current_repeat_files() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(tmp.path());
    let mut channel = connect(MockInstrument::scripted(vec![0.1, 0.2, 0.3, 0.3, 0.2, 0.1])).await;

    let plan = RunPlan::new(sweep(), vec!["test_0".into()], 2).unwrap();
    Orchestrator::new(plan, layout.clone(), AutoConfirm)
        .run(&mut channel)
        .await
        .unwrap();

    let c = component("test_0");
    std::fs::copy(layout.repeat_path(&c, 0), layout.repeat_path(&c, 2)).unwrap();

    let engine = AggregationEngine::new(layout.clone(), sweep());
    let profile = engine.aggregate(&c).unwrap();
    assert_eq!(profile.sources.len(), 3);

    let on_disk = SampleFile::<AggregatedRow>::read(&layout.profile_path(&c)).unwrap();
    assert_eq!(on_disk.rows.len(), 3);
    assert_close(on_disk.rows[0].mean_current, (0.1 + 0.3 + 0.1) / 3.0);
    assert_close(on_disk.rows[1].mean_current, 0.2);
}

#[tokio::test]
async fn misaligned_repeat_leaves_previous_profile_alone() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(tmp.path());
    let mut channel = connect(MockInstrument::diode()).await;

    let plan = RunPlan::new(sweep(), vec!["test_0".into()], 2).unwrap();
    Orchestrator::new(plan, layout.clone(), AutoConfirm)
        .run(&mut channel)
        .await
        .unwrap();

    let c = component("test_0");
    let before = std::fs::read_to_string(layout.profile_path(&c)).unwrap();

    let short = SweepConfig::new(0.0, 1.0, 2, Duration::ZERO).unwrap();
    let mut writer =
        SampleWriter::<RawSampleRow>::create(&layout.repeat_path(&c, 2), &SweepHeader::today(&c, &short))
            .unwrap();
    for voltage in [0.0, 1.0] {
        writer
            .append(&RawSampleRow {
                voltage,
                current: 0.0,
            })
            .unwrap();
    }
    writer.finish().unwrap();

    let err = AggregationEngine::new(layout.clone(), sweep())
        .aggregate(&c)
        .unwrap_err();
    assert!(matches!(
        err,
        DaqError::Alignment {
            expected_rows: 3,
            found_rows: 2,
            ..
        }
    ));
    assert_eq!(std::fs::read_to_string(layout.profile_path(&c)).unwrap(), before);
}

#[tokio::test]
async fn dropped_instrument_aborts_before_next_component() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(tmp.path());
    // two full points, then silence
    let mut channel = connect(MockInstrument::diode().with_close_after(6)).await;

    let plan = RunPlan::new(sweep(), vec!["test_0".into(), "test_1".into()], 1).unwrap();
    let mut orchestrator = Orchestrator::new(plan, layout.clone(), AutoConfirm);
    let err = orchestrator.run(&mut channel).await.unwrap_err();

    assert!(err.is_transport());
    assert!(channel.is_poisoned());
    assert_eq!(orchestrator.state(), RunState::Aborted);
    assert!(!layout.component_dir(&component("test_1")).exists());
}

#[tokio::test]
async fn link_lost_after_malformed_reply_stops_before_next_swap() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(tmp.path());
    // garbled current on the second point, link gone before its voltage reply
    let mock = MockInstrument::scripted(vec![0.1, 0.2, 0.3])
        .with_malformed_current_at(1)
        .with_close_after(5);
    let mut channel = connect(mock).await;

    let plan = RunPlan::new(sweep(), vec!["test_0".into(), "test_1".into()], 1).unwrap();
    let confirm = RecordingConfirm::default();
    let mut orchestrator = Orchestrator::new(plan, layout.clone(), confirm.clone());
    let err = orchestrator.run(&mut channel).await.unwrap_err();

    assert!(err.is_transport());
    assert_eq!(*confirm.asked.lock().unwrap(), vec!["test_0"]);
    assert_eq!(orchestrator.state(), RunState::Aborted);
    assert!(!layout.component_dir(&component("test_1")).exists());
}
