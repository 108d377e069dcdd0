//! Duration counters through the engine

mod common;

use chrono::{Duration, Utc};
use common::{at, SyntheticLog, ALARM_KEY};
use rstest::rstest;
use statewatch_rs::{
    AccumulationRequest, CounterSpec, CounterUnit, FixedClock, InMemorySampleLog, Sample,
    SampleBuilder, StateEngine, StateError,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn engine_at(samples: Vec<Sample>, now: i64) -> StateEngine<InMemorySampleLog> {
    StateEngine::builder()
        .store(Arc::new(InMemorySampleLog::from_samples(samples)))
        .clock(Arc::new(FixedClock::new(at(now))))
        .build()
        .unwrap()
}

fn running(minutes: i64, value: bool) -> Sample {
    SampleBuilder::new("press-1/running")
        .timestamp(at(minutes))
        .value(value)
        .build()
}

#[rstest]
#[case(-10_000)]
#[case(0)]
#[case(59)]
#[case(100_000)]
#[tokio::test]
async fn test_key_without_samples_is_always_zero(#[case] anchor: i64) {
    let engine = engine_at(vec![running(5, true)], 600);
    let request = AccumulationRequest::new("ghost", true, at(anchor), CounterUnit::Minute);
    let counter = engine
        .get_accumulated_duration(&request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(counter.total_minutes, 0);
    assert_eq!(counter.formatted, "0 min");
}

#[tokio::test]
async fn test_single_true_sample_runs_until_now() {
    let anchor = Utc::now() - Duration::minutes(90);
    let log = InMemorySampleLog::from_samples(vec![SampleBuilder::new("press-1/running")
        .timestamp(anchor - Duration::minutes(30))
        .value(true)
        .build()]);
    let engine = StateEngine::builder()
        .store(Arc::new(log))
        .build()
        .unwrap();

    let request = AccumulationRequest::new("press-1/running", true, anchor, CounterUnit::Minute);
    let counter = engine
        .get_accumulated_duration(&request, &CancellationToken::new())
        .await
        .unwrap();
    let expected = (Utc::now() - anchor).num_minutes() as u64;
    assert!(counter.total_minutes.abs_diff(expected) <= 1);
}

#[tokio::test]
async fn test_cycles_after_anchor_are_summed() {
    let engine = engine_at(
        vec![
            running(0, false),
            running(100, true),
            running(160, false),
            running(200, true),
            running(230, false),
            running(300, true),
        ],
        2_000,
    );
    let request = AccumulationRequest::new("press-1/running", true, at(50), CounterUnit::All);
    let counter = engine
        .get_accumulated_duration(&request, &CancellationToken::new())
        .await
        .unwrap();
    // 60 + 30 + open tail of 1700
    assert_eq!(counter.total_minutes, 1_790);
    assert_eq!(counter.formatted, "1j 5h 50min");
}

#[tokio::test]
async fn test_samples_after_now_are_not_counted() {
    let engine = engine_at(
        vec![running(50, false), running(200, true), running(300, false)],
        100,
    );
    let request = AccumulationRequest::new("press-1/running", true, at(0), CounterUnit::Minute);
    let counter = engine
        .get_accumulated_duration(&request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(counter.total_minutes, 50);
}

#[rstest]
#[case(CounterUnit::Minute, "1500 min")]
#[case(CounterUnit::Hour, "25 h")]
#[case(CounterUnit::Day, "1 j")]
#[case(CounterUnit::All, "1j 1h 0min")]
#[tokio::test]
async fn test_1500_minutes_in_every_unit(#[case] unit: CounterUnit, #[case] expected: &str) {
    let engine = engine_at(vec![running(0, true)], 1_500);
    let request = AccumulationRequest::new("press-1/running", true, at(0), unit);
    let counter = engine
        .get_accumulated_duration(&request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(counter.total_minutes, 1_500);
    assert_eq!(counter.formatted, expected);
}

#[tokio::test]
async fn test_counter_scans_close_their_cursors() {
    let log = Arc::new(SyntheticLog::new(50));
    let engine = StateEngine::builder()
        .store(log.clone())
        .clock(Arc::new(FixedClock::new(at(100))))
        .build()
        .unwrap();
    // Alarm on during every even minute since minute 10
    let request = AccumulationRequest::new(ALARM_KEY, true, at(10), CounterUnit::Minute);
    let counter = engine
        .get_accumulated_duration(&request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(counter.total_minutes, 45);
    assert_eq!(log.opened(), 2);
    assert_eq!(log.closes(), 2);
}

#[tokio::test]
async fn test_failing_counter_fails_the_batch() {
    let log = Arc::new(SyntheticLog::new(50).fail_after(3));
    let engine = StateEngine::builder()
        .store(log.clone())
        .clock(Arc::new(FixedClock::new(at(100))))
        .build()
        .unwrap();
    let specs = vec![
        CounterSpec::Gauge {
            key: ALARM_KEY.to_string(),
            unit: CounterUnit::Minute,
        },
        CounterSpec::Duration(AccumulationRequest::new(
            ALARM_KEY,
            true,
            at(10),
            CounterUnit::Minute,
        )),
    ];
    let err = engine
        .get_counters(&specs, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StateError::StoreUnavailable(_)));
    assert_eq!(log.opened(), log.closes());
}
