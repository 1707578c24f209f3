use std::fs;

use proptest::prelude::*;
use tempfile::tempdir;
use uroflow::drivers::StoreError;
use uroflow::{summarize, DurableKey, PatientIdentity, Sample, SessionStore};

fn sample_strategy() -> impl Strategy<Value = Sample> {
    (0.0f64..1.0e6, -1.0e6f64..1.0e6, -1.0e6f64..1.0e6)
        .prop_map(|(t, flow, volume)| Sample::new(t, flow, volume))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stored_sessions_decode_exactly(samples in prop::collection::vec(sample_strategy(), 0..200)) {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let identity = PatientIdentity::new("P1", "Jane", "Doe");
        store.encode(&identity, &samples).unwrap();
        prop_assert_eq!(store.decode("P1").unwrap(), samples);
    }
}

#[test]
fn legacy_file_is_found_by_patient_id() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("P1_data.csv"),
        "Time (s),Flow,Volume\n0.0,1.0,2.0\n0.5,3.0,4.0\n",
    )
    .unwrap();
    let store = SessionStore::new(dir.path());
    assert_eq!(store.resolve("P1").unwrap(), DurableKey::legacy("P1"));
    assert_eq!(
        store.decode("P1").unwrap(),
        vec![Sample::new(0.0, 1.0, 2.0), Sample::new(0.5, 3.0, 4.0)]
    );
}

#[test]
fn qualified_key_wins_over_legacy() {
    let dir = tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    fs::write(
        dir.path().join("P1_data.csv"),
        "Time (s),Flow,Volume\n0,9,9\n",
    )
    .unwrap();
    let fresh = vec![Sample::new(0.0, 1.0, 1.0)];
    store
        .encode(&PatientIdentity::new("P1", "Jane", "Doe"), &fresh)
        .unwrap();
    assert_eq!(store.decode("P1").unwrap(), fresh);
}

#[test]
fn missing_and_corrupt_sessions_are_distinguished() {
    let dir = tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    assert!(matches!(
        store.decode("P404"),
        Err(StoreError::NotFound { .. })
    ));

    fs::write(
        dir.path().join("P5_data.csv"),
        "Time (s),Flow,Volume\n0,1,2\n1,oops,3\n",
    )
    .unwrap();
    match store.decode("P5") {
        Err(StoreError::MalformedRecord { row, .. }) => assert_eq!(row, 3),
        other => panic!("expected MalformedRecord, got {other:?}"),
    }
}

#[test]
fn saving_again_replaces_the_previous_session() {
    let dir = tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let identity = PatientIdentity::new("P3", "Alan", "Turing");
    let first: Vec<Sample> = (0..50).map(|i| Sample::new(i as f64, 1.0, i as f64)).collect();
    let second = vec![Sample::new(0.0, 7.0, 7.0)];

    let key_a = store.encode(&identity, &first).unwrap();
    let key_b = store.encode(&identity, &second).unwrap();
    assert_eq!(key_a, key_b);
    assert_eq!(store.decode("P3").unwrap(), second);
    assert_eq!(store.list().unwrap(), vec![key_b]);
}

#[test]
fn identical_sessions_report_identically() {
    let dir = tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let samples = vec![
        Sample::new(0.0, 0.0, 0.0),
        Sample::new(1.0, 12.5, 10.0),
        Sample::new(2.0, 12.5, 22.5),
        Sample::new(3.0, 4.0, 26.5),
    ];
    store
        .encode(&PatientIdentity::new("P8", "Lin", "Ma"), &samples)
        .unwrap();
    let loaded = store.decode("P8").unwrap();
    let a = summarize(&samples);
    let b = summarize(&loaded);
    assert_eq!(a, b);
    assert_eq!(a.time_to_max_flow, 1.0);
    assert_eq!(a.to_string(), b.to_string());
    assert!(a.to_string().starts_with("Maximum Flow Rate: 12.50\n"));
}

