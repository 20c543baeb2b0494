use std::collections::BTreeMap;
use std::f64::consts::PI;

use gait_sync::sync::decimate::Decimator;
use gait_sync::sync::envelope::envelopes;
use gait_sync::sync::resample::resample;
use gait_sync::{BoundaryMode, Channel, ModalityTable, SyncError, Synchronizer};

fn table(name: &str, rate: u32, n: usize, f: impl Fn(f64) -> f64) -> ModalityTable {
    let time: Vec<f64> = (0..n).map(|i| i as f64 / f64::from(rate)).collect();
    let values = time.iter().map(|&t| f(t)).collect();
    ModalityTable::new(name, rate, time, vec![Channel::new("x", values)]).unwrap()
}

fn trial() -> BTreeMap<String, ModalityTable> {
    let mut tables = BTreeMap::new();
    // 12.5 s, 10.0 s and 9.8 s recordings.
    tables.insert("kinetics".into(), table("kinetics", 1000, 12_501, |t| 2.0 * t));
    tables.insert("emg".into(), table("emg", 2000, 20_001, |t| (2.0 * PI * 5.0 * t).sin()));
    tables.insert("kinematics".into(), table("kinematics", 100, 981, |t| 2.0 * t));
    tables
}

#[test]
fn common_duration_is_the_shortest_recording() {
    let out = Synchronizer::new(1000).unwrap().synchronize(&trial()).unwrap();
    assert_eq!(out.common_duration(), 9.8);
    assert_eq!(out.len(), 9800);
    assert_eq!(out.modalities(), vec!["emg", "kinematics", "kinetics"]);
}

#[test]
fn every_table_shares_the_timeline() {
    let out = Synchronizer::new(1000).unwrap().synchronize(&trial()).unwrap();
    let timeline = out.timeline().as_slice();
    assert_eq!(timeline.len(), (out.common_duration() * 1000.0).floor() as usize);
    for table in out.tables().values() {
        assert_eq!(table.time(), timeline);
        assert_eq!(table.channels()[0].values.len(), timeline.len());
        assert_eq!(table.native_rate(), 1000);
    }
}

#[test]
fn upsampled_line_stays_on_the_line() {
    let out = Synchronizer::new(1000).unwrap().synchronize(&trial()).unwrap();
    let k = out.table("kinematics").unwrap();
    for (t, v) in k.time().iter().zip(&k.channels()[0].values) {
        assert!((v - 2.0 * t).abs() < 1e-9, "{v} vs {}", 2.0 * t);
    }
}

#[test]
fn decimated_emg_keeps_low_frequency_content() {
    let out = Synchronizer::new(1000).unwrap().synchronize(&trial()).unwrap();
    let emg = out.table("emg").unwrap();
    let values = &emg.channels()[0].values;
    for i in (500..9000).step_by(37) {
        let t = emg.time()[i];
        let expected = (2.0 * PI * 5.0 * t).sin();
        assert!((values[i] - expected).abs() < 5e-3, "t={t}: {} vs {expected}", values[i]);
    }
}

#[test]
fn resampler_extrapolates_past_the_end() {
    let source = table("k", 100, 101, |t| 2.0 * t); // 0..=1 s
    let target = [-0.5, 0.0, 0.333, 1.0, 1.7, 3.0];
    let out = resample(&source, &target, BoundaryMode::Extrapolate).unwrap();
    for (t, v) in target.iter().zip(&out.channels()[0].values) {
        assert!((v - 2.0 * t).abs() < 1e-9);
    }

    let clamped = resample(&source, &target, BoundaryMode::Clamp).unwrap();
    let v = &clamped.channels()[0].values;
    assert!((v[0] - 0.0).abs() < 1e-12);
    assert!((v[5] - 2.0).abs() < 1e-12);
}

#[test]
fn resampling_onto_own_time_is_identity() {
    let source = table("emg", 2000, 500, |t| (2.0 * PI * 37.0 * t).cos());
    let out = resample(&source, source.time(), BoundaryMode::Extrapolate).unwrap();
    for (a, b) in out.channels()[0].values.iter().zip(&source.channels()[0].values) {
        assert!((a - b).abs() < 1e-12);
    }
}

#[test]
fn one_valid_sample_gives_all_nan() {
    let mut values = vec![f64::NAN; 50];
    values[10] = 4.0;
    let time: Vec<f64> = (0..50).map(|i| i as f64 / 100.0).collect();
    let source = ModalityTable::new("k", 100, time, vec![Channel::new("x", values)]).unwrap();
    let target: Vec<f64> = (0..123).map(|i| i as f64 * 0.004).collect();
    let out = resample(&source, &target, BoundaryMode::Extrapolate).unwrap();
    assert_eq!(out.channels()[0].values.len(), 123);
    assert!(out.channels()[0].values.iter().all(|v| v.is_nan()));
}

#[test]
fn unrecoverable_channel_does_not_fail_synchronization() {
    // 2.0 s at 100 Hz: one good ramp and one channel with a single valid sample.
    let time: Vec<f64> = (0..201).map(|i| i as f64 / 100.0).collect();
    let ramp = time.iter().map(|t| 3.0 * t).collect();
    let mut sparse = vec![f64::NAN; 201];
    sparse[40] = 7.0;
    let kinematics = ModalityTable::new(
        "kinematics",
        100,
        time,
        vec![Channel::new("x", ramp), Channel::new("marker", sparse)],
    )
    .unwrap();

    // 1500 Hz is not an integer multiple of 1000 Hz: no anti-alias filtering.
    let emg = table("emg", 1500, 3001, |t| {
        if (t * 1500.0).round() as i64 % 2 == 0 { 1.0 } else { -1.0 }
    });

    let mut tables = BTreeMap::new();
    tables.insert("kinematics".to_string(), kinematics);
    tables.insert("emg".to_string(), emg.clone());
    let out = Synchronizer::new(1000).unwrap().synchronize(&tables).unwrap();
    assert_eq!(out.len(), 2000);

    let k = out.table("kinematics").unwrap();
    for (t, v) in k.time().iter().zip(&k.channel("x").unwrap().values) {
        assert!((v - 3.0 * t).abs() < 1e-9, "{v} vs {}", 3.0 * t);
    }
    let marker = &k.channel("marker").unwrap().values;
    assert_eq!(marker.len(), 2000);
    assert!(marker.iter().all(|v| v.is_nan()));

    let direct = resample(&emg, out.timeline().as_slice(), BoundaryMode::Extrapolate).unwrap();
    assert_eq!(out.table("emg").unwrap().channels()[0].values, direct.channels()[0].values);
}

#[test]
fn decimation_by_four_attenuates_aliasing_band() {
    let source = table("emg", 2000, 8000, |t| (2.0 * PI * 400.0 * t).sin());
    let out = Decimator::new().decimate(&source, 500).unwrap();
    assert_eq!(out.native_rate(), 500);

    let rms = |v: &[f64]| (v.iter().map(|x| x * x).sum::<f64>() / v.len() as f64).sqrt();
    let raw: Vec<f64> = source.channels()[0].values.iter().step_by(4).copied().collect();
    let inner = 100..out.len() - 100;
    let db = 20.0 * (rms(&out.channels()[0].values[inner.clone()]) / rms(&raw[inner])).log10();
    assert!(db < -20.0, "only {db:.1} dB");
}

#[test]
fn decimation_by_one_is_passthrough() {
    let source = table("kinetics", 1000, 300, |t| t * t);
    assert_eq!(Decimator::new().decimate(&source, 1000).unwrap(), source);
}

#[test]
fn zero_channel_has_zero_envelope() {
    let source = table("emg", 1000, 1000, |_| 0.0);
    let env = envelopes(&source, 50.0, 1000).unwrap();
    assert!(env.channels()[0].values.iter().all(|&v| v == 0.0));
}

#[test]
fn failure_aborts_the_whole_call() {
    let mut tables = trial();
    tables.insert("broken".into(), table("broken", 100, 1, |_| 0.0));
    let err = Synchronizer::new(1000).unwrap().synchronize(&tables).unwrap_err();
    assert!(matches!(err.root(), SyncError::InvalidDuration { .. }));
}

#[test]
fn empty_input_is_an_error() {
    let err = Synchronizer::new(1000)
        .unwrap()
        .synchronize(&BTreeMap::new())
        .unwrap_err();
    assert!(matches!(err, SyncError::NoModalities));
}
