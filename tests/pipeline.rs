use std::collections::BTreeMap;
use std::path::Path;

use gait_sync::annotation::{AnnotationExport, GaitEventKind, ValidationStatus};
use gait_sync::data::export::{
    export_dataset, write_csv, write_parquet, DatasetDocument, ExportFormat, DATASET_JSON,
};
use gait_sync::data::loader::{load_file, LoadOptions};
use gait_sync::data::schema::ChannelRole;
use gait_sync::data::select::{window_range, ChannelSelection};
use gait_sync::{Channel, ModalityTable, SyncConfig, Synchronizer, TrialSession};
use pretty_assertions::assert_eq;

fn kinematics_csv(path: &Path, frames: usize) {
    let mut text = String::from(
        "Trajectories\n100\n,,S12:RTOE,,,S12:RCAL,,\nFrame,Sub Frame,X,Y,Z,X,Y,Z\n,,mm,mm,mm,mm,mm,mm\n",
    );
    for i in 0..frames {
        let t = i as f64 / 100.0;
        text.push_str(&format!(
            "{},0,1.0,{:.3},{:.3},2.0,{:.3},60.0\n",
            i + 1,
            1000.0 * t,
            40.0 + 10.0 * t,
            1000.0 * t - 180.0
        ));
    }
    std::fs::write(path, text).unwrap();
}

fn sine(name: &str, rate: u32, n: usize, freq: f64) -> ModalityTable {
    let time: Vec<f64> = (0..n).map(|i| i as f64 / f64::from(rate)).collect();
    let values = time
        .iter()
        .map(|t| (2.0 * std::f64::consts::PI * freq * t).sin())
        .collect();
    let values2 = time.iter().map(|t| 1.0 + t).collect();
    ModalityTable::new(
        name,
        rate,
        time,
        vec![Channel::new("TA", values), Channel::new("GAS", values2)],
    )
    .unwrap()
}

fn load_trial(dir: &Path) -> TrialSession {
    kinematics_csv(&dir.join("kinematics.csv"), 301);
    write_parquet(&sine("emg", 2000, 7001, 8.0), &dir.join("emg.parquet")).unwrap();
    write_csv(&sine("kinetics", 1000, 3201, 1.0), &dir.join("kinetics.csv")).unwrap();

    let mut session = TrialSession::new("T5");
    for file in ["kinematics.csv", "emg.parquet", "kinetics.csv"] {
        let table = load_file(&dir.join(file), &LoadOptions::default()).unwrap();
        session.add_table(table.name().to_string(), table);
    }
    session
}

#[test]
fn load_synchronize_and_export_json() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = load_trial(dir.path());

    let kin = &session.raw_tables()["kinematics"];
    assert_eq!(kin.native_rate(), 100);
    assert_eq!(kin.channel_by_role(ChannelRole::RightToeZ).unwrap().name, "S12:RTOE:Z");
    assert_eq!(session.raw_tables()["emg"].native_rate(), 2000);
    assert_eq!(session.raw_tables()["kinetics"].native_rate(), 1000);

    let config = SyncConfig::default();
    let dataset = session
        .synchronize(&Synchronizer::from_config(&config).unwrap())
        .unwrap();
    assert_eq!(dataset.common_duration(), 3.0);
    assert_eq!(dataset.len(), 3000);

    let out = dir.path().join("out");
    let selection = ChannelSelection::default().only("emg", ["TA"]);
    let range = window_range(dataset.timeline().as_slice(), 1.0, 2.0);
    let paths = export_dataset(dataset, &selection, range.clone(), &out, ExportFormat::Json).unwrap();
    assert_eq!(paths, vec![out.join(DATASET_JSON)]);

    let doc: DatasetDocument =
        serde_json::from_str(&std::fs::read_to_string(&paths[0]).unwrap()).unwrap();
    assert_eq!(doc.target_rate, 1000);
    assert_eq!(doc.timeline.len(), range.len());
    assert!(doc.timeline[0] >= 1.0 && *doc.timeline.last().unwrap() <= 2.0);
    let emg = &doc.tables["emg"];
    assert_eq!(emg.channels.len(), 1);
    assert_eq!(emg.channels[0].name, "TA");
    assert_eq!(doc.tables["kinematics"].channels.len(), 6);
    assert_eq!(doc.tables["kinetics"].time, doc.timeline);
}

#[test]
fn csv_export_reloads_onto_the_same_timeline() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = load_trial(dir.path());
    session
        .synchronize(&Synchronizer::new(500).unwrap())
        .unwrap();
    let dataset = session.synchronized().unwrap();
    let all = ChannelSelection::all(dataset.tables());

    let out = dir.path().join("csv");
    let paths =
        export_dataset(dataset, &all, 0..dataset.len(), &out, ExportFormat::Csv).unwrap();
    assert_eq!(paths.len(), 3);

    let options = LoadOptions::named("kinetics").with_rate(500);
    let back = load_file(&out.join("kinetics.csv"), &options).unwrap();
    let original = dataset.table("kinetics").unwrap();
    assert_eq!(back.len(), original.len());
    for (a, b) in back.time().iter().zip(original.time()) {
        assert!((a - b).abs() < 1e-12);
    }
}

#[test]
fn envelopes_and_annotations() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = load_trial(dir.path());
    session
        .synchronize(&Synchronizer::new(1000).unwrap())
        .unwrap();

    let env = session.compute_envelopes("emg", 50.0).unwrap();
    assert_eq!(env.channel_names(), vec!["TA_envelope", "GAS_envelope"]);
    // Rectified 8 Hz sine averages 2/pi.
    let mid = &env.channels()[0].values[1000..2000];
    let mean = mid.iter().sum::<f64>() / mid.len() as f64;
    assert!((mean - 2.0 / std::f64::consts::PI).abs() < 0.05, "{mean}");

    for (kind, t) in [
        (GaitEventKind::LeftHeelStrike, 0.2),
        (GaitEventKind::LeftToeOff, 0.8),
        (GaitEventKind::RightHeelStrike, 0.75),
        (GaitEventKind::RightToeOff, 1.3),
    ] {
        session.record_event(kind, t).unwrap();
    }
    let extra = session.record_event(GaitEventKind::LeftHeelStrike, 2.0).unwrap();
    session.events.retract(extra.id).unwrap();

    let validation = session.events.validate();
    assert_eq!(validation.status, ValidationStatus::Valid);
    assert_eq!(validation.total_events, 4);

    let path = dir.path().join("T5_ground_truth_events.json");
    let dataset = session.synchronized().unwrap();
    session.events.export_json("T5", dataset, &path).unwrap();
    let doc: AnnotationExport =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc.trial_info.trial_id, "T5");
    assert_eq!(doc.trial_info.total_events, 4);
    assert_eq!(doc.trial_info.sampling_rate_hz, 1000);
    assert_eq!(doc.trial_info.duration_seconds, 3.0);
    assert_eq!(
        doc.methodology.data_modalities,
        vec!["emg", "kinematics", "kinetics"]
    );
    let kinds: Vec<GaitEventKind> = doc.events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            GaitEventKind::LeftHeelStrike,
            GaitEventKind::RightHeelStrike,
            GaitEventKind::LeftToeOff,
            GaitEventKind::RightToeOff
        ]
    );
}

#[test]
fn config_boundary_reaches_the_synchronizer() {
    let config: SyncConfig = serde_json::from_str(r#"{"target_rate": 250, "boundary": "clamp"}"#).unwrap();
    let sync = Synchronizer::from_config(&config).unwrap();
    assert_eq!(sync.target_rate(), 250);
    assert_eq!(sync.boundary().to_string(), "clamp");

    let mut tables = BTreeMap::new();
    tables.insert("emg".to_string(), sine("emg", 2000, 2001, 3.0));
    let out = sync.synchronize(&tables).unwrap();
    assert_eq!(out.len(), 250);
}
