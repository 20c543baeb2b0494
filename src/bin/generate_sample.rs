//! Writes a synthetic walking trial in the vendor CSV layout:
//! kinetics at 1000 Hz, EMG at 2000 Hz, kinematics at 100 Hz, each with a
//! slightly different recording length.
//!
//! Usage: `generate_sample [DIR]` (default `sample_data`).

use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gait_sync::data::schema::FORCE_PLATE_COMPONENTS;

const SUBJECT: &str = "S12";
const STRIDE_S: f64 = 1.1;
/// Fraction of the stride spent in stance.
const STANCE: f64 = 0.6;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        mean + std_dev * z
    }
}

/// Gait phase in `[0, 1)` for a foot; the right foot lags half a stride.
fn phase(t: f64, right: bool) -> f64 {
    let offset = if right { 0.5 } else { 0.0 };
    (t / STRIDE_S + offset).rem_euclid(1.0)
}

/// Vertical ground reaction force: double-hump during stance, zero in swing.
fn vertical_force(p: f64) -> f64 {
    if p >= STANCE {
        return 0.0;
    }
    let s = p / STANCE;
    700.0 * ((PI * s).sin() + 0.25 * (3.0 * PI * s).sin().abs())
}

/// Foot marker height in mm: on the floor in stance, lifted in swing.
fn marker_height(p: f64, base: f64) -> f64 {
    if p < STANCE {
        base
    } else {
        base + 120.0 * (PI * (p - STANCE) / (1.0 - STANCE)).sin()
    }
}

/// Vendor layout header: title, rate, group labels, names, units.
fn write_header(
    w: &mut csv::Writer<std::fs::File>,
    title: &str,
    rate: u32,
    groups: &[String],
    names: &[String],
    units: &[String],
) -> Result<()> {
    let pad = |row: &[String]| -> Vec<String> {
        let mut out = vec![String::new(), String::new()];
        out.extend(row.iter().cloned());
        out
    };
    w.write_record([title])?;
    w.write_record([rate.to_string()])?;
    w.write_record(pad(groups))?;
    let mut name_row = vec!["Frame".to_string(), "Sub Frame".to_string()];
    name_row.extend(names.iter().cloned());
    w.write_record(name_row)?;
    w.write_record(pad(units))?;
    Ok(())
}

fn writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))
}

fn data_row(frame: usize, sub_frame: usize, values: impl Iterator<Item = f64>) -> Vec<String> {
    let mut row = vec![(frame + 1).to_string(), sub_frame.to_string()];
    row.extend(values.map(|v| format!("{v:.4}")));
    row
}

fn write_kinetics(path: &Path, seconds: f64, rng: &mut SimpleRng) -> Result<usize> {
    let rate = 1000;
    let n = (seconds * f64::from(rate)) as usize;
    let mut groups = Vec::new();
    for plate in 1..=2 {
        groups.push(format!("Imported Force Plate #{plate} - Force"));
        groups.extend(std::iter::repeat(String::new()).take(FORCE_PLATE_COMPONENTS.len() - 1));
    }
    let names: Vec<String> = (0..2)
        .flat_map(|_| FORCE_PLATE_COMPONENTS.iter().map(|c| c.to_string()))
        .collect();
    let units: Vec<String> = (0..2)
        .flat_map(|_| ["N", "N", "N", "N.mm", "N.mm", "N.mm", "mm", "mm", "mm"])
        .map(String::from)
        .collect();

    let mut w = writer(path)?;
    write_header(&mut w, "Devices", rate, &groups, &names, &units)?;
    for i in 0..n {
        let t = i as f64 / f64::from(rate);
        let mut values = Vec::with_capacity(18);
        for right in [false, true] {
            let p = phase(t, right);
            let fz = vertical_force(p);
            let fy = if p < STANCE {
                -80.0 * (2.0 * PI * p / STANCE).sin()
            } else {
                0.0
            };
            let cop_y = if fz > 0.0 { 250.0 * p / STANCE - 125.0 } else { 0.0 };
            values.extend([
                rng.gauss(0.0, 2.0),
                fy + rng.gauss(0.0, 2.0),
                fz + rng.gauss(0.0, 3.0),
                rng.gauss(0.0, 50.0),
                rng.gauss(0.0, 50.0),
                rng.gauss(0.0, 50.0),
                0.0,
                cop_y,
                0.0,
            ]);
        }
        w.write_record(data_row(i, 0, values.into_iter()))?;
    }
    w.flush()?;
    Ok(n)
}

fn write_emg(path: &Path, seconds: f64, rng: &mut SimpleRng) -> Result<usize> {
    let rate = 2000;
    let n = (seconds * f64::from(rate)) as usize;
    // (muscle, side, centre of the burst as a phase, burst width)
    let muscles = [
        ("L_TA", false, 0.0, 0.15),
        ("L_GAS", false, 0.45, 0.12),
        ("R_TA", true, 0.0, 0.15),
        ("R_GAS", true, 0.45, 0.12),
    ];
    let mut groups = vec!["EMG Amplifier - Voltage".to_string()];
    groups.extend(std::iter::repeat(String::new()).take(muscles.len() - 1));
    let names: Vec<String> = muscles.iter().map(|m| m.0.to_string()).collect();
    let units = vec!["V".to_string(); muscles.len()];

    let mut w = writer(path)?;
    write_header(&mut w, "Devices", rate, &groups, &names, &units)?;
    for i in 0..n {
        let t = i as f64 / f64::from(rate);
        let values: Vec<f64> = muscles
            .iter()
            .map(|&(_, right, centre, width)| {
                let p = phase(t, right);
                let d = (p - centre + 0.5).rem_euclid(1.0) - 0.5;
                let amplitude = 0.02 + 0.5 * (-(d / width).powi(2)).exp();
                amplitude * rng.gauss(0.0, 1.0) * 1e-3
            })
            .collect();
        // Two device samples per 1000 Hz frame.
        w.write_record(data_row(i / 2, i % 2, values.into_iter()))?;
    }
    w.flush()?;
    Ok(n)
}

fn write_kinematics(path: &Path, seconds: f64, rng: &mut SimpleRng) -> Result<usize> {
    let rate = 100;
    let n = (seconds * f64::from(rate)) as usize;
    // (marker, right foot, forward offset in mm, floor height in mm)
    let markers = [
        ("RTOE", true, 180.0, 40.0),
        ("RCAL", true, 0.0, 60.0),
        ("LTOE", false, 180.0, 40.0),
        ("LCAL", false, 0.0, 60.0),
    ];
    let mut groups = Vec::new();
    let mut names = Vec::new();
    for (marker, ..) in &markers {
        groups.push(format!("{SUBJECT}:{marker}"));
        groups.extend([String::new(), String::new()]);
        names.extend(["X", "Y", "Z"].map(String::from));
    }
    let units = vec!["mm".to_string(); names.len()];

    let mut w = writer(path)?;
    write_header(&mut w, "Trajectories", rate, &groups, &names, &units)?;
    for i in 0..n {
        let t = i as f64 / f64::from(rate);
        let mut values = Vec::with_capacity(names.len());
        for &(_, right, forward, floor) in &markers {
            let p = phase(t, right);
            let lateral = if right { 100.0 } else { -100.0 };
            values.extend([
                lateral + rng.gauss(0.0, 0.5),
                forward + 1200.0 * t + rng.gauss(0.0, 0.5),
                marker_height(p, floor) + rng.gauss(0.0, 0.5),
            ]);
        }
        w.write_record(data_row(i, 0, values.into_iter()))?;
    }
    w.flush()?;
    Ok(n)
}

fn main() -> Result<()> {
    env_logger::init();
    let dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_data"));
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut rng = SimpleRng::new(42);
    let outputs = [
        ("kinetics", 12.5, write_kinetics as fn(&Path, f64, &mut SimpleRng) -> Result<usize>),
        ("emg", 10.0, write_emg),
        ("kinematics", 9.8, write_kinematics),
    ];
    for (name, seconds, write) in outputs {
        let path = dir.join(format!("{name}.csv"));
        let n = write(&path, seconds, &mut rng)?;
        println!("Wrote {n} samples ({seconds} s) to {}", path.display());
    }
    Ok(())
}
