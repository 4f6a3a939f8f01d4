use std::path::PathBuf;

use anyhow::Context;

use rusty_ims::data::container;
use rusty_ims::data::model::{Channel, Dataset, WriteMode};

/// A synthetic ion: centre in (mz, dt, rt) and apex intensity.
#[derive(Clone, Copy)]
struct Ion {
    mz: f64,
    dt: f64,
    rt: f64,
    apex: f64,
}

const MZ_STEP: f64 = 0.5;
const DT_STEP: f64 = 0.25;
const RT_FRAMES: [f64; 6] = [1.0, 1.5, 2.0, 2.5, 3.0, 3.5];
/// Points below this are not written, like an instrument's centroiding floor.
const EMIT_FLOOR: f64 = 20.0;

fn profile(offset: f64, sigma: f64) -> f64 {
    (-offset.powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Sample every ion on the (mz, dt, rt) grid, add noise and keep points
/// above the emit floor.
fn simulate(ions: &[Ion], rng: &mut SimpleRng) -> anyhow::Result<Dataset> {
    let (mut mz, mut dt, mut rt, mut intensity) = (vec![], vec![], vec![], vec![]);
    for &frame in &RT_FRAMES {
        for ion in ions {
            let rt_weight = profile(frame - ion.rt, 0.5);
            for i in -8..=8 {
                for j in -12..=12 {
                    let m = ion.mz + i as f64 * MZ_STEP;
                    let d = ion.dt + j as f64 * DT_STEP;
                    let signal = ion.apex
                        * rt_weight
                        * profile(i as f64 * MZ_STEP, 1.0)
                        * profile(j as f64 * DT_STEP, 0.75);
                    let value = (signal + rng.gauss(0.0, 5.0)).round();
                    if value >= EMIT_FLOOR {
                        mz.push(m);
                        dt.push(d);
                        rt.push(frame);
                        intensity.push(value);
                    }
                }
            }
        }
    }
    Ok(Dataset::from_columns([
        ("mz", mz),
        ("drift_time", dt),
        ("retention_time", rt),
        ("intensity", intensity),
    ])?)
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut state = [0u64; 4];
        let mut x = seed;
        for slot in &mut state {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state }
    }

    fn next_u64(&mut self) -> u64 {
        let s = &mut self.state;
        let result = s[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = s[1] << 17;
        s[2] ^= s[0];
        s[3] ^= s[1];
        s[1] ^= s[2];
        s[0] ^= s[3];
        s[2] ^= t;
        s[3] = s[3].rotate_left(45);
        result
    }

    fn unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.unit().max(1e-15);
        let u2 = self.unit();
        mean + std_dev * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let output = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/sample_run.h5"));
    if output.exists() {
        anyhow::bail!("{} already exists. Please rename before continuing", output.display());
    }

    let mut rng = SimpleRng::new(42);
    let precursors: Vec<Ion> = (0..12)
        .map(|k| Ion {
            mz: 300.0 + 45.0 * k as f64 + (rng.unit() * 4.0).round() * MZ_STEP,
            dt: 15.0 + 1.5 * k as f64 + (rng.unit() * 4.0).round() * DT_STEP,
            rt: RT_FRAMES[k % RT_FRAMES.len()],
            apex: 2_000.0 + rng.unit() * 60_000.0,
        })
        .collect();

    // Fragments co-elute with their precursor at lower mz and slightly
    // earlier drift time.
    let fragments: Vec<Ion> = precursors
        .iter()
        .flat_map(|p| {
            [0.45, 0.7].map(|fraction| Ion {
                mz: (p.mz * fraction / MZ_STEP).round() * MZ_STEP,
                dt: p.dt - 4.0 * DT_STEP,
                rt: p.rt,
                apex: p.apex * fraction * 0.3,
            })
        })
        .collect();

    let ms1 = simulate(&precursors, &mut rng)?;
    let ms2 = simulate(&fragments, &mut rng)?;

    container::write_section(&output, Channel::Ms1.key(), &ms1, WriteMode::Overwrite)
        .with_context(|| format!("Failed to write ms1 to {}", output.display()))?;
    container::write_section(&output, Channel::Ms2.key(), &ms2, WriteMode::Append)
        .with_context(|| format!("Failed to write ms2 to {}", output.display()))?;

    println!(
        "Wrote {} ms1 and {} ms2 points to {}",
        ms1.len(),
        ms2.len(),
        output.display()
    );
    Ok(())
}
