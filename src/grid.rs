//! The adaptive non-uniform time-grid scheduler.
//!
//! Densifies the timeline near RF envelopes, gradient ramps and ADC
//! windows, and leaves dead time sparsely sampled. The per-block corner
//! search walks each block's event boundaries once and folds the result
//! into a single whole-sequence grid, rather than answering an on-demand
//! "next point of interest after t" query.

use crate::event::GradientChannel;
use crate::sequence::Sequence;
use crate::util::EPS;

/// The `(t, dt)` pair handed to the Bloch integrator, plus the block-level
/// bookkeeping the excitation/precession kernel split needs.
pub struct TimeGrid {
    /// Sample times, strictly increasing.
    pub t: Vec<f64>,
    /// Interval to the *next* sample: `dt[i] = t[i+1] - t[i]`. Same length as `t`.
    pub dt: Vec<f64>,
    /// `true` for every step whose interval lies inside an RF-on window.
    pub rf_on: Vec<bool>,
    /// Indices into `t` closest to each RF pulse's start and end.
    pub rf_breaks: Vec<usize>,
    /// Absolute ADC sample instants (center-of-dwell), used to tag which
    /// grid points the signal assembler should read out.
    pub adc_sample_times: Vec<f64>,
}

/// Builds the adaptive grid for `seq` given nominal gradient/ADC and RF
/// step sizes.
pub fn build(seq: &Sequence, dt_gr: f64, dt_rf: f64) -> TimeGrid {
    let starts = seq.block_starts();
    let mut times: Vec<f64> = Vec::new();
    let mut rf_windows: Vec<(f64, f64)> = Vec::new();
    let mut adc_sample_times: Vec<f64> = Vec::new();

    for (i, block) in seq.blocks().iter().enumerate() {
        let t0 = starts[i];

        if let Some(rf) = &block.rf {
            let t1 = t0 + rf.delay;
            let t2 = t0 + rf.duration();
            let tc = t0 + rf.center();
            rf_windows.push((t1, t2));

            let keys = [t1, t1 + EPS, tc, (t2 - EPS).max(t1), t2];
            densify_keys(&keys, dt_rf, &mut times);
        }

        for axis in [GradientChannel::X, GradientChannel::Y, GradientChannel::Z] {
            if let Some(grad) = block.grad(axis) {
                if grad.duration() > 0.0 {
                    let corners: Vec<f64> = grad.corners().iter().map(|c| t0 + c).collect();
                    let mut keyed = Vec::with_capacity(corners.len() * 2);
                    for (idx, &c) in corners.iter().enumerate() {
                        if idx == 0 {
                            keyed.push(c);
                        } else {
                            keyed.push(c - EPS);
                            keyed.push(c);
                        }
                    }
                    densify_keys(&keyed, dt_gr, &mut times);
                }
            }
        }

        if let Some(adc) = &block.adc {
            for s in adc.sample_times() {
                times.push(t0 + s);
                adc_sample_times.push(t0 + s);
            }
        }
    }

    if times.is_empty() {
        times.push(0.0);
    }

    times.sort_by(|a, b| a.total_cmp(b));
    times.dedup_by(|a, b| (*a - *b).abs() < EPS);

    let first = times[0] - EPS;
    let last = times[times.len() - 1] + EPS;
    times.insert(0, first);
    times.push(last);

    let t: Vec<f64> = times[..times.len() - 1].to_vec();
    let dt: Vec<f64> = times.windows(2).map(|w| w[1] - w[0]).collect();

    let rf_on: Vec<bool> = t
        .iter()
        .map(|&ti| rf_windows.iter().any(|&(a, b)| ti >= a && ti < b))
        .collect();

    let rf_breaks = rf_windows
        .iter()
        .flat_map(|&(a, b)| [closest_index(&t, a), closest_index(&t, b)])
        .collect();

    adc_sample_times.sort_by(|a, b| a.total_cmp(b));
    adc_sample_times.dedup_by(|a, b| (*a - *b).abs() < EPS);

    TimeGrid {
        t,
        dt,
        rf_on,
        rf_breaks,
        adc_sample_times,
    }
}

/// Inserts `spacing`-separated samples between each consecutive pair of
/// `keys`, plus the keys themselves.
fn densify_keys(keys: &[f64], spacing: f64, out: &mut Vec<f64>) {
    for w in keys.windows(2) {
        let (a, b) = (w[0], w[1]);
        out.push(a);
        if b > a {
            let n = ((b - a) / spacing).ceil() as usize;
            for k in 1..n {
                out.push(a + k as f64 * spacing);
            }
        }
    }
    if let Some(&last) = keys.last() {
        out.push(last);
    }
}

fn closest_index(t: &[f64], target: f64) -> usize {
    match t.binary_search_by(|x| x.total_cmp(&target)) {
        Ok(i) => i,
        Err(i) => {
            if i == 0 {
                0
            } else if i >= t.len() {
                t.len() - 1
            } else if (t[i] - target).abs() < (t[i - 1] - target).abs() {
                i
            } else {
                i - 1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::build;
    use crate::event::{AdcEvent, Block};
    use crate::sequence::Sequence;
    use assert2::check;

    #[test]
    fn monotonic_and_equal_length() {
        let mut block = Block::default();
        block.adc = Some(AdcEvent {
            num_samples: 10,
            dwell: 1e-3,
            delay: 0.0,
            freq: 0.0,
            phase: 0.0,
        });
        let seq = Sequence::new(vec![block]);
        let grid = build(&seq, 1e-3, 1e-5);

        check!(grid.t.len() == grid.dt.len());
        for w in grid.t.windows(2) {
            check!(w[1] > w[0]);
        }
    }

    #[test]
    fn adc_sample_times_are_covered() {
        let mut block = Block::default();
        let adc = AdcEvent {
            num_samples: 5,
            dwell: 1e-3,
            delay: 0.0,
            freq: 0.0,
            phase: 0.0,
        };
        let sample_times: Vec<f64> = adc.sample_times().collect();
        block.adc = Some(adc);
        let seq = Sequence::new(vec![block]);
        let grid = build(&seq, 1e-3, 1e-5);

        for st in sample_times {
            let found = grid.t.iter().any(|&t| (t - st).abs() < 1e-9);
            check!(found);
        }
    }

    #[test]
    fn empty_sequence_yields_single_bracketed_interval() {
        let seq = Sequence::new(vec![]);
        let grid = build(&seq, 1e-3, 1e-5);
        check!(grid.t.len() == grid.dt.len());
        check!(!grid.t.is_empty());
    }
}
