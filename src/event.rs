//! Value types for RF, gradient, ADC and delay events, and the sequence
//! `Block` that carries up to one of each across all three gradient axes.
//!
//! Timing predicates and shape lookups live here rather than on `Sequence`
//! so both the codec and the scheduler can share them without depending on
//! the container that holds the blocks.

use crate::shape::decompress;

/// A normalized waveform shared by reference from the `[SHAPES]` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape(pub Vec<f64>);

impl Shape {
    pub fn uniform(value: f64, len: usize) -> Self {
        Self(vec![value; len])
    }

    pub fn from_compressed(num_samples: usize, data: &[f64]) -> Self {
        Self(decompress(num_samples, data))
    }
}

/// RF pulse event: a complex envelope on a uniform raster, a carrier
/// frequency offset, a phase offset, and a delay before the envelope starts.
#[derive(Debug, Clone)]
pub struct RfEvent {
    /// Amplitude envelope, normalized to `[0, 1]`, Hz after scaling by `amp`.
    pub amp_shape: Shape,
    /// Phase envelope in units of full turns (multiplied by `2*pi` on use).
    pub phase_shape: Shape,
    /// Peak amplitude in Hz (already divided by gamma on read).
    pub amp: f64,
    /// Carrier frequency offset, Hz.
    pub freq: f64,
    /// Phase offset, rad.
    pub phase: f64,
    /// Delay before the envelope's first sample, s.
    pub delay: f64,
    /// Sample spacing of `amp_shape`/`phase_shape`, s.
    pub raster: f64,
}

impl RfEvent {
    pub fn duration(&self) -> f64 {
        self.delay + self.amp_shape.0.len() as f64 * self.raster
    }

    /// Time of the envelope's peak magnitude, including `delay`.
    pub fn center(&self) -> f64 {
        let (idx, _) = self
            .amp_shape
            .0
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.abs().total_cmp(&b.abs()))
            .unwrap_or((0, &0.0));
        self.delay + (idx as f64 + 0.5) * self.raster
    }
}

/// A gradient waveform on one spatial axis.
#[derive(Debug, Clone)]
pub enum GradEvent {
    Trap {
        amp: f64,
        delay: f64,
        rise: f64,
        flat: f64,
        fall: f64,
    },
    Free {
        amp: f64,
        delay: f64,
        shape: Shape,
        raster: f64,
    },
}

impl GradEvent {
    pub fn delay(&self) -> f64 {
        match self {
            GradEvent::Trap { delay, .. } => *delay,
            GradEvent::Free { delay, .. } => *delay,
        }
    }

    pub fn duration(&self) -> f64 {
        match self {
            GradEvent::Trap {
                delay,
                rise,
                flat,
                fall,
                ..
            } => delay + rise + flat + fall,
            GradEvent::Free {
                delay,
                shape,
                raster,
                ..
            } => delay + shape.0.len() as f64 * raster,
        }
    }

    /// Corner times of this gradient relative to block start, for the
    /// scheduler's densification pass.
    pub fn corners(&self) -> Vec<f64> {
        match self {
            GradEvent::Trap {
                delay,
                rise,
                flat,
                fall,
                ..
            } => vec![*delay, delay + rise, delay + rise + flat, delay + rise + flat + fall],
            GradEvent::Free {
                delay,
                shape,
                raster,
                ..
            } => (0..=shape.0.len())
                .map(|i| delay + i as f64 * raster)
                .collect(),
        }
    }

    pub fn sample(&self, t: f64) -> f64 {
        match self {
            GradEvent::Trap {
                amp,
                delay,
                rise,
                flat,
                fall,
            } => amp * trap_sample(t - delay, *rise, *flat, *fall),
            GradEvent::Free {
                amp,
                delay,
                shape,
                raster,
            } => {
                let idx = ((t - delay) / raster - 0.5).round();
                if idx < 0.0 {
                    0.0
                } else {
                    shape.0.get(idx as usize).map_or(0.0, |x| amp * x)
                }
            }
        }
    }

    pub fn integrate(&self, t_start: f64, t_end: f64) -> f64 {
        match self {
            GradEvent::Trap {
                amp,
                delay,
                rise,
                flat,
                fall,
            } => amp * integrate_trap(t_start - delay, t_end - delay, *rise, *flat, *fall),
            GradEvent::Free {
                amp,
                delay,
                shape,
                raster,
            } => amp * integrate_free(t_start - delay, t_end - delay, shape, *raster),
        }
    }
}

pub fn trap_sample(t: f64, rise: f64, flat: f64, fall: f64) -> f64 {
    if t < 0.0 {
        0.0
    } else if t < rise {
        t / rise
    } else if t < rise + flat {
        1.0
    } else if t < rise + flat + fall {
        ((rise + flat + fall) - t) / fall
    } else {
        0.0
    }
}

pub fn integrate_trap(t_start: f64, t_end: f64, rise: f64, flat: f64, fall: f64) -> f64 {
    let integral = |t: f64| {
        if t <= 0.0 {
            0.0
        } else if t <= rise {
            0.5 * t * t / rise
        } else if t <= rise + flat {
            (0.5 * rise) + (t - rise)
        } else {
            let rev_t = rise + flat + fall - t;
            (0.5 * rise) + flat + (0.5 * (fall - rev_t * rev_t / fall))
        }
    };
    integral(t_end.min(rise + flat + fall)) - integral(t_start.max(0.0))
}

pub fn integrate_free(t_start: f64, t_end: f64, shape: &Shape, dwell: f64) -> f64 {
    let mut integrated = 0.0;
    for (i, &value) in shape.0.iter().enumerate() {
        let t = i as f64 * dwell;
        if t + dwell <= t_start {
            continue;
        }
        if t_end <= t {
            break;
        }
        let dur = if t_start <= t && t + dwell <= t_end {
            dwell
        } else {
            let t0 = f64::max(t_start, t);
            let t1 = f64::min(t_end, t + dwell);
            t1 - t0
        };
        integrated += value * dur;
    }
    integrated
}

/// ADC sampling window: `N` samples of `dwell` seconds each, starting
/// `delay` seconds into the block, at a fixed receiver phase/frequency.
#[derive(Debug, Clone, Copy)]
pub struct AdcEvent {
    pub num_samples: u32,
    pub dwell: f64,
    pub delay: f64,
    pub freq: f64,
    pub phase: f64,
}

impl AdcEvent {
    pub fn duration(&self) -> f64 {
        self.delay + self.num_samples as f64 * self.dwell
    }

    /// Center-of-dwell sample times, relative to block start.
    pub fn sample_times(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.num_samples).map(move |k| self.delay + (k as f64 + 0.5) * self.dwell)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientChannel {
    X,
    Y,
    Z,
}

/// One atomic span of the timeline, carrying up to one event of each kind.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub rf: Option<RfEvent>,
    pub gx: Option<GradEvent>,
    pub gy: Option<GradEvent>,
    pub gz: Option<GradEvent>,
    pub adc: Option<AdcEvent>,
    /// An explicit delay-only duration, used when no event in the block
    /// determines its length (e.g. a pure `Delay` block).
    pub delay: f64,
    /// The `[BLOCKS]` row's extension id, carried verbatim for round-trip
    /// writing. `0` means no extension chain; a nonzero id references
    /// `[EXTENSIONS]`, which this codec does not otherwise interpret.
    pub ext_id: u32,
}

impl Default for RfEvent {
    fn default() -> Self {
        Self {
            amp_shape: Shape(Vec::new()),
            phase_shape: Shape(Vec::new()),
            amp: 0.0,
            freq: 0.0,
            phase: 0.0,
            delay: 0.0,
            raster: 1.0,
        }
    }
}

impl Block {
    pub fn grad(&self, channel: GradientChannel) -> Option<&GradEvent> {
        match channel {
            GradientChannel::X => self.gx.as_ref(),
            GradientChannel::Y => self.gy.as_ref(),
            GradientChannel::Z => self.gz.as_ref(),
        }
    }

    /// Block duration: the maximum end time over all contained events.
    pub fn duration(&self) -> f64 {
        let mut d = self.delay;
        if let Some(rf) = &self.rf {
            d = d.max(rf.duration());
        }
        for g in [&self.gx, &self.gy, &self.gz] {
            if let Some(g) = g {
                d = d.max(g.duration());
            }
        }
        if let Some(adc) = &self.adc {
            d = d.max(adc.duration());
        }
        d
    }

    pub fn rf_on(&self) -> bool {
        self.rf.as_ref().is_some_and(|rf| rf.duration() > 0.0)
    }

    pub fn grad_on(&self, channel: GradientChannel) -> bool {
        self.grad(channel).is_some_and(|g| g.duration() > 0.0)
    }

    pub fn adc_on(&self) -> bool {
        self.adc.as_ref().is_some_and(|adc| adc.duration() > 0.0)
    }
}
