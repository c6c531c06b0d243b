//! The `Sequence` container: an ordered list of concurrent-event blocks.
//!
//! Earlier revisions of this crate wrapped a `Box<dyn Backend>` trait object
//! so the same API could serve several file-format backends at once. Now
//! that the Pulseq codec is the sole source of sequences, `Sequence` owns
//! its blocks directly; `concat`/`scale_amplitude`/`subset` operate on that
//! owned `Vec<Block>` instead of forwarding through a trait object.

use crate::event::{Block, GradEvent, GradientChannel};

/// A disseqt sequence: an ordered, immutable list of blocks concatenated
/// end-to-end on a monotonically increasing time axis.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    pub(crate) blocks: Vec<Block>,
    pub(crate) fov: Option<(f64, f64, f64)>,
}

impl Sequence {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks, fov: None }
    }

    pub fn with_fov(mut self, fov: (f64, f64, f64)) -> Self {
        self.fov = Some(fov);
        self
    }

    pub fn fov(&self) -> Option<(f64, f64, f64)> {
        self.fov
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Total duration: the sum of all block durations.
    pub fn duration(&self) -> f64 {
        self.blocks.iter().map(Block::duration).sum()
    }

    /// Start time of block `i`, i.e. the sum of all prior block durations.
    pub fn block_start(&self, i: usize) -> f64 {
        self.blocks[..i].iter().map(Block::duration).sum()
    }

    /// Start time of every block, same length as `self.blocks()`.
    pub fn block_starts(&self) -> Vec<f64> {
        let mut t = 0.0;
        self.blocks
            .iter()
            .map(|b| {
                let start = t;
                t += b.duration();
                start
            })
            .collect()
    }

    pub fn rf_on(&self, block: usize) -> bool {
        self.blocks[block].rf_on()
    }

    pub fn grad_on(&self, block: usize, axis: GradientChannel) -> bool {
        self.blocks[block].grad_on(axis)
    }

    pub fn adc_on(&self, block: usize) -> bool {
        self.blocks[block].adc_on()
    }

    /// Time-of-maximum of `|RF envelope|`, including delay, relative to
    /// block start. Used to align the scheduler's grid to the pulse center.
    pub fn rf_center(&self, block: usize) -> Option<f64> {
        self.blocks[block].rf.as_ref().map(|rf| rf.center())
    }

    /// Concatenation: `a.concat(b)` is a sequence whose blocks are
    /// `a.blocks ++ b.blocks`. FOV is taken from `self` if present.
    pub fn concat(mut self, other: Sequence) -> Self {
        self.blocks.extend(other.blocks);
        if self.fov.is_none() {
            self.fov = other.fov;
        }
        self
    }

    /// Scales every gradient amplitude by `factor`; RF is untouched.
    pub fn scale_amplitude(mut self, factor: f64) -> Self {
        for block in &mut self.blocks {
            for grad in [&mut block.gx, &mut block.gy, &mut block.gz] {
                if let Some(grad) = grad {
                    scale_grad(grad, factor);
                }
            }
        }
        self
    }

    /// A contiguous sub-sequence `[start, end)` of blocks.
    pub fn subset(&self, range: std::ops::Range<usize>) -> Self {
        Self {
            blocks: self.blocks[range].to_vec(),
            fov: self.fov,
        }
    }
}

fn scale_grad(grad: &mut GradEvent, factor: f64) {
    match grad {
        GradEvent::Trap { amp, .. } => *amp *= factor,
        GradEvent::Free { amp, .. } => *amp *= factor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AdcEvent, RfEvent};
    use assert2::check;

    fn block_with_delay(delay: f64) -> Block {
        Block {
            delay,
            ..Default::default()
        }
    }

    #[test]
    fn duration_sums_blocks() {
        let seq = Sequence::new(vec![block_with_delay(1.0), block_with_delay(2.0)]);
        check!(seq.duration() == 3.0);
        check!(seq.block_start(1) == 1.0);
    }

    #[test]
    fn concat_appends_blocks() {
        let a = Sequence::new(vec![block_with_delay(1.0)]);
        let b = Sequence::new(vec![block_with_delay(2.0)]);
        let c = a.concat(b);
        check!(c.num_blocks() == 2);
        check!(c.duration() == 3.0);
    }

    #[test]
    fn scale_amplitude_leaves_rf_untouched() {
        let mut block = block_with_delay(0.0);
        block.gx = Some(GradEvent::Trap {
            amp: 10.0,
            delay: 0.0,
            rise: 1e-4,
            flat: 1e-3,
            fall: 1e-4,
        });
        block.rf = Some(RfEvent {
            amp: 500.0,
            ..Default::default()
        });
        let seq = Sequence::new(vec![block]).scale_amplitude(0.5);
        match seq.blocks()[0].gx.as_ref().unwrap() {
            GradEvent::Trap { amp, .. } => check!(*amp == 5.0),
            _ => unreachable!(),
        }
        check!(seq.blocks()[0].rf.as_ref().unwrap().amp == 500.0);
    }

    #[test]
    fn subset_is_contiguous() {
        let seq = Sequence::new(vec![
            block_with_delay(1.0),
            block_with_delay(2.0),
            block_with_delay(3.0),
        ]);
        let sub = seq.subset(1..3);
        check!(sub.num_blocks() == 2);
        check!(sub.duration() == 5.0);
    }

    #[test]
    fn adc_event_sample_times_use_center_of_dwell() {
        let adc = AdcEvent {
            num_samples: 4,
            dwell: 1e-3,
            delay: 0.0,
            freq: 0.0,
            phase: 0.0,
        };
        let times: Vec<f64> = adc.sample_times().collect();
        check!(times == vec![0.5e-3, 1.5e-3, 2.5e-3, 3.5e-3]);
    }
}
