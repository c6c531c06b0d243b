use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use crate::error::{Error, Result};
use crate::event::{Block, GradEvent, Shape};

use super::{round_to_raster, PulseqFile, ADC_RASTER, GRAD_RASTER, RF_RASTER};

/// Writes `file` out in the same section layout `read` expects.
///
/// Definitions are emitted in `BTreeMap` (sorted) order rather than
/// insertion order, so a read-then-write round trip is not byte-exact
/// against a file written by another tool (documented Open Question
/// decision, DESIGN.md); values and timings round-trip within one raster
/// unit.
pub fn write<P: AsRef<Path>>(path: P, file: &PulseqFile) -> Result<()> {
    let text = render(file);
    std::fs::write(path.as_ref(), text).map_err(|_| Error::InvalidFormat("write failed".into()))
}

pub fn render(file: &PulseqFile) -> String {
    let mut out = String::new();

    write_version(&mut out, file);
    write_definitions(&mut out, file);

    let mut shapes = ShapeTable::default();
    let mut rf_rows = String::new();
    let mut grad_rows = String::new();
    let mut trap_rows = String::new();
    let mut adc_rows = String::new();
    let mut block_rows = String::new();

    let has_time_shape_id = file.version.minor >= 4;

    let mut next_rf_id = 1u32;
    let mut next_grad_id = 1u32;
    let mut next_adc_id = 1u32;

    for (i, block) in file.sequence.blocks().iter().enumerate() {
        let rf_id = if let Some(rf) = &block.rf {
            let id = next_rf_id;
            next_rf_id += 1;
            let mag_id = shapes.intern(&rf.amp_shape);
            let phase_id = shapes.intern(&rf.phase_shape);
            let delay = round_to_raster(rf.delay, RF_RASTER);
            if has_time_shape_id {
                writeln!(
                    rf_rows,
                    "{id} {amp} {mag_id} {phase_id} 0 {delay} {freq} {phase}",
                    amp = rf.amp,
                    freq = rf.freq,
                    phase = rf.phase,
                )
                .unwrap();
            } else {
                writeln!(
                    rf_rows,
                    "{id} {amp} {mag_id} {phase_id} {delay} {freq} {phase}",
                    amp = rf.amp,
                    freq = rf.freq,
                    phase = rf.phase,
                )
                .unwrap();
            }
            id
        } else {
            0
        };

        let gx_id = write_grad(&block.gx, &mut next_grad_id, &mut grad_rows, &mut trap_rows, &mut shapes);
        let gy_id = write_grad(&block.gy, &mut next_grad_id, &mut grad_rows, &mut trap_rows, &mut shapes);
        let gz_id = write_grad(&block.gz, &mut next_grad_id, &mut grad_rows, &mut trap_rows, &mut shapes);

        let adc_id = if let Some(adc) = &block.adc {
            let id = next_adc_id;
            next_adc_id += 1;
            writeln!(
                adc_rows,
                "{id} {num} {dwell} {delay} {freq} {phase}",
                num = adc.num_samples,
                dwell = round_to_raster(adc.dwell, ADC_RASTER),
                delay = round_to_raster(adc.delay, ADC_RASTER),
                freq = adc.freq,
                phase = adc.phase,
            )
            .unwrap();
            id
        } else {
            0
        };

        writeln!(
            block_rows,
            "{index} {duration} {rf_id} {gx_id} {gy_id} {gz_id} {adc_id} {ext_id}",
            index = i + 1,
            duration = round_to_raster(block.duration(), GRAD_RASTER),
            ext_id = block.ext_id,
        )
        .unwrap();
    }

    out.push_str("[BLOCKS]\n");
    out.push_str(&block_rows);
    out.push('\n');

    if !rf_rows.is_empty() {
        out.push_str("[RF]\n");
        out.push_str(&rf_rows);
        out.push('\n');
    }
    if !grad_rows.is_empty() {
        out.push_str("[GRADIENTS]\n");
        out.push_str(&grad_rows);
        out.push('\n');
    }
    if !trap_rows.is_empty() {
        out.push_str("[TRAP]\n");
        out.push_str(&trap_rows);
        out.push('\n');
    }
    if !adc_rows.is_empty() {
        out.push_str("[ADC]\n");
        out.push_str(&adc_rows);
        out.push('\n');
    }

    write_shapes(&mut out, &shapes);

    out
}

fn write_grad(
    grad: &Option<GradEvent>,
    next_grad_id: &mut u32,
    grad_rows: &mut String,
    trap_rows: &mut String,
    shapes: &mut ShapeTable,
) -> u32 {
    match grad {
        None => 0,
        Some(GradEvent::Trap {
            amp,
            delay,
            rise,
            flat,
            fall,
        }) => {
            let id = *next_grad_id;
            *next_grad_id += 1;
            writeln!(
                trap_rows,
                "{id} {amp} {rise} {flat} {fall} {delay}",
                rise = round_to_raster(*rise, GRAD_RASTER),
                flat = round_to_raster(*flat, GRAD_RASTER),
                fall = round_to_raster(*fall, GRAD_RASTER),
                delay = round_to_raster(*delay, GRAD_RASTER),
            )
            .unwrap();
            id
        }
        Some(GradEvent::Free {
            amp,
            delay,
            shape,
            raster: _,
        }) => {
            let id = *next_grad_id;
            *next_grad_id += 1;
            let shape_id = shapes.intern(shape);
            writeln!(
                grad_rows,
                "{id} {amp} {shape_id} 0 {delay}",
                delay = round_to_raster(*delay, GRAD_RASTER),
            )
            .unwrap();
            id
        }
    }
}

fn write_version(out: &mut String, file: &PulseqFile) {
    writeln!(out, "[VERSION]").unwrap();
    writeln!(out, "major {}", file.version.major).unwrap();
    writeln!(out, "minor {}", file.version.minor).unwrap();
    writeln!(out, "revision {}", file.version.revision).unwrap();
    out.push('\n');
}

fn write_definitions(out: &mut String, file: &PulseqFile) {
    if file.definitions.is_empty() {
        return;
    }
    writeln!(out, "[DEFINITIONS]").unwrap();
    for (key, value) in &file.definitions {
        writeln!(out, "{key} {value}").unwrap();
    }
    out.push('\n');
}

fn write_shapes(out: &mut String, shapes: &ShapeTable) {
    if shapes.shapes.is_empty() {
        return;
    }
    writeln!(out, "[SHAPES]").unwrap();
    for (i, shape) in shapes.shapes.iter().enumerate() {
        let (num_samples, data) = crate::shape::compress(&shape.0);
        writeln!(out, "Shape_ID {}", i + 1).unwrap();
        writeln!(out, "Num_Uncompressed {num_samples}").unwrap();
        for v in data {
            writeln!(out, "{v}").unwrap();
        }
        out.push('\n');
    }
}

/// Deduplicates shapes by value so repeated waveforms across blocks share
/// one `[SHAPES]` entry instead of each getting its own copy.
#[derive(Default)]
struct ShapeTable {
    shapes: Vec<Shape>,
    index: HashMap<Vec<u64>, u32>,
}

impl ShapeTable {
    fn intern(&mut self, shape: &Shape) -> u32 {
        let key: Vec<u64> = shape.0.iter().map(|v| v.to_bits()).collect();
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        self.shapes.push(shape.clone());
        let id = self.shapes.len() as u32;
        self.index.insert(key, id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AdcEvent, RfEvent};
    use crate::sequence::Sequence;
    use assert2::check;
    use std::collections::BTreeMap;

    fn sample_file() -> PulseqFile {
        let mut block = Block::default();
        block.rf = Some(RfEvent {
            amp_shape: Shape(vec![0.0, 0.5, 1.0, 0.5, 0.0]),
            phase_shape: Shape(vec![0.0; 5]),
            amp: 500.0,
            freq: 0.0,
            phase: 0.0,
            delay: 0.0,
            raster: super::RF_RASTER,
        });
        block.gx = Some(GradEvent::Trap {
            amp: 10.0,
            delay: 0.0,
            rise: 1e-4,
            flat: 1e-3,
            fall: 1e-4,
        });
        block.adc = Some(AdcEvent {
            num_samples: 8,
            dwell: 1e-5,
            delay: 0.0,
            freq: 0.0,
            phase: 0.0,
        });

        PulseqFile {
            version: super::Version {
                major: 1,
                minor: 4,
                revision: 0,
            },
            definitions: BTreeMap::new(),
            sequence: Sequence::new(vec![block]),
            shapes: Vec::new(),
        }
    }

    #[test]
    fn render_contains_all_required_sections() {
        let file = sample_file();
        let text = render(&file);
        check!(text.contains("[VERSION]"));
        check!(text.contains("[BLOCKS]"));
        check!(text.contains("[RF]"));
        check!(text.contains("[TRAP]"));
        check!(text.contains("[ADC]"));
        check!(text.contains("[SHAPES]"));
    }

    #[test]
    fn write_then_read_round_trips_block_count_and_duration() {
        let file = sample_file();
        let text = render(&file);
        let parsed = super::read::parse_str(&text).unwrap();
        check!(parsed.sequence.num_blocks() == file.sequence.num_blocks());
        check!((parsed.sequence.duration() - file.sequence.duration()).abs() < 1e-6);
    }

    #[test]
    fn ext_id_round_trips_through_write_and_read() {
        let mut file = sample_file();
        let mut block = file.sequence.blocks()[0].clone();
        block.ext_id = 7;
        file.sequence = Sequence::new(vec![block]);

        let text = render(&file);
        let parsed = super::read::parse_str(&text).unwrap();
        check!(parsed.sequence.blocks()[0].ext_id == 7);
    }

    #[test]
    fn version_1_2_writes_and_reads_seven_field_rf_rows() {
        let mut file = sample_file();
        file.version = super::Version {
            major: 1,
            minor: 2,
            revision: 1,
        };

        let text = render(&file);
        let rf_line = text
            .lines()
            .skip_while(|l| *l != "[RF]")
            .nth(1)
            .unwrap();
        check!(rf_line.split_whitespace().count() == 7);

        let parsed = super::read::parse_str(&text).unwrap();
        check!(parsed.sequence.blocks()[0].rf.is_some());
    }
}
