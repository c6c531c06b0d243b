//! Pulseq shape compression: a run-length code over first differences.
//!
//! A run of two or more equal differences is written as the value, the same
//! value again (the repeat marker), then the run length minus two. Isolated
//! differences are written verbatim.

/// Compress a normalized waveform (samples in `[-1, 1]`) into `(N, data)`.
pub fn compress(samples: &[f64]) -> (usize, Vec<f64>) {
    let mut deriv = Vec::with_capacity(samples.len());
    let mut prev = 0.0;
    for &s in samples {
        deriv.push(s - prev);
        prev = s;
    }

    let mut out = Vec::new();
    let mut i = 0;
    while i < deriv.len() {
        let d = deriv[i];
        let mut run = 1;
        while i + run < deriv.len() && deriv[i + run] == d {
            run += 1;
        }

        if run >= 2 {
            out.push(d);
            out.push(d);
            out.push((run - 2) as f64);
        } else {
            out.push(d);
        }
        i += run;
    }

    (samples.len(), out)
}

/// Reconstruct a waveform of `num_samples` values from its compressed form.
pub fn decompress(num_samples: usize, data: &[f64]) -> Vec<f64> {
    let mut deriv = Vec::with_capacity(num_samples);

    let mut i = 0;
    while i < data.len() {
        let d = data[i];
        if i + 1 < data.len() && data[i + 1] == d {
            let run_extra = data[i + 2];
            let count = run_extra as usize + 2;
            for _ in 0..count {
                deriv.push(d);
            }
            i += 3;
        } else {
            deriv.push(d);
            i += 1;
        }
    }

    debug_assert_eq!(deriv.len(), num_samples);

    let mut acc = 0.0;
    deriv
        .into_iter()
        .map(|d| {
            acc += d;
            acc
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{compress, decompress};
    use assert2::check;
    use proptest::prelude::*;

    #[test]
    fn uniform_shape_compresses_to_three_numbers() {
        let samples = vec![1.0; 100];
        let (n, data) = compress(&samples);
        check!(n == 100);
        check!(data == vec![1.0, 1.0, 98.0]);

        let back = decompress(n, &data);
        check!(back == samples);
    }

    #[test]
    fn empty_shape_round_trips() {
        let samples: Vec<f64> = vec![];
        let (n, data) = compress(&samples);
        check!(data.is_empty());
        check!(decompress(n, &data).is_empty());
    }

    #[test]
    fn constant_zero_shape() {
        let samples = vec![0.0; 10];
        let (n, data) = compress(&samples);
        let back = decompress(n, &data);
        check!(back == samples);
    }

    proptest! {
        #[test]
        fn round_trip(samples in prop::collection::vec(-1.0f64..=1.0, 1..2000)) {
            let (n, data) = compress(&samples);
            let back = decompress(n, &data);
            prop_assert_eq!(back.len(), samples.len());
            for (a, b) in back.iter().zip(samples.iter()) {
                prop_assert!((a - b).abs() < 1e-9);
            }
        }
    }
}
