//! Low-band magnitude spectrum for one channel

use rustfft::{num_complex::Complex, FftPlanner};

/// Dominant bin of a spectrum
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Peak {
    /// Raw bin index (not Hz)
    pub bin: usize,

    /// Magnitude at that bin
    pub magnitude: f32,
}

/// Magnitudes of the positive-frequency bins below the band limit
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Spectrum {
    /// One magnitude per bin, lowest frequency first
    pub magnitudes: Vec<f32>,

    /// Transform length after zero padding
    pub padded_len: usize,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    /// Highest-magnitude bin. Ties resolve to the lowest index; NaN never wins.
    pub fn peak(&self) -> Option<Peak> {
        let mut iter = self.magnitudes.iter().copied().enumerate();
        let (bin, magnitude) = iter.next()?;
        let mut best = Peak { bin, magnitude };
        for (bin, magnitude) in iter {
            if magnitude > best.magnitude || (best.magnitude.is_nan() && !magnitude.is_nan()) {
                best = Peak { bin, magnitude };
            }
        }
        Some(best)
    }
}

/// Smallest power of two >= `len`; zero stays zero.
pub fn padded_len(len: usize) -> usize {
    if len == 0 {
        0
    } else {
        len.next_power_of_two()
    }
}

/// Number of bins below `band_limit_hz` for a transform of `padded_len`
/// samples at `sample_rate`.
///
/// The bin width is floored to whole Hz before dividing, so the count is
/// `band_limit / (sample_rate / padded_len)` in integer arithmetic. A bin
/// narrower than 1 Hz keeps the whole half spectrum.
pub fn band_bins(band_limit_hz: u32, sample_rate: u32, padded_len: usize) -> usize {
    if sample_rate == 0 || padded_len == 0 {
        return 0;
    }
    let bin_width = sample_rate as usize / padded_len;
    if bin_width == 0 {
        return padded_len / 2;
    }
    band_limit_hz as usize / bin_width
}

/// Per-channel FFT front end.
///
/// Zero-pads each buffer to a power of two, runs a forward transform and keeps
/// the magnitudes of the non-redundant half, truncated to the low band.
/// No window is applied; the raw buffer is transformed as captured.
pub struct SpectralAnalyzer {
    planner: FftPlanner<f32>,
    band_limit_hz: u32,
    scratch: Vec<Complex<f32>>,
    analyzed: u64,
}

impl SpectralAnalyzer {
    /// Create an analyzer keeping bins below `band_limit_hz`
    pub fn new(band_limit_hz: u32) -> Self {
        Self {
            planner: FftPlanner::new(),
            band_limit_hz,
            scratch: Vec::new(),
            analyzed: 0,
        }
    }

    pub fn band_limit_hz(&self) -> u32 {
        self.band_limit_hz
    }

    /// Buffers analysed since construction
    pub fn analyzed(&self) -> u64 {
        self.analyzed
    }

    /// Analyse one channel's samples captured at `sample_rate`
    pub fn analyze(&mut self, samples: &[f32], sample_rate: u32) -> Spectrum {
        self.analyzed += 1;

        let padded = padded_len(samples.len());
        if padded == 0 {
            return Spectrum::default();
        }

        self.scratch.clear();
        self.scratch
            .extend(samples.iter().map(|&s| Complex::new(s, 0.0)));
        self.scratch.resize(padded, Complex::new(0.0, 0.0));

        let fft = self.planner.plan_fft_forward(padded);
        fft.process(&mut self.scratch);

        let count = band_bins(self.band_limit_hz, sample_rate, padded).min(padded / 2);
        let magnitudes = self.scratch[..count].iter().map(|c| c.norm()).collect();

        Spectrum {
            magnitudes,
            padded_len: padded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::DEFAULT_BAND_LIMIT_HZ;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn padded_len_is_next_power_of_two() {
        assert_eq!(padded_len(0), 0);
        assert_eq!(padded_len(1), 1);
        assert_eq!(padded_len(2), 2);
        assert_eq!(padded_len(3), 4);
        assert_eq!(padded_len(480), 512);
        assert_eq!(padded_len(1024), 1024);
        assert_eq!(padded_len(1025), 2048);

        for len in 1..5000 {
            let p = padded_len(len);
            assert!(p.is_power_of_two());
            assert!(p >= len);
            assert!(p / 2 < len);
        }
    }

    #[test]
    fn band_bins_floors_bin_width_first() {
        // 48000 / 1024 = 46 Hz per bin -> 1100 / 46 = 23
        assert_eq!(band_bins(1100, 48_000, 1024), 23);
        // 48000 / 4096 = 11 Hz per bin -> 100, not floor(93.87)
        assert_eq!(band_bins(1100, 48_000, 4096), 100);
        assert_eq!(band_bins(1100, 48_000, 8192), 220);
        assert_eq!(band_bins(1100, 44_100, 4096), 110);
        assert_eq!(band_bins(1100, 44_100, 2048), 52);
        assert_eq!(band_bins(1100, 0, 1024), 0);
        assert_eq!(band_bins(1100, 48_000, 0), 0);
    }

    #[test]
    fn band_bins_keeps_half_spectrum_below_one_hz_per_bin() {
        assert_eq!(band_bins(1100, 8, 16), 8);
        assert_eq!(band_bins(1100, 1_000, 2_048), 1_024);
    }

    #[test]
    fn typical_loopback_buffer_keeps_bins_up_to_one_hundred() {
        let rate = 48_000;
        // 2400 frames (50 ms) pads to 4096; bin 96 sits above the old cutoff of 93
        let freq = 96.0 * rate as f32 / 4096.0;
        let mut analyzer = SpectralAnalyzer::new(DEFAULT_BAND_LIMIT_HZ);
        let spectrum = analyzer.analyze(&sine(freq, rate, 4096), rate);

        assert_eq!(spectrum.len(), 100);
        assert_eq!(spectrum.peak().expect("non-empty spectrum").bin, 96);
    }

    #[test]
    fn silence_produces_all_zero_spectrum() {
        let mut analyzer = SpectralAnalyzer::new(DEFAULT_BAND_LIMIT_HZ);

        for len in [2usize, 3, 100, 441, 1024] {
            let spectrum = analyzer.analyze(&vec![0.0; len], 8_000);
            assert!(spectrum.magnitudes.iter().all(|&m| m == 0.0));
        }
    }

    #[test]
    fn output_length_respects_band_and_half_spectrum() {
        let mut analyzer = SpectralAnalyzer::new(DEFAULT_BAND_LIMIT_HZ);

        for (len, rate) in [(480usize, 48_000u32), (441, 44_100), (4096, 48_000), (64, 2_000), (10, 8)] {
            let spectrum = analyzer.analyze(&sine(100.0, rate, len), rate);
            let p = spectrum.padded_len;
            assert_eq!(p, padded_len(len));
            assert!(spectrum.len() <= band_bins(DEFAULT_BAND_LIMIT_HZ, rate, p));
            assert!(spectrum.len() <= p / 2);
        }
    }

    #[test]
    fn tiny_buffers_give_empty_spectrum() {
        let mut analyzer = SpectralAnalyzer::new(DEFAULT_BAND_LIMIT_HZ);

        assert!(analyzer.analyze(&[], 48_000).is_empty());
        assert!(analyzer.analyze(&[0.7], 48_000).is_empty());
        assert_eq!(analyzer.analyzed(), 2);
    }

    #[test]
    fn pure_tone_peaks_at_its_bin() {
        let rate = 8_192;
        let len = 1_024;
        // Bin width is 8 Hz; 200 Hz lands exactly on bin 25.
        let mut analyzer = SpectralAnalyzer::new(DEFAULT_BAND_LIMIT_HZ);
        let spectrum = analyzer.analyze(&sine(200.0, rate, len), rate);

        assert_eq!(spectrum.len(), 137);
        let peak = spectrum.peak().expect("non-empty spectrum");
        assert_eq!(peak.bin, 25);
        assert!((peak.magnitude - len as f32 / 2.0).abs() < 1.0);
    }

    #[test]
    fn tone_above_band_limit_is_discarded() {
        let rate = 8_192;
        let mut analyzer = SpectralAnalyzer::new(DEFAULT_BAND_LIMIT_HZ);
        let spectrum = analyzer.analyze(&sine(2_000.0, rate, 1_024), rate);

        let peak = spectrum.peak().expect("non-empty spectrum");
        assert!(peak.magnitude < 10.0, "leaked energy {}", peak.magnitude);
    }

    #[test]
    fn peak_ties_resolve_to_first_bin() {
        let spectrum = Spectrum {
            magnitudes: vec![1.0, 5.0, 3.0, 5.0],
            padded_len: 8,
        };
        assert_eq!(spectrum.peak(), Some(Peak { bin: 1, magnitude: 5.0 }));
    }

    #[test]
    fn peak_skips_nan() {
        let spectrum = Spectrum {
            magnitudes: vec![f32::NAN, 2.0, f32::NAN, 1.0],
            padded_len: 8,
        };
        assert_eq!(spectrum.peak(), Some(Peak { bin: 1, magnitude: 2.0 }));
        assert_eq!(Spectrum::default().peak(), None);
    }
}
