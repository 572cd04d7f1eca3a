//! Spectral peak to device parameter codes

/// Offset added to the raw bin index before clamping
pub const FREQ_OFFSET: i64 = 15;

/// Lowest frequency code the peripheral accepts
pub const FREQ_MIN: i64 = 50;

/// Highest frequency code the peripheral accepts
pub const FREQ_MAX: i64 = 100;

/// Magnitude units per strength step
const STRENGTH_DIVISOR: f32 = 10.0;

/// Map a raw bin index to a frequency code in `[FREQ_MIN, FREQ_MAX]`.
pub fn freq_transform(raw_bin: i64) -> u32 {
    raw_bin.saturating_add(FREQ_OFFSET).clamp(FREQ_MIN, FREQ_MAX) as u32
}

/// Map a peak magnitude to a strength code: `floor(magnitude / 10)`.
///
/// There is no upper clamp. The wire format only carries 16 bits of strength,
/// so very loud input wraps when encoded.
pub fn strength_transform(magnitude: f32) -> u32 {
    // `as` saturates: negatives and NaN become 0, huge values u32::MAX.
    (magnitude / STRENGTH_DIVISOR).floor() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freq_transform_stays_in_device_range() {
        for raw in (-500..500).chain([i64::MIN, i64::MIN + 1, i64::MAX - 1, i64::MAX]) {
            let freq = freq_transform(raw);
            assert!((50..=100).contains(&freq), "raw {raw} mapped to {freq}");
        }
    }

    #[test]
    fn freq_transform_offsets_inside_the_clamp() {
        assert_eq!(freq_transform(0), 50);
        assert_eq!(freq_transform(34), 50);
        assert_eq!(freq_transform(35), 50);
        assert_eq!(freq_transform(36), 51);
        assert_eq!(freq_transform(60), 75);
        assert_eq!(freq_transform(85), 100);
        assert_eq!(freq_transform(86), 100);

        let mapped: Vec<u32> = (35..=85).map(freq_transform).collect();
        assert!(mapped.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(mapped.first(), Some(&50));
        assert_eq!(mapped.last(), Some(&100));
    }

    #[test]
    fn strength_transform_floors_tenths() {
        assert_eq!(strength_transform(0.0), 0);
        assert_eq!(strength_transform(9.99), 0);
        assert_eq!(strength_transform(10.0), 1);
        assert_eq!(strength_transform(125.7), 12);
        assert_eq!(strength_transform(1_000_000.0), 100_000);

        for whole in 0..2_000u32 {
            assert_eq!(strength_transform(whole as f32), whole / 10);
        }
    }

    #[test]
    fn strength_transform_saturates_invalid_input() {
        assert_eq!(strength_transform(-42.0), 0);
        assert_eq!(strength_transform(f32::NAN), 0);
        assert_eq!(strength_transform(f32::INFINITY), u32::MAX);
    }
}
