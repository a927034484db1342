//! Scalar-to-RGB colour maps.

/// Piecewise-linear "jet" map (dark blue to dark red) for a level in `0..=255`.
pub fn jet(level: u8) -> [u8; 3] {
    let v = f64::from(level) / 255.0;
    let channel = |offset: f64| {
        let x = (1.5 - (4.0 * v - offset).abs()).clamp(0.0, 1.0);
        (x * 255.0).round() as u8
    };
    [channel(3.0), channel(2.0), channel(1.0)]
}

/// Maps `[0, 1]` onto `0..=255`, truncating like an integer cast.
pub fn to_level(value01: f64) -> u8 {
    if value01.is_nan() {
        return 0;
    }
    (value01.clamp(0.0, 1.0) * 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jet_endpoints() {
        assert_eq!(jet(0), [0, 0, 128]);
        assert_eq!(jet(255), [128, 0, 0]);
        // Mid-scale is green-dominant.
        let mid = jet(128);
        assert!(mid[1] == 255 && mid[0] < 255 && mid[2] < 255);
    }

    #[test]
    fn jet_red_is_dark_for_low_levels() {
        for level in 0..=90u8 {
            assert_eq!(jet(level)[0], 0, "level {}", level);
        }
        assert!(jet(200)[0] > 13);
    }

    #[test]
    fn levels_truncate() {
        assert_eq!(to_level(1.0), 255);
        assert_eq!(to_level(0.999), 254);
        assert_eq!(to_level(-1.0), 0);
        assert_eq!(to_level(f64::NAN), 0);
    }
}
