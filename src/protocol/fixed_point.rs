//! Fixed-point and ranged-byte conversions.
//!
//! Every conversion rounds with [`f32::round`] (half away from zero) and then
//! saturates to the target integer range. Decoding is the exact inverse
//! affine map, so `decode(encode(x))` differs from `x` by at most half a step.

/// Scale factor of the fixed-point coordinate encodings.
pub const FIXED_POINT_SCALE: f32 = 32.0;

/// Encodes a value as a fixed-point short.
pub fn to_fshort(value: f32) -> i16 {
    saturate(value * FIXED_POINT_SCALE, i16::MIN.into(), i16::MAX.into()) as i16
}

pub fn from_fshort(raw: i16) -> f32 {
    f32::from(raw) / FIXED_POINT_SCALE
}

/// Encodes a value as a fixed-point byte.
pub fn to_fbyte(value: f32) -> i8 {
    saturate(value * FIXED_POINT_SCALE, i8::MIN.into(), i8::MAX.into()) as i8
}

pub fn from_fbyte(raw: i8) -> f32 {
    f32::from(raw) / FIXED_POINT_SCALE
}

/// Encodes a value as a 32-bit fixed-point integer (extended coordinates).
pub fn to_fint(value: f32) -> i32 {
    let scaled = f64::from(value) * f64::from(FIXED_POINT_SCALE);
    let rounded = scaled.round();
    if rounded.is_nan() {
        0
    } else {
        rounded.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
    }
}

pub fn from_fint(raw: i32) -> f32 {
    (f64::from(raw) / f64::from(FIXED_POINT_SCALE)) as f32
}

/// Maps `value` in `min..=max` onto a signed byte.
pub fn to_ranged_byte(value: f32, min: f32, max: f32) -> i8 {
    let normalized = ((value - min) / (max - min)).clamp(0.0, 1.0);
    saturate(normalized * 255.0 - 128.0, -128.0, 127.0) as i8
}

pub fn from_ranged_byte(raw: i8, min: f32, max: f32) -> f32 {
    min + (f32::from(raw) + 128.0) / 255.0 * (max - min)
}

fn saturate(scaled: f32, min: f32, max: f32) -> f32 {
    let rounded = scaled.round();
    if rounded.is_nan() {
        0.0
    } else {
        rounded.clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fshort_pins_exact_values() {
        assert_eq!(to_fshort(3.0), 96);
        assert_eq!(to_fshort(3.0).to_be_bytes(), [0x00, 0x60]);
        assert_eq!(from_fshort(i16::from_be_bytes([0xFF, 0xC0])), -2.0);
        assert_eq!(from_fshort(-64), -2.0);
    }

    #[test]
    fn fshort_rounds_half_away_from_zero() {
        // 0.015625 * 32 = 0.5
        assert_eq!(to_fshort(0.015625), 1);
        assert_eq!(to_fshort(-0.015625), -1);
        assert_eq!(to_fshort(0.01), 0);
    }

    #[test]
    fn fshort_saturates() {
        assert_eq!(to_fshort(5000.0), i16::MAX);
        assert_eq!(to_fshort(-5000.0), i16::MIN);
        assert_eq!(to_fshort(f32::NAN), 0);
    }

    #[test]
    fn fbyte_saturates() {
        assert_eq!(to_fbyte(1.0), 32);
        assert_eq!(to_fbyte(-4.0), -128);
        assert_eq!(to_fbyte(4.0), 127);
        assert_eq!(from_fbyte(-16), -0.5);
    }

    #[test]
    fn fint_covers_large_coordinates() {
        assert_eq!(to_fint(5000.0), 160_000);
        assert_eq!(from_fint(160_000), 5000.0);
        assert_eq!(to_fint(f32::MAX), i32::MAX);
    }

    #[test]
    fn ranged_byte_bounds() {
        assert_eq!(to_ranged_byte(0.0, 0.0, 360.0), -128);
        assert_eq!(to_ranged_byte(360.0, 0.0, 360.0), 127);
        assert_eq!(to_ranged_byte(720.0, 0.0, 360.0), 127);
        assert_eq!(to_ranged_byte(-90.0, -90.0, 90.0), -128);
        assert_eq!(to_ranged_byte(90.0, -90.0, 90.0), 127);
        assert_eq!(from_ranged_byte(-128, -90.0, 90.0), -90.0);
        assert_eq!(from_ranged_byte(127, -90.0, 90.0), 90.0);
    }

    #[test]
    fn ranged_byte_round_trips_within_half_step() {
        let step = 360.0 / 255.0;
        for degrees in [0.0f32, 12.5, 90.0, 180.0, 271.3, 359.9] {
            let decoded = from_ranged_byte(to_ranged_byte(degrees, 0.0, 360.0), 0.0, 360.0);
            assert!(
                (decoded - degrees).abs() <= step / 2.0 + 1e-3,
                "{degrees} decoded as {decoded}"
            );
        }
    }
}
