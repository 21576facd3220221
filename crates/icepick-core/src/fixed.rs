//! Firmware fixed-point charge conversion
//!
//! The probe firmware prints sense readings in millivolts computed with
//! s5.26 fixed-point arithmetic. These functions reproduce that computation
//! bit for bit so console output can be checked against host-side decoding.

/// One in s5.26 fixed point
pub const FP_ONE: i32 = 1 << 26;

/// `log2(e) / K` in s5.26 per charge count, as used by the firmware
pub const EXP2_SCALE: i32 = 4034;

/// Full-scale output in millivolts (3.3 V supply behind a 1:2 divider)
pub const FULL_SCALE_MV: i32 = 6600;

/// Minimax polynomial for `exp2(f) - 1` on `[-0.5, 0.5]`, highest order first
const POLY: [i32; 6] = [
    10_535_907,    // 1.53303146e-4 * 2^36
    46_003_595,    // 1.33887795e-3 * 2^35
    165_241_817,   // 9.61833261e-3 * 2^34
    476_772_627,   // 5.55036329e-2 * 2^33
    1_031_764_999, // 2.40226507e-1 * 2^32
    1_488_522_244, // 6.93147182e-1 * 2^31
];

/// Arguments below -26.5 underflow to zero
const UNDERFLOW: i32 = -0x6a00_0000;

fn mulhi(a: i32, b: i32) -> i32 {
    ((a as i64 * b as i64) >> 32) as i32
}

/// Compute `exp2(a)` with `a` and the result in s5.26 fixed point
///
/// Valid for `a <= 5.5`; larger arguments saturate to `i32::MAX`.
pub fn fp_exp2(a: i32) -> i32 {
    if a < UNDERFLOW {
        return 0;
    }

    // Split a = i + f with f in [-0.5, 0.5]
    let i = a.wrapping_add(0x0200_0000) & !0x03ff_ffff;
    let f = a.wrapping_sub(i) << 5;
    let Ok(s) = u32::try_from((5i32 << 26).wrapping_sub(i) >> 26) else {
        return i32::MAX;
    };

    let mut r = POLY[0];
    for &c in &POLY[1..] {
        r = mulhi(r, f).wrapping_add(c);
    }
    let r = mulhi(r, f);

    // Add one, scale by the integral part and round
    let half = 1u32.checked_shl(s).unwrap_or(0) / 2;
    let sum = (r as u32)
        .wrapping_mul(2)
        .wrapping_add(1 << 31)
        .wrapping_add(half)
        .wrapping_add(1);
    sum.checked_shr(s).unwrap_or(0) as i32
}

/// Convert a raw charge time to millivolts the way the firmware does
pub fn charge_to_millivolts(chg: i32) -> i32 {
    let v = fp_exp2(chg.wrapping_mul(EXP2_SCALE).wrapping_neg());
    let v = FP_ONE.wrapping_sub(v) >> 13;
    v.wrapping_mul(FULL_SCALE_MV) >> 13
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exp2_integers() {
        assert_eq!(fp_exp2(0), FP_ONE);
        assert_eq!(fp_exp2(FP_ONE), 2 * FP_ONE);
        assert_eq!(fp_exp2(-FP_ONE), FP_ONE / 2);
        assert_eq!(fp_exp2(-2 * FP_ONE), FP_ONE / 4);
    }

    #[test]
    fn test_exp2_fraction() {
        // sqrt(2) in s5.26
        assert_eq!(fp_exp2(FP_ONE / 2), 94_906_266);
    }

    #[test]
    fn test_exp2_underflow() {
        assert_eq!(fp_exp2(UNDERFLOW - 1), 0);
        assert_eq!(fp_exp2(i32::MIN), 0);
    }

    #[test]
    fn test_charge_to_millivolts() {
        assert_eq!(charge_to_millivolts(0), 0);
        assert_eq!(charge_to_millivolts(9039), 2070);
        assert_eq!(charge_to_millivolts(32173), 4872);
        assert_eq!(charge_to_millivolts(65535), 6169);
    }
}
