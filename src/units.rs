use crate::types::{Cm, Pt};

// 1 cm = 1/2.54 inch = 72/2.54 points. Carried to the precision the layout
// constants were tuned against; do not round further.
pub const POINTS_PER_CM: f64 = 28.346_456_7;
pub const CM_PER_INCH: f64 = 2.54;

/// `round(cm / 2.54 * dpi)`, half away from zero.
pub fn cm_to_pixels(cm: Cm, dpi: u32) -> i64 {
    (cm.0 as f64 / CM_PER_INCH * dpi as f64).round() as i64
}

pub fn cm_to_points(cm: Cm) -> Pt {
    Pt::from_f32((cm.0 as f64 * POINTS_PER_CM) as f32)
}

/// Continuous point-to-pixel scaling for sizes already resolved in points.
pub fn pt_to_px(pt: f32, dpi: u32) -> f32 {
    pt * dpi as f32 / 72.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_inch_of_centimeters_lands_on_dpi() {
        assert_eq!(cm_to_pixels(Cm(2.54), 300), 300);
        assert_eq!(cm_to_pixels(Cm(2.54), 96), 96);
    }

    #[test]
    fn cm_to_pixels_rounds_and_keeps_sign() {
        // 0.01 cm at 300 dpi is 1.18 px.
        assert_eq!(cm_to_pixels(Cm(0.01), 300), 1);
        assert_eq!(cm_to_pixels(Cm(-0.01), 300), -1);
        assert_eq!(cm_to_pixels(Cm(10.46), 300), 1235);
        assert_eq!(cm_to_pixels(Cm(16.50), 300), 1949);
    }

    #[test]
    fn cm_to_points_matches_tuned_constant() {
        let one = cm_to_points(Cm(1.0)).to_f32();
        assert!((one - 28.346_456_7).abs() < 1e-4);
        // Six significant digits over a 20 cm page: drift below 0.01 pt.
        let twenty = cm_to_points(Cm(20.0)).to_f32();
        assert!((twenty - 566.929_134).abs() < 0.01);
    }

    #[test]
    fn sixteen_cm_box_is_1890_px_at_300_dpi() {
        // The tuned 16 cm box at 300 dpi resolves to 1890 device pixels.
        assert_eq!(cm_to_pixels(Cm(16.0), 300), 1890);
    }

    #[test]
    fn pt_to_px_is_linear_in_dpi() {
        assert_eq!(pt_to_px(72.0, 300), 300.0);
        assert_eq!(pt_to_px(19.0, 72), 19.0);
    }
}
