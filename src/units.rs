// src/units.rs - Temperature unit conversions
//
// Operators think in Fahrenheit; everything internal runs in Celsius.

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 1.8 + 32.0
}

/// Temperature *differences* scale without the offset.
pub fn delta_f_to_c(df: f64) -> f64 {
    df * 5.0 / 9.0
}

pub fn delta_c_to_f(dc: f64) -> f64 {
    dc * 9.0 / 5.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setpoint_round_trips_within_tolerance() {
        let target_c = fahrenheit_to_celsius(250.0);
        let delta_c = delta_f_to_c(4.5);
        assert!((target_c - 121.111_111_111).abs() < 1e-6);
        assert!((delta_c - 2.5).abs() < 1e-6);
        assert!((celsius_to_fahrenheit(target_c) - 250.0).abs() < 1e-6);
        assert!((delta_c_to_f(delta_c) - 4.5).abs() < 1e-6);
    }

    #[test]
    fn freezing_and_boiling_points() {
        assert_eq!(fahrenheit_to_celsius(32.0), 0.0);
        assert_eq!(celsius_to_fahrenheit(100.0), 212.0);
    }
}
