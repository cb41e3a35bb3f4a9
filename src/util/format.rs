//! Number formatting for reports

/// Format a value in C-style scientific notation with six fractional digits
///
/// Rust's `{:e}` prints `3e0`; reports use the `%e` layout instead, with an
/// explicit exponent sign and at least two exponent digits.
///
/// # Examples
///
/// ```
/// use geotally::util::format::format_scientific;
///
/// assert_eq!(format_scientific(3.0), "3.000000e+00");
/// assert_eq!(format_scientific(0.000123), "1.230000e-04");
/// assert_eq!(format_scientific(-2.5e123), "-2.500000e+123");
/// ```
pub fn format_scientific(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string().to_lowercase();
    }

    let formatted = format!("{:.6e}", value);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exponent.abs())
        }
        None => formatted,
    }
}

/// Format an area given in square metres (m², km², Mm²)
///
/// # Examples
///
/// ```
/// use geotally::util::format::format_area;
///
/// assert_eq!(format_area(500.0), "500.00 m²");
/// assert_eq!(format_area(2.5e6), "2.50 km²");
/// assert_eq!(format_area(5.1e14), "510.00 Mm²");
/// ```
pub fn format_area(square_metres: f64) -> String {
    const KM2: f64 = 1e6;
    const MM2: f64 = 1e12;

    if square_metres.abs() >= MM2 {
        format!("{:.2} Mm²", square_metres / MM2)
    } else if square_metres.abs() >= KM2 {
        format!("{:.2} km²", square_metres / KM2)
    } else {
        format!("{:.2} m²", square_metres)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_scientific() {
        assert_eq!(format_scientific(0.0), "0.000000e+00");
        assert_eq!(format_scientific(3.0), "3.000000e+00");
        assert_eq!(format_scientific(std::f64::consts::SQRT_2 / 2.0), "7.071068e-01");
        assert_eq!(format_scientific(12345.678), "1.234568e+04");
        assert_eq!(format_scientific(-1.5e-7), "-1.500000e-07");
    }

    #[test]
    fn test_format_scientific_non_finite() {
        assert_eq!(format_scientific(f64::INFINITY), "inf");
        assert_eq!(format_scientific(f64::NAN), "nan");
    }

    #[test]
    fn test_format_area() {
        assert_eq!(format_area(12.0), "12.00 m²");
        assert_eq!(format_area(1.5e6), "1.50 km²");
        assert_eq!(format_area(1.5e12), "1.50 Mm²");
    }
}
