//! Sky positions and cone parameters for positional queries.
//!
//! Right ascension accepts decimal degrees or sexagesimal hours
//! (`12:34:56.7`, `12h34m56.7s`, `12 34 56.7`). Declination accepts decimal
//! degrees or sexagesimal degrees (`-45:30:15`, `-45d30m15s`). A sign is only
//! valid at the start of the string.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::error::{TapError, TapResult};

static HMS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?xi)
        ^\s*
        ([+-])?
        (\d{1,2})
        (?:\s*[:h]\s*|\s+)
        (\d{1,2})
        (?:\s*[:m']\s*|\s+)
        (\d{1,2}(?:\.\d*)?)
        \s*(?:s|")?
        \s*$
        "#,
    )
    .unwrap()
});

static DMS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?xi)
        ^\s*
        ([+-])?
        (\d{1,3})
        (?:\s*[:d°]\s*|\s+)
        (\d{1,2})
        (?:\s*[:m']\s*|\s+)
        (\d{1,2}(?:\.\d*)?)
        \s*(?:s|"|'')?
        \s*$
        "#,
    )
    .unwrap()
});

/// An ICRS position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyPosition {
    pub ra_deg: f64,
    pub dec_deg: f64,
}

impl SkyPosition {
    /// Validate and normalize a position.
    ///
    /// RA is wrapped into [0, 360). Dec must lie in [-90, +90].
    pub fn new(ra_deg: f64, dec_deg: f64) -> TapResult<Self> {
        if !ra_deg.is_finite() {
            return Err(TapError::invalid_input("right ascension", "not finite"));
        }
        if !dec_deg.is_finite() {
            return Err(TapError::invalid_input("declination", "not finite"));
        }
        if !(-90.0..=90.0).contains(&dec_deg) {
            return Err(TapError::invalid_input(
                "declination",
                format!("{:.4}° out of range [-90°, +90°]", dec_deg),
            ));
        }
        // rem_euclid rounds tiny negatives up to exactly 360.
        let ra_deg = match ra_deg.rem_euclid(360.0) {
            wrapped if wrapped >= 360.0 => 0.0,
            wrapped => wrapped,
        };
        Ok(Self { ra_deg, dec_deg })
    }

    /// Parse RA (degrees or HMS) and Dec (degrees or DMS) strings.
    pub fn parse(ra: &str, dec: &str) -> TapResult<Self> {
        let ra_deg = parse_hms(ra)
            .or_else(|| parse_decimal(ra))
            .ok_or_else(|| {
                TapError::invalid_input("right ascension", format!("cannot parse '{}'", ra))
            })?;
        let dec_deg = parse_dms(dec)
            .or_else(|| parse_decimal(dec))
            .ok_or_else(|| {
                TapError::invalid_input("declination", format!("cannot parse '{}'", dec))
            })?;
        Self::new(ra_deg, dec_deg)
    }
}

impl fmt::Display for SkyPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RA={:.6}° Dec={:+.6}°", self.ra_deg, self.dec_deg)
    }
}

/// A circular sky region: center plus radius in arcseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cone {
    pub center: SkyPosition,
    pub radius_arcsec: f64,
}

impl Cone {
    pub fn new(center: SkyPosition, radius_arcsec: f64) -> TapResult<Self> {
        if !radius_arcsec.is_finite() || radius_arcsec <= 0.0 {
            return Err(TapError::invalid_input(
                "radius",
                format!("{} arcsec is not a positive number", radius_arcsec),
            ));
        }
        Ok(Self {
            center,
            radius_arcsec,
        })
    }

    pub fn radius_deg(&self) -> f64 {
        self.radius_arcsec / 3600.0
    }
}

fn parse_decimal(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

fn parse_hms(s: &str) -> Option<f64> {
    let caps = HMS_REGEX.captures(s)?;
    let (sign, h, m, sec) = sexagesimal_parts(&caps)?;
    if h >= 24.0 || m >= 60.0 || sec >= 60.0 {
        return None;
    }
    Some(sign * (h + m / 60.0 + sec / 3600.0) * 15.0)
}

fn parse_dms(s: &str) -> Option<f64> {
    let caps = DMS_REGEX.captures(s)?;
    let (sign, d, m, sec) = sexagesimal_parts(&caps)?;
    if m >= 60.0 || sec >= 60.0 {
        return None;
    }
    Some(sign * (d + m / 60.0 + sec / 3600.0))
}

fn sexagesimal_parts(caps: &regex::Captures<'_>) -> Option<(f64, f64, f64, f64)> {
    let sign = match caps.get(1).map(|m| m.as_str()) {
        Some("-") => -1.0,
        _ => 1.0,
    };
    let whole = caps.get(2)?.as_str().parse().ok()?;
    let minutes = caps.get(3)?.as_str().parse().ok()?;
    let seconds = caps.get(4)?.as_str().parse().ok()?;
    Some((sign, whole, minutes, seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_new_wraps_ra() {
        let pos = SkyPosition::new(-10.0, 5.0).unwrap();
        assert!(close(pos.ra_deg, 350.0));
        let pos = SkyPosition::new(725.0, 5.0).unwrap();
        assert!(close(pos.ra_deg, 5.0));
    }

    #[test]
    fn test_tiny_negative_ra_wraps_to_zero() {
        assert_eq!((-1e-20f64).rem_euclid(360.0), 360.0);
        let pos = SkyPosition::new(-1e-20, 0.0).unwrap();
        assert_eq!(pos.ra_deg, 0.0);
        assert!(SkyPosition::new(-0.0, 0.0).unwrap().ra_deg < 360.0);
    }

    #[test]
    fn test_new_rejects_bad_dec() {
        assert!(SkyPosition::new(10.0, 90.5).is_err());
        assert!(SkyPosition::new(10.0, f64::NAN).is_err());
        assert!(SkyPosition::new(f64::INFINITY, 0.0).is_err());
        assert!(SkyPosition::new(10.0, -90.0).is_ok());
    }

    #[test]
    fn test_parse_decimal() {
        let pos = SkyPosition::parse("83.633", "-5.375").unwrap();
        assert!(close(pos.ra_deg, 83.633));
        assert!(close(pos.dec_deg, -5.375));
    }

    #[test]
    fn test_parse_hms_dms_colons() {
        let pos = SkyPosition::parse("05:34:31.94", "+22:00:52.2").unwrap();
        let ra = (5.0 + 34.0 / 60.0 + 31.94 / 3600.0) * 15.0;
        let dec = 22.0 + 0.0 / 60.0 + 52.2 / 3600.0;
        assert!(close(pos.ra_deg, ra));
        assert!(close(pos.dec_deg, dec));
    }

    #[test]
    fn test_parse_hms_dms_letters() {
        let pos = SkyPosition::parse("18h36m56s", "-5d22m30s").unwrap();
        assert!(close(pos.ra_deg, (18.0 + 36.0 / 60.0 + 56.0 / 3600.0) * 15.0));
        assert!(close(pos.dec_deg, -(5.0 + 22.0 / 60.0 + 30.0 / 3600.0)));
    }

    #[test]
    fn test_parse_spaces() {
        let pos = SkyPosition::parse("12 00 00", "-45 30 00").unwrap();
        assert!(close(pos.ra_deg, 180.0));
        assert!(close(pos.dec_deg, -45.5));
    }

    #[test]
    fn test_parse_negative_zero_degrees() {
        let pos = SkyPosition::parse("0", "-00:30:00").unwrap();
        assert!(close(pos.dec_deg, -0.5));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(SkyPosition::parse("abc", "0").is_err());
        assert!(SkyPosition::parse("25:00:00", "0").is_err());
        assert!(SkyPosition::parse("10", "12:-30:00").is_err());
    }

    #[test]
    fn test_cone_radius() {
        let center = SkyPosition::new(10.0, 10.0).unwrap();
        let cone = Cone::new(center, 1800.0).unwrap();
        assert!(close(cone.radius_deg(), 0.5));
        assert!(Cone::new(center, 0.0).is_err());
        assert!(Cone::new(center, -1.0).is_err());
        assert!(Cone::new(center, f64::NAN).is_err());
    }
}
