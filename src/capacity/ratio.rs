//! Safety ratio parsing.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Fraction of an advertised token limit that is considered safe to use.
///
/// Always within `(0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct SafetyRatio(pub(super) f64);

impl SafetyRatio {
    /// Create a ratio, rejecting values outside `(0, 1]`.
    pub fn new(value: f64) -> Result<Self> {
        if !(value > 0.0 && value <= 1.0) {
            anyhow::bail!("Safety ratio must be in (0, 1], got {}", value);
        }
        Ok(Self(value))
    }

    pub fn get(self) -> f64 {
        self.0
    }

    /// Apply the ratio to a token limit, rounding down.
    pub fn apply(self, limit: usize) -> usize {
        (limit as f64 * self.0) as usize
    }
}

impl std::fmt::Display for SafetyRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // One decimal place keeps 0.9 from printing as 90.00000000000001%.
        write!(f, "{}%", (self.0 * 1000.0).round() / 10.0)
    }
}

/// Parse a ratio given either as a fraction ("0.7") or a percentage ("70%").
pub fn parse_safety_ratio(s: &str) -> Result<SafetyRatio> {
    let s = s.trim();

    if s.is_empty() {
        anyhow::bail!("Safety ratio cannot be empty");
    }

    let value = if let Some(num_str) = s.strip_suffix('%') {
        let pct: f64 = num_str
            .trim()
            .parse()
            .with_context(|| format!("Invalid percentage in safety ratio: {}", s))?;
        pct / 100.0
    } else {
        s.parse()
            .with_context(|| format!("Invalid safety ratio: {}", s))?
    };

    SafetyRatio::new(value)
}

impl Serialize for SafetyRatio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

impl<'de> Deserialize<'de> for SafetyRatio {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        let parsed = match Raw::deserialize(deserializer)? {
            Raw::Number(n) => SafetyRatio::new(n),
            Raw::Text(s) => parse_safety_ratio(&s),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fraction() {
        assert_eq!(parse_safety_ratio("0.7").unwrap().get(), 0.7);
        assert_eq!(parse_safety_ratio("1").unwrap().get(), 1.0);
        assert_eq!(parse_safety_ratio(" 0.9 ").unwrap().get(), 0.9);
    }

    #[test]
    fn test_parse_percentage() {
        assert_eq!(parse_safety_ratio("70%").unwrap().get(), 0.7);
        assert_eq!(parse_safety_ratio("100%").unwrap().get(), 1.0);
        assert_eq!(parse_safety_ratio("90 %").unwrap().get(), 0.9);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_safety_ratio("").is_err());
        assert!(parse_safety_ratio("most").is_err());
        assert!(parse_safety_ratio("0").is_err());
        assert!(parse_safety_ratio("0%").is_err());
        assert!(parse_safety_ratio("1.5").is_err());
        assert!(parse_safety_ratio("150%").is_err());
        assert!(parse_safety_ratio("-0.2").is_err());
    }

    #[test]
    fn test_apply_rounds_down() {
        let ratio = SafetyRatio::new(0.9).unwrap();
        assert_eq!(ratio.apply(8192), 7372);
        assert_eq!(ratio.apply(0), 0);
    }

    #[test]
    fn test_deserialize_number_or_string() {
        #[derive(Deserialize)]
        struct Holder {
            ratio: SafetyRatio,
        }
        let h: Holder = toml::from_str("ratio = 0.75").unwrap();
        assert_eq!(h.ratio.get(), 0.75);
        let h: Holder = toml::from_str("ratio = \"60%\"").unwrap();
        assert_eq!(h.ratio.get(), 0.6);
        assert!(toml::from_str::<Holder>("ratio = 2.0").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(SafetyRatio::new(0.5).unwrap().to_string(), "50%");
        assert_eq!(SafetyRatio::new(0.9).unwrap().to_string(), "90%");
        assert_eq!(SafetyRatio::new(0.725).unwrap().to_string(), "72.5%");
    }
}
