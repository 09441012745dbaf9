//! Phone number normalization into transport addresses.

use crate::config::PhoneConfig;
use crate::error::HeraldError;

/// Turns user-entered phone strings into canonical recipient addresses.
///
/// `"0812-3456-7890"` becomes `"6281234567890@s.whatsapp.net"` with the
/// default trunk prefix `0` and country code `62`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNormalizer {
    trunk_prefix: String,
    country_code: String,
    suffix: String,
}

impl Default for PhoneNormalizer {
    fn default() -> Self {
        Self::from_config(&PhoneConfig::default())
    }
}

impl PhoneNormalizer {
    pub fn new(trunk_prefix: &str, country_code: &str, suffix: &str) -> Self {
        Self {
            trunk_prefix: digits(trunk_prefix),
            country_code: digits(country_code),
            suffix: suffix.to_string(),
        }
    }

    pub fn from_config(cfg: &PhoneConfig) -> Self {
        Self::new(&cfg.trunk_prefix, &cfg.country_code, &cfg.address_suffix)
    }

    /// Normalize a raw phone string. Already-canonical addresses map to themselves.
    pub fn normalize(&self, raw: &str) -> Result<String, HeraldError> {
        let local = raw.strip_suffix(self.suffix.as_str()).unwrap_or(raw);
        let mut number = digits(local);
        if number.is_empty() {
            return Err(HeraldError::InvalidPhone(raw.to_string()));
        }

        if !self.trunk_prefix.is_empty() {
            if let Some(rest) = number.strip_prefix(self.trunk_prefix.as_str()) {
                number = format!("{}{rest}", self.country_code);
            }
        }

        Ok(format!("{number}{}", self.suffix))
    }
}

fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}
