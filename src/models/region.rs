//! Administrative region codes and records
//!
//! Codes follow the Kemendagri/BMKG scheme: dot-separated numeric segments,
//! one per level, e.g. `35` (province), `35.15` (regency/city),
//! `35.15.02` (district), `35.15.02.2018` (village).

use super::Coordinates;
use crate::error::CuacaError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Level in the administrative hierarchy (adm1..adm4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AdmLevel {
    Province,
    Regency,
    District,
    Village,
}

impl AdmLevel {
    /// Level implied by the number of code segments
    #[must_use]
    pub fn from_depth(depth: usize) -> Option<Self> {
        match depth {
            1 => Some(AdmLevel::Province),
            2 => Some(AdmLevel::Regency),
            3 => Some(AdmLevel::District),
            4 => Some(AdmLevel::Village),
            _ => None,
        }
    }

    #[must_use]
    pub fn depth(self) -> usize {
        match self {
            AdmLevel::Province => 1,
            AdmLevel::Regency => 2,
            AdmLevel::District => 3,
            AdmLevel::Village => 4,
        }
    }

    /// Query parameter name used by the BMKG API (`adm1`..`adm4`)
    #[must_use]
    pub fn as_param(self) -> &'static str {
        match self {
            AdmLevel::Province => "adm1",
            AdmLevel::Regency => "adm2",
            AdmLevel::District => "adm3",
            AdmLevel::Village => "adm4",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            AdmLevel::Province => "provinsi",
            AdmLevel::Regency => "kabupaten/kota",
            AdmLevel::District => "kecamatan",
            AdmLevel::Village => "desa/kelurahan",
        }
    }
}

/// Validated hierarchical region code
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct RegionCode(String);

impl TryFrom<String> for RegionCode {
    type Error = CuacaError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl RegionCode {
    /// Parse a code such as `35.15.02.2018`
    pub fn parse(raw: &str) -> Result<Self, CuacaError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CuacaError::validation("Region code cannot be empty"));
        }

        let segments: Vec<&str> = trimmed.split('.').collect();
        if AdmLevel::from_depth(segments.len()).is_none() {
            return Err(CuacaError::validation(format!(
                "Region code '{trimmed}' must have between 1 and 4 segments"
            )));
        }
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(CuacaError::validation(format!(
                "Region code '{trimmed}' has an invalid segment '{bad}'"
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    #[must_use]
    pub fn level(&self) -> AdmLevel {
        // parse() guarantees 1..=4 segments
        AdmLevel::from_depth(self.depth()).unwrap_or(AdmLevel::Village)
    }

    /// Code of the enclosing region, `None` for a province
    #[must_use]
    pub fn parent(&self) -> Option<RegionCode> {
        self.0
            .rsplit_once('.')
            .map(|(parent, _)| RegionCode(parent.to_string()))
    }

    /// Province (adm1) this code belongs to
    #[must_use]
    pub fn province(&self) -> RegionCode {
        let first = self.segments().next().unwrap_or(&self.0);
        RegionCode(first.to_string())
    }

    /// True when `other` lies strictly below this code
    #[must_use]
    pub fn is_ancestor_of(&self, other: &RegionCode) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'.'
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the region lookup table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRecord {
    pub code: RegionCode,
    pub name: String,
    pub coordinates: Option<Coordinates>,
}

impl RegionRecord {
    #[must_use]
    pub fn new(code: RegionCode, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            coordinates: None,
        }
    }

    #[must_use]
    pub fn with_coordinates(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    #[must_use]
    pub fn level(&self) -> AdmLevel {
        self.code.level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("35", AdmLevel::Province)]
    #[case("35.15", AdmLevel::Regency)]
    #[case("35.15.02", AdmLevel::District)]
    #[case(" 35.15.02.2018 ", AdmLevel::Village)]
    fn test_parse_levels(#[case] raw: &str, #[case] level: AdmLevel) {
        let code = RegionCode::parse(raw).unwrap();
        assert_eq!(code.level(), level);
        assert_eq!(code.as_str(), raw.trim());
    }

    #[rstest]
    #[case("")]
    #[case("35..02")]
    #[case("35.15.02.2018.1")]
    #[case("35.a5")]
    #[case("35.")]
    fn test_parse_rejects(#[case] raw: &str) {
        assert!(RegionCode::parse(raw).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let code: RegionCode = serde_json::from_str("\"35.15.02\"").unwrap();
        assert_eq!(code.level(), AdmLevel::District);
        assert!(serde_json::from_str::<RegionCode>("\"35.a5\"").is_err());
        assert!(serde_json::from_str::<RegionCode>("\"\"").is_err());
    }

    #[test]
    fn test_parent_chain() {
        let village = RegionCode::parse("35.15.02.2018").unwrap();
        let district = village.parent().unwrap();
        assert_eq!(district.as_str(), "35.15.02");
        assert_eq!(district.parent().unwrap().as_str(), "35.15");
        assert_eq!(village.province().as_str(), "35");
        assert!(village.province().parent().is_none());
    }

    #[test]
    fn test_is_ancestor_of_requires_segment_boundary() {
        let regency = RegionCode::parse("35.1").unwrap();
        let other = RegionCode::parse("35.15.02").unwrap();
        let child = RegionCode::parse("35.1.02").unwrap();
        assert!(!regency.is_ancestor_of(&other));
        assert!(regency.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&child));
    }

    #[test]
    fn test_level_params() {
        assert_eq!(AdmLevel::Village.as_param(), "adm4");
        assert_eq!(AdmLevel::Province.as_param(), "adm1");
        assert_eq!(AdmLevel::District.label(), "kecamatan");
    }
}
