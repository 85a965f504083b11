// src/query/criterion.rs
//
// Typed filter criteria
//
// RULES:
// - Every criterion is a closed enum; `Unconstrained` is the explicit "no filter"
// - Inbound `{ value, modifier }` inputs convert two ways:
//   `parse` is strict and returns InvalidFilter,
//   `From` is lenient: it logs a warning and yields `Unconstrained`
// - Filters deserialize through the lenient path

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CriterionModifier {
    Equals,
    NotEquals,
    Includes,
    IncludesAll,
    Excludes,
    MatchesRegex,
    NotMatchesRegex,
    GreaterThan,
    LessThan,
    IsNull,
    NotNull,
}

impl CriterionModifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CriterionModifier::Equals => "EQUALS",
            CriterionModifier::NotEquals => "NOT_EQUALS",
            CriterionModifier::Includes => "INCLUDES",
            CriterionModifier::IncludesAll => "INCLUDES_ALL",
            CriterionModifier::Excludes => "EXCLUDES",
            CriterionModifier::MatchesRegex => "MATCHES_REGEX",
            CriterionModifier::NotMatchesRegex => "NOT_MATCHES_REGEX",
            CriterionModifier::GreaterThan => "GREATER_THAN",
            CriterionModifier::LessThan => "LESS_THAN",
            CriterionModifier::IsNull => "IS_NULL",
            CriterionModifier::NotNull => "NOT_NULL",
        }
    }
}

impl fmt::Display for CriterionModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CriterionModifier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EQUALS" => Ok(CriterionModifier::Equals),
            "NOT_EQUALS" => Ok(CriterionModifier::NotEquals),
            "INCLUDES" => Ok(CriterionModifier::Includes),
            "INCLUDES_ALL" => Ok(CriterionModifier::IncludesAll),
            "EXCLUDES" => Ok(CriterionModifier::Excludes),
            "MATCHES_REGEX" => Ok(CriterionModifier::MatchesRegex),
            "NOT_MATCHES_REGEX" => Ok(CriterionModifier::NotMatchesRegex),
            "GREATER_THAN" => Ok(CriterionModifier::GreaterThan),
            "LESS_THAN" => Ok(CriterionModifier::LessThan),
            "IS_NULL" => Ok(CriterionModifier::IsNull),
            "NOT_NULL" => Ok(CriterionModifier::NotNull),
            other => Err(AppError::InvalidFilter(format!(
                "unknown criterion modifier '{}'",
                other
            ))),
        }
    }
}

fn parse_modifier(modifier: Option<&str>) -> AppResult<CriterionModifier> {
    modifier
        .ok_or_else(|| AppError::InvalidFilter("criterion modifier is missing".to_string()))?
        .parse()
}

fn not_applicable(kind: &str, modifier: CriterionModifier) -> AppError {
    AppError::InvalidFilter(format!(
        "modifier {} is not applicable to {} criteria",
        modifier, kind
    ))
}

/// Validate a user regex the way the store's `regexp` function compiles it
pub fn check_regex(pattern: &str) -> AppResult<()> {
    regex::Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| AppError::InvalidFilter(format!("invalid regex '{}': {}", pattern, e)))
}

// ============================================================================
// STRING
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringCriterionInput {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub modifier: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "StringCriterionInput")]
pub enum StringCriterion {
    #[default]
    Unconstrained,
    Equals(String),
    NotEquals(String),
    Includes(String),
    Excludes(String),
    MatchesRegex(String),
    NotMatchesRegex(String),
    IsNull,
    NotNull,
}

impl StringCriterion {
    pub fn parse(input: &StringCriterionInput) -> AppResult<Self> {
        let value = input.value.clone();
        let criterion = match parse_modifier(input.modifier.as_deref())? {
            CriterionModifier::Equals => StringCriterion::Equals(value),
            CriterionModifier::NotEquals => StringCriterion::NotEquals(value),
            CriterionModifier::Includes => StringCriterion::Includes(value),
            CriterionModifier::Excludes => StringCriterion::Excludes(value),
            CriterionModifier::MatchesRegex => {
                check_regex(&value)?;
                StringCriterion::MatchesRegex(value)
            }
            CriterionModifier::NotMatchesRegex => {
                check_regex(&value)?;
                StringCriterion::NotMatchesRegex(value)
            }
            CriterionModifier::IsNull => StringCriterion::IsNull,
            CriterionModifier::NotNull => StringCriterion::NotNull,
            other => return Err(not_applicable("string", other)),
        };
        Ok(criterion)
    }

    pub fn is_unconstrained(&self) -> bool {
        matches!(self, StringCriterion::Unconstrained)
    }
}

impl From<StringCriterionInput> for StringCriterion {
    fn from(input: StringCriterionInput) -> Self {
        StringCriterion::parse(&input).unwrap_or_else(|e| {
            log::warn!("Dropping string criterion: {}", e);
            StringCriterion::Unconstrained
        })
    }
}

// ============================================================================
// INT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntCriterionInput {
    #[serde(default)]
    pub value: i64,
    #[serde(default)]
    pub modifier: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "IntCriterionInput")]
pub enum IntCriterion {
    #[default]
    Unconstrained,
    Equals(i64),
    NotEquals(i64),
    GreaterThan(i64),
    LessThan(i64),
    IsNull,
    NotNull,
}

impl IntCriterion {
    pub fn parse(input: &IntCriterionInput) -> AppResult<Self> {
        let value = input.value;
        let criterion = match parse_modifier(input.modifier.as_deref())? {
            CriterionModifier::Equals => IntCriterion::Equals(value),
            CriterionModifier::NotEquals => IntCriterion::NotEquals(value),
            CriterionModifier::GreaterThan => IntCriterion::GreaterThan(value),
            CriterionModifier::LessThan => IntCriterion::LessThan(value),
            CriterionModifier::IsNull => IntCriterion::IsNull,
            CriterionModifier::NotNull => IntCriterion::NotNull,
            other => return Err(not_applicable("int", other)),
        };
        Ok(criterion)
    }

    pub fn is_unconstrained(&self) -> bool {
        matches!(self, IntCriterion::Unconstrained)
    }
}

impl From<IntCriterionInput> for IntCriterion {
    fn from(input: IntCriterionInput) -> Self {
        IntCriterion::parse(&input).unwrap_or_else(|e| {
            log::warn!("Dropping int criterion: {}", e);
            IntCriterion::Unconstrained
        })
    }
}

// ============================================================================
// MULTI (relationship sets)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiCriterionInput {
    #[serde(default)]
    pub value: Vec<i64>,
    #[serde(default)]
    pub modifier: Option<String>,
}

/// Set membership over a relationship
///
/// Ids are de-duplicated on parse and again by the handler; an empty set
/// is `Unconstrained`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "MultiCriterionInput")]
pub enum MultiCriterion {
    #[default]
    Unconstrained,
    /// At least one of the ids
    IncludesAny(Vec<i64>),
    /// Every one of the ids
    IncludesAll(Vec<i64>),
    /// None of the ids
    Excludes(Vec<i64>),
    /// Exactly this set
    Equals(Vec<i64>),
}

impl MultiCriterion {
    pub fn parse(input: &MultiCriterionInput) -> AppResult<Self> {
        let modifier = parse_modifier(input.modifier.as_deref())?;

        let mut ids: Vec<i64> = Vec::with_capacity(input.value.len());
        for id in &input.value {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }

        let criterion = match modifier {
            CriterionModifier::Includes => MultiCriterion::IncludesAny(ids),
            CriterionModifier::IncludesAll => MultiCriterion::IncludesAll(ids),
            CriterionModifier::Excludes => MultiCriterion::Excludes(ids),
            CriterionModifier::Equals => MultiCriterion::Equals(ids),
            other => return Err(not_applicable("multi", other)),
        };

        if criterion.ids().is_empty() {
            return Ok(MultiCriterion::Unconstrained);
        }
        Ok(criterion)
    }

    pub fn ids(&self) -> &[i64] {
        match self {
            MultiCriterion::Unconstrained => &[],
            MultiCriterion::IncludesAny(ids)
            | MultiCriterion::IncludesAll(ids)
            | MultiCriterion::Excludes(ids)
            | MultiCriterion::Equals(ids) => ids,
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.ids().is_empty()
    }
}

impl From<MultiCriterionInput> for MultiCriterion {
    fn from(input: MultiCriterionInput) -> Self {
        MultiCriterion::parse(&input).unwrap_or_else(|e| {
            log::warn!("Dropping multi criterion: {}", e);
            MultiCriterion::Unconstrained
        })
    }
}

// ============================================================================
// RESOLUTION
// ============================================================================

/// Video resolution bands, measured on the shorter side in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "VERY_LOW")]
    VeryLow,
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "R360P")]
    R360p,
    #[serde(rename = "STANDARD")]
    Standard,
    #[serde(rename = "WEB_HD")]
    WebHd,
    #[serde(rename = "STANDARD_HD")]
    StandardHd,
    #[serde(rename = "FULL_HD")]
    FullHd,
    #[serde(rename = "QUAD_HD")]
    QuadHd,
    #[serde(rename = "VR_HD")]
    VrHd,
    #[serde(rename = "FOUR_K")]
    FourK,
    #[serde(rename = "FIVE_K")]
    FiveK,
    #[serde(rename = "SIX_K")]
    SixK,
    #[serde(rename = "EIGHT_K")]
    EightK,
}

impl Resolution {
    pub fn min(&self) -> i64 {
        match self {
            Resolution::VeryLow => 144,
            Resolution::Low => 240,
            Resolution::R360p => 360,
            Resolution::Standard => 480,
            Resolution::WebHd => 540,
            Resolution::StandardHd => 720,
            Resolution::FullHd => 1080,
            Resolution::QuadHd => 1440,
            Resolution::VrHd => 1920,
            Resolution::FourK => 2160,
            Resolution::FiveK => 2880,
            Resolution::SixK => 3384,
            Resolution::EightK => 4320,
        }
    }

    /// Exclusive upper bound; `None` for the top band
    pub fn max(&self) -> Option<i64> {
        match self {
            Resolution::VeryLow => Some(240),
            Resolution::Low => Some(360),
            Resolution::R360p => Some(480),
            Resolution::Standard => Some(540),
            Resolution::WebHd => Some(720),
            Resolution::StandardHd => Some(1080),
            Resolution::FullHd => Some(1440),
            Resolution::QuadHd => Some(1920),
            Resolution::VrHd => Some(2160),
            Resolution::FourK => Some(2880),
            Resolution::FiveK => Some(3384),
            Resolution::SixK => Some(4320),
            Resolution::EightK => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_input(value: &str, modifier: Option<&str>) -> StringCriterionInput {
        StringCriterionInput {
            value: value.to_string(),
            modifier: modifier.map(str::to_string),
        }
    }

    #[test]
    fn test_modifier_spelling() {
        assert_eq!(
            "INCLUDES_ALL".parse::<CriterionModifier>().unwrap(),
            CriterionModifier::IncludesAll
        );
        assert_eq!(CriterionModifier::NotMatchesRegex.to_string(), "NOT_MATCHES_REGEX");
        assert!("includes".parse::<CriterionModifier>().is_err());
    }

    #[test]
    fn test_strict_string_parse() {
        assert_eq!(
            StringCriterion::parse(&string_input("foo", Some("EQUALS"))).unwrap(),
            StringCriterion::Equals("foo".to_string())
        );
        assert!(matches!(
            StringCriterion::parse(&string_input("foo", None)),
            Err(AppError::InvalidFilter(_))
        ));
        assert!(matches!(
            StringCriterion::parse(&string_input("foo", Some("GREATER_THAN"))),
            Err(AppError::InvalidFilter(_))
        ));
        assert!(matches!(
            StringCriterion::parse(&string_input("(unclosed", Some("MATCHES_REGEX"))),
            Err(AppError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_lenient_conversion_drops_invalid() {
        let c: StringCriterion = string_input("[", Some("MATCHES_REGEX")).into();
        assert_eq!(c, StringCriterion::Unconstrained);

        let c: StringCriterion = string_input("x", Some("BOGUS")).into();
        assert!(c.is_unconstrained());
    }

    #[test]
    fn test_deserialize_through_lenient_path() {
        let c: IntCriterion =
            serde_json::from_str(r#"{"value": 3, "modifier": "GREATER_THAN"}"#).unwrap();
        assert_eq!(c, IntCriterion::GreaterThan(3));

        let c: IntCriterion =
            serde_json::from_str(r#"{"value": 3, "modifier": "INCLUDES"}"#).unwrap();
        assert_eq!(c, IntCriterion::Unconstrained);
    }

    #[test]
    fn test_multi_dedup_and_empty() {
        let c = MultiCriterion::parse(&MultiCriterionInput {
            value: vec![4, 2, 4],
            modifier: Some("INCLUDES_ALL".to_string()),
        })
        .unwrap();
        assert_eq!(c, MultiCriterion::IncludesAll(vec![4, 2]));

        let c = MultiCriterion::parse(&MultiCriterionInput {
            value: vec![],
            modifier: Some("INCLUDES".to_string()),
        })
        .unwrap();
        assert!(c.is_unconstrained());
    }

    #[test]
    fn test_resolution_bands() {
        let r: Resolution = serde_json::from_str("\"STANDARD_HD\"").unwrap();
        assert_eq!((r.min(), r.max()), (720, Some(1080)));
        assert_eq!(Resolution::EightK.max(), None);
    }
}
