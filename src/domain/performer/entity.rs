use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::DomainError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performer {
    pub id: i64,
    pub name: String,
    pub gender: Option<Gender>,
    pub url: Option<String>,
    pub twitter: Option<String>,
    pub instagram: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub ethnicity: Option<String>,
    pub country: Option<String>,
    pub eye_color: Option<String>,
    pub height: Option<String>,
    pub measurements: Option<String>,
    pub fake_tits: Option<String>,
    pub career_length: Option<String>,
    pub tattoos: Option<String>,
    pub piercings: Option<String>,
    /// Free text, usually comma separated
    pub aliases: Option<String>,
    pub favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    TransgenderMale,
    TransgenderFemale,
    Intersex,
    NonBinary,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "MALE",
            Gender::Female => "FEMALE",
            Gender::TransgenderMale => "TRANSGENDER_MALE",
            Gender::TransgenderFemale => "TRANSGENDER_FEMALE",
            Gender::Intersex => "INTERSEX",
            Gender::NonBinary => "NON_BINARY",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MALE" => Ok(Gender::Male),
            "FEMALE" => Ok(Gender::Female),
            "TRANSGENDER_MALE" => Ok(Gender::TransgenderMale),
            "TRANSGENDER_FEMALE" => Ok(Gender::TransgenderFemale),
            "INTERSEX" => Ok(Gender::Intersex),
            "NON_BINARY" => Ok(Gender::NonBinary),
            other => Err(DomainError::InvariantViolation(format!(
                "Unknown gender '{}'",
                other
            ))),
        }
    }
}

impl Performer {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.into(),
            gender: None,
            url: None,
            twitter: None,
            instagram: None,
            birthdate: None,
            ethnicity: None,
            country: None,
            eye_color: None,
            height: None,
            measurements: None,
            fake_tits: None,
            career_length: None,
            tattoos: None,
            piercings: None,
            aliases: None,
            favorite: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn birth_year(&self) -> Option<i32> {
        self.birthdate.map(|d| d.year())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformerPartial {
    pub id: i64,
    pub name: Option<String>,
    pub gender: Option<Option<Gender>>,
    pub url: Option<Option<String>>,
    pub twitter: Option<Option<String>>,
    pub instagram: Option<Option<String>>,
    pub birthdate: Option<Option<NaiveDate>>,
    pub ethnicity: Option<Option<String>>,
    pub country: Option<Option<String>>,
    pub eye_color: Option<Option<String>>,
    pub height: Option<Option<String>>,
    pub measurements: Option<Option<String>>,
    pub fake_tits: Option<Option<String>>,
    pub career_length: Option<Option<String>>,
    pub tattoos: Option<Option<String>>,
    pub piercings: Option<Option<String>>,
    pub aliases: Option<Option<String>>,
    pub favorite: Option<bool>,
}

impl PerformerPartial {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}
