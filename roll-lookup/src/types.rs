use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Every attribute a stored citizen key can carry, in declaration order.
///
/// The order is load-bearing: ambiguity reports list differing fields in
/// this order, regardless of the order in which candidates disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum KeyField {
    #[serde(rename = "citizen_id")]
    CitizenId,
    #[serde(rename = "day")]
    Day,
    #[serde(rename = "year")]
    Year,
    #[serde(rename = "fn")]
    GivenName,
    #[serde(rename = "sn1")]
    Surname1,
    #[serde(rename = "sn2")]
    Surname2,
    #[serde(rename = "postCode")]
    PostCode,
    /// Reference to the polling station. Not part of the unique key, but
    /// stored next to it and accepted as a filter.
    #[serde(rename = "colele")]
    Station,
}

impl KeyField {
    pub const ALL: [KeyField; 8] = [
        KeyField::CitizenId,
        KeyField::Day,
        KeyField::Year,
        KeyField::GivenName,
        KeyField::Surname1,
        KeyField::Surname2,
        KeyField::PostCode,
        KeyField::Station,
    ];

    /// The fields whose tuple is unique per stored record.
    pub const UNIQUE: [KeyField; 7] = [
        KeyField::CitizenId,
        KeyField::Day,
        KeyField::Year,
        KeyField::GivenName,
        KeyField::Surname1,
        KeyField::Surname2,
        KeyField::PostCode,
    ];

    /// Column name in the store and field name on the wire.
    pub fn column(&self) -> &'static str {
        match self {
            KeyField::CitizenId => "citizen_id",
            KeyField::Day => "day",
            KeyField::Year => "year",
            KeyField::GivenName => "fn",
            KeyField::Surname1 => "sn1",
            KeyField::Surname2 => "sn2",
            KeyField::PostCode => "postCode",
            KeyField::Station => "colele",
        }
    }

    fn bit(&self) -> u8 {
        1 << (*self as u8)
    }
}

impl fmt::Display for KeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A compact set of key fields, used to key cached statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FieldSet(u8);

impl FieldSet {
    pub fn insert(&mut self, field: KeyField) {
        self.0 |= field.bit();
    }

    pub fn contains(&self, field: KeyField) -> bool {
        self.0 & field.bit() != 0
    }

    /// Members in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = KeyField> + '_ {
        KeyField::ALL.into_iter().filter(|f| self.contains(*f))
    }
}

/// One row of the roll, as read from the extract. Transient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonalRecord {
    pub document_id: String,
    pub birth_date: String,
    pub given_name: String,
    pub surname1: String,
    pub surname2: String,
    pub post_code: String,
    pub station_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollingStation {
    pub id: String,
    pub locality: String,
    pub district: String,
    pub section: String,
    pub table: String,
    pub address: String,
}

/// A personal record together with the station it votes at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollEntry {
    pub person: PersonalRecord,
    pub station: PollingStation,
}

/// The privacy-reduced key persisted for each citizen. Fields that do not
/// take part in the active schema hold the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct CitizenKey {
    pub citizen_id: String,
    pub day: String,
    pub year: String,
    #[sqlx(rename = "fn")]
    pub given_name: String,
    #[sqlx(rename = "sn1")]
    pub surname1: String,
    #[sqlx(rename = "sn2")]
    pub surname2: String,
    #[sqlx(rename = "postCode")]
    pub post_code: String,
    #[sqlx(rename = "colele")]
    pub station: String,
}

impl CitizenKey {
    pub fn get(&self, field: KeyField) -> &str {
        match field {
            KeyField::CitizenId => &self.citizen_id,
            KeyField::Day => &self.day,
            KeyField::Year => &self.year,
            KeyField::GivenName => &self.given_name,
            KeyField::Surname1 => &self.surname1,
            KeyField::Surname2 => &self.surname2,
            KeyField::PostCode => &self.post_code,
            KeyField::Station => &self.station,
        }
    }

    pub fn set(&mut self, field: KeyField, value: String) {
        let slot = match field {
            KeyField::CitizenId => &mut self.citizen_id,
            KeyField::Day => &mut self.day,
            KeyField::Year => &mut self.year,
            KeyField::GivenName => &mut self.given_name,
            KeyField::Surname1 => &mut self.surname1,
            KeyField::Surname2 => &mut self.surname2,
            KeyField::PostCode => &mut self.post_code,
            KeyField::Station => &mut self.station,
        };
        *slot = value;
    }
}

/// Equality filter over stored keys. The primary field is always present;
/// everything else is only there when the caller supplied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFilter {
    values: BTreeMap<KeyField, String>,
}

impl KeyFilter {
    pub fn new(citizen_id: impl Into<String>) -> Self {
        let mut values = BTreeMap::new();
        values.insert(KeyField::CitizenId, citizen_id.into());
        Self { values }
    }

    pub fn with(mut self, field: KeyField, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: KeyField, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    pub fn get(&self, field: KeyField) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    pub fn fields(&self) -> FieldSet {
        let mut set = FieldSet::default();
        for field in self.values.keys() {
            set.insert(*field);
        }
        set
    }

    /// Field/value pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (KeyField, &str)> {
        self.values.iter().map(|(f, v)| (*f, v.as_str()))
    }

    #[cfg(test)]
    pub fn matches(&self, key: &CitizenKey) -> bool {
        self.iter().all(|(field, value)| key.get(field) == value)
    }
}

/// Partial personal data supplied by a caller. Empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupQuery {
    pub citizen_id: String,
    pub day: Option<String>,
    pub year: Option<String>,
    pub given_name: Option<String>,
    pub surname1: Option<String>,
    pub surname2: Option<String>,
    pub post_code: Option<String>,
    pub station: Option<String>,
}

impl LookupQuery {
    pub fn new(citizen_id: impl Into<String>) -> Self {
        Self {
            citizen_id: citizen_id.into(),
            ..Default::default()
        }
    }

    pub fn value(&self, field: KeyField) -> Option<&str> {
        let value = match field {
            KeyField::CitizenId => Some(self.citizen_id.as_str()),
            KeyField::Day => self.day.as_deref(),
            KeyField::Year => self.year.as_deref(),
            KeyField::GivenName => self.given_name.as_deref(),
            KeyField::Surname1 => self.surname1.as_deref(),
            KeyField::Surname2 => self.surname2.as_deref(),
            KeyField::PostCode => self.post_code.as_deref(),
            KeyField::Station => self.station.as_deref(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    pub fn with(mut self, field: KeyField, value: impl Into<String>) -> Self {
        let value = Some(value.into());
        match field {
            KeyField::CitizenId => self.citizen_id = value.unwrap_or_default(),
            KeyField::Day => self.day = value,
            KeyField::Year => self.year = value,
            KeyField::GivenName => self.given_name = value,
            KeyField::Surname1 => self.surname1 = value,
            KeyField::Surname2 => self.surname2 = value,
            KeyField::PostCode => self.post_code = value,
            KeyField::Station => self.station = value,
        }
        self
    }
}

/// What to do when an ingested key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Last write wins.
    Replace,
    /// The whole batch fails.
    Reject,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "replace" => Ok(DuplicatePolicy::Replace),
            "reject" => Ok(DuplicatePolicy::Reject),
            _ => Err(format!(
                "Unknown duplicate policy: {s}, must be REPLACE or REJECT"
            )),
        }
    }
}
