use std::net::SocketAddr;
use std::ops::Deref;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;

use crate::schema::{KeyLayout, KeySchema, SchemaError, SchemaOptions};
use crate::source::SourceEncoding;
use crate::store::sqlite::PoolConfig;
use crate::types::DuplicatePolicy;

/// Boolean that also accepts 1/0, yes/no and on/off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvFlag(pub bool);

impl FromStr for EnvFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(EnvFlag(true)),
            "false" | "0" | "no" | "off" | "" => Ok(EnvFlag(false)),
            _ => Err(format!("Invalid boolean value: {s}")),
        }
    }
}

impl From<EnvFlag> for bool {
    fn from(flag: EnvFlag) -> Self {
        flag.0
    }
}

impl Deref for EnvFlag {
    type Target = bool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(default = "0.0.0.0:8080")]
    pub address: SocketAddr,

    #[envconfig(default = "/data")]
    pub data_dir: PathBuf,

    #[envconfig(default = "citizens.db")]
    pub database_file: String,

    #[envconfig(default = "10")]
    pub max_db_connections: u32,

    #[envconfig(default = "10")]
    pub acquire_timeout_secs: u64,

    // Shared secret expected verbatim in the Authorization header
    #[envconfig(default = "")]
    pub token: String,

    #[envconfig(default = "false")]
    pub enable_metrics: EnvFlag,

    #[envconfig(default = "latin1")]
    pub source_encoding: SourceEncoding,

    #[envconfig(default = "0")]
    pub document_chars: usize,

    #[envconfig(default = "false")]
    pub first_chars: EnvFlag,

    #[envconfig(default = "false")]
    pub first_chars_add_letter: EnvFlag,

    #[envconfig(default = "2")]
    pub name_chars: usize,

    #[envconfig(from = "FN", default = "false")]
    pub given_name: EnvFlag,

    #[envconfig(from = "SN1", default = "false")]
    pub surname1: EnvFlag,

    #[envconfig(from = "SN2", default = "false")]
    pub surname2: EnvFlag,

    #[envconfig(default = "false")]
    pub day: EnvFlag,

    #[envconfig(default = "false")]
    pub year: EnvFlag,

    #[envconfig(default = "false")]
    pub post_code: EnvFlag,

    #[envconfig(default = "columns")]
    pub key_layout: KeyLayout,

    #[envconfig(default = "reject")]
    pub duplicate_policy: DuplicatePolicy,
}

impl Config {
    pub fn default_test_config() -> Self {
        Self {
            address: SocketAddr::from(([127, 0, 0, 1], 0)),
            data_dir: PathBuf::from("/tmp/roll-lookup"),
            database_file: "citizens.db".to_string(),
            max_db_connections: 1,
            acquire_timeout_secs: 5,
            token: "secret".to_string(),
            enable_metrics: EnvFlag(false),
            source_encoding: SourceEncoding::Latin1,
            document_chars: 0,
            first_chars: EnvFlag(false),
            first_chars_add_letter: EnvFlag(false),
            name_chars: 2,
            given_name: EnvFlag(false),
            surname1: EnvFlag(false),
            surname2: EnvFlag(false),
            day: EnvFlag(false),
            year: EnvFlag(false),
            post_code: EnvFlag(false),
            key_layout: KeyLayout::Columns,
            duplicate_policy: DuplicatePolicy::Reject,
        }
    }

    pub fn schema_options(&self) -> SchemaOptions {
        SchemaOptions {
            document_chars: self.document_chars,
            document_from_start: *self.first_chars,
            document_keep_letter: *self.first_chars_add_letter,
            name_chars: self.name_chars,
            day: *self.day,
            year: *self.year,
            given_name: *self.given_name,
            surname1: *self.surname1,
            surname2: *self.surname2,
            post_code: *self.post_code,
            layout: self.key_layout,
        }
    }

    pub fn key_schema(&self) -> Result<KeySchema, SchemaError> {
        KeySchema::from_options(&self.schema_options())
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.max_db_connections,
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Truncation;
    use crate::types::KeyField;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();

        assert_eq!(config.address, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.database_file, "citizens.db");
        assert_eq!(config.token, "");
        assert!(!*config.enable_metrics);
        assert_eq!(config.source_encoding, SourceEncoding::Latin1);
        assert_eq!(config.key_layout, KeyLayout::Columns);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Reject);
        assert_eq!(config.pool_config().acquire_timeout, Duration::from_secs(10));

        let schema = config.key_schema().unwrap();
        assert_eq!(schema.fields().len(), 1);
        assert_eq!(schema.fields()[0].truncation, None);
    }

    #[test]
    fn test_env_flag_parsing() {
        for raw in ["true", "TRUE", "1", "yes", "On"] {
            assert!(*raw.parse::<EnvFlag>().unwrap(), "{raw}");
        }
        for raw in ["false", "0", "no", "off", ""] {
            assert!(!*raw.parse::<EnvFlag>().unwrap(), "{raw}");
        }
        assert!("maybe".parse::<EnvFlag>().is_err());
    }

    #[test]
    fn test_schema_from_env() {
        let env: HashMap<String, String> = [
            ("DOCUMENT_CHARS", "4"),
            ("FIRST_CHARS", "no"),
            ("FIRST_CHARS_ADD_LETTER", "yes"),
            ("DAY", "1"),
            ("YEAR", "1"),
            ("FN", "on"),
            ("NAME_CHARS", "3"),
            ("KEY_LAYOUT", "opaque"),
            ("DUPLICATE_POLICY", "replace"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = Config::init_from_hashmap(&env).unwrap();
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Replace);

        let schema = config.key_schema().unwrap();
        assert!(schema.has_opaque());

        let fields: Vec<_> = schema.fields().iter().map(|spec| spec.field).collect();
        assert_eq!(
            fields,
            vec![
                KeyField::CitizenId,
                KeyField::Day,
                KeyField::Year,
                KeyField::GivenName
            ]
        );
        assert_eq!(
            schema.fields()[0].truncation,
            Some(Truncation::KeepLastPlusLastChar(4))
        );
        assert_eq!(schema.fields()[3].truncation, Some(Truncation::KeepFirst(3)));
    }

    #[test]
    fn test_narrow_document_width_is_rejected() {
        let env: HashMap<String, String> =
            HashMap::from([("DOCUMENT_CHARS".to_string(), "2".to_string())]);

        let config = Config::init_from_hashmap(&env).unwrap();
        assert_eq!(
            config.key_schema().unwrap_err(),
            SchemaError::DocumentTooNarrow(2)
        );
    }

    #[test]
    fn test_invalid_layout_fails_to_load() {
        let env: HashMap<String, String> =
            HashMap::from([("KEY_LAYOUT".to_string(), "rows".to_string())]);

        assert!(Config::init_from_hashmap(&env).is_err());
    }
}
