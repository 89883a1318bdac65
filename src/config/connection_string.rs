//! `Key=Value;Key=Value` connection strings.
//!
//! Both the telemetry sink and the queue transport are configured this way.
//! Keys are matched case-insensitively; values may themselves contain `=`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionStringError {
    #[error("connection string is empty")]
    Empty,

    #[error("malformed segment '{0}': expected Key=Value")]
    Malformed(String),
}

/// A parsed connection string.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pairs: BTreeMap<String, String>,
}

impl ConnectionString {
    /// Look up a key, ignoring case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

impl FromStr for ConnectionString {
    type Err = ConnectionStringError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut pairs = BTreeMap::new();

        for segment in value.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, val) = segment
                .split_once('=')
                .ok_or_else(|| ConnectionStringError::Malformed(segment.to_string()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ConnectionStringError::Malformed(segment.to_string()));
            }
            pairs.insert(key.to_ascii_lowercase(), val.trim().to_string());
        }

        if pairs.is_empty() {
            return Err(ConnectionStringError::Empty);
        }
        Ok(Self { pairs })
    }
}

// Values can hold secrets, so only keys are printed.
impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("keys", &self.pairs.keys().collect::<Vec<_>>())
            .finish()
    }
}
