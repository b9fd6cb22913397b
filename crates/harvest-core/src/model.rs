use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown environment `{0}` (expected prod, test, dev or local)")]
    UnknownEnvironment(String),
    #[error("unknown channel `{0}`")]
    UnknownChannel(String),
}

/// Lifecycle label stored in an item's `harvestState` field.
///
/// `New` and `Updated` are set by the uploading side and mean the item is
/// waiting for its first (or a fresh) harvest. The worker itself only ever
/// writes `InProgress`, `Done` and `Failed`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HarvestState {
    New,
    Updated,
    Requested,
    InProgress,
    Done,
    Failed,
    #[serde(other)]
    Unknown,
}

impl HarvestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HarvestState::New => "New",
            HarvestState::Updated => "Updated",
            HarvestState::Requested => "Requested",
            HarvestState::InProgress => "InProgress",
            HarvestState::Done => "Done",
            HarvestState::Failed => "Failed",
            HarvestState::Unknown => "Unknown",
        }
    }

    /// Newly submitted or recently updated items get their own alert quota.
    pub fn is_fresh(&self) -> bool {
        matches!(self, HarvestState::New | HarvestState::Updated)
    }
}

impl fmt::Display for HarvestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Prod,
    Test,
    Dev,
    Local,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Prod => "prod",
            Environment::Test => "test",
            Environment::Dev => "dev",
            Environment::Local => "local",
        }
    }

    /// Bucket the uploaded source items are downloaded from.
    pub fn source_bucket(&self) -> &'static str {
        match self {
            Environment::Prod => "library-items",
            Environment::Test => "library-items-unittest",
            Environment::Dev | Environment::Local => "library-items-sandbox",
        }
    }

    /// Bucket the harvested artifacts are uploaded to.
    pub fn output_bucket(&self) -> &'static str {
        match self {
            Environment::Prod => "library-harvest",
            Environment::Test => "library-harvest-unittest",
            Environment::Dev | Environment::Local => "library-harvest-sandbox",
        }
    }

    fn library_subdomain(&self) -> String {
        match self {
            Environment::Prod => String::new(),
            other => format!("{}.", other.as_str()),
        }
    }

    pub fn library_host(&self) -> String {
        format!("{}library.example.org", self.library_subdomain())
    }
}

impl FromStr for Environment {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Ok(Environment::Prod),
            "test" => Ok(Environment::Test),
            "dev" | "development" => Ok(Environment::Dev),
            "local" => Ok(Environment::Local),
            other => Err(ParseError::UnknownEnvironment(other.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distribution channels an item can be shown through.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    Epub,
    Pdf,
    BloomReader,
    ReadOnline,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Epub, Channel::Pdf, Channel::BloomReader, Channel::ReadOnline];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Epub => "epub",
            Channel::Pdf => "pdf",
            Channel::BloomReader => "bloomReader",
            Channel::ReadOnline => "readOnline",
        }
    }
}

impl FromStr for Channel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ParseError::UnknownChannel(s.to_string()))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_new_and_updated_are_fresh() {
        assert!(HarvestState::New.is_fresh());
        assert!(HarvestState::Updated.is_fresh());
        assert!(!HarvestState::Requested.is_fresh());
        assert!(!HarvestState::InProgress.is_fresh());
        assert!(!HarvestState::Done.is_fresh());
        assert!(!HarvestState::Failed.is_fresh());
        assert!(!HarvestState::Unknown.is_fresh());
    }

    #[test]
    fn unknown_state_label_deserializes() {
        let s: HarvestState = serde_json::from_str("\"Aborted\"").unwrap();
        assert_eq!(s, HarvestState::Unknown);
        let s: HarvestState = serde_json::from_str("\"InProgress\"").unwrap();
        assert_eq!(s, HarvestState::InProgress);
    }

    #[test]
    fn environment_parses_aliases() {
        assert_eq!("Production".parse::<Environment>().unwrap(), Environment::Prod);
        assert_eq!(" dev ".parse::<Environment>().unwrap(), Environment::Dev);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn prod_library_host_has_no_subdomain() {
        assert_eq!(Environment::Prod.library_host(), "library.example.org");
        assert_eq!(Environment::Dev.library_host(), "dev.library.example.org");
    }

    #[test]
    fn channel_names_roundtrip() {
        for c in Channel::ALL {
            assert_eq!(c.as_str().parse::<Channel>().unwrap(), c);
        }
        assert_eq!(serde_json::to_string(&Channel::BloomReader).unwrap(), "\"bloomReader\"");
    }
}
