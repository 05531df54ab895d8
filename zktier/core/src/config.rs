use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{network::RegistryConfig, tracker::TrackerConfig};

/// Combined configuration for embedding the harness, typically read from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub registry: RegistryConfig,
    pub tracker: TrackerConfig,
}

impl HarnessConfig {
    pub fn from_file<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let document = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&document)?)
    }
}

/// (De)serializes a [`Duration`](std::time::Duration) as a whole number of seconds.
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
