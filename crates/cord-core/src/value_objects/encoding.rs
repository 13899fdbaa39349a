//! Gateway payload encoding

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValueError;

/// Wire encoding requested in the gateway URL (`?encoding=`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayEncoding {
    #[default]
    Json,
    /// Erlang external term format
    Etf,
}

impl GatewayEncoding {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Etf => "etf",
        }
    }

    /// Whether this crate ships a codec for the encoding
    #[must_use]
    pub const fn is_supported(self) -> bool {
        matches!(self, Self::Json)
    }
}

impl fmt::Display for GatewayEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayEncoding {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "etf" => Ok(Self::Etf),
            other => Err(ValueError::UnknownEncoding(other.to_string())),
        }
    }
}
