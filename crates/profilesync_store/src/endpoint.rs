//! Store endpoints.

use crate::error::StoreError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Where a store lives.
///
/// Accepted spellings:
///
/// - `sqlite::memory:` or `:memory:` - a private in-memory database
/// - `sqlite://<path>` - a SQLite file
/// - a bare filesystem path - a SQLite file
///
/// Any other `scheme://` URL is rejected so a misconfigured server URL
/// fails at startup instead of creating a stray file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// In-memory SQLite database, private to one connection.
    Memory,
    /// SQLite database file.
    Sqlite(PathBuf),
}

impl Endpoint {
    /// Creates a file endpoint.
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Endpoint::Sqlite(path.as_ref().to_path_buf())
    }

    /// Returns the file path for file endpoints.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Endpoint::Memory => None,
            Endpoint::Sqlite(path) => Some(path),
        }
    }
}

impl FromStr for Endpoint {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = |reason: &str| StoreError::InvalidEndpoint {
            endpoint: s.to_string(),
            reason: reason.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid("empty endpoint"));
        }
        if trimmed == ":memory:" || trimmed == "sqlite::memory:" {
            return Ok(Endpoint::Memory);
        }
        if let Some(path) = trimmed.strip_prefix("sqlite://") {
            if path.is_empty() {
                return Err(invalid("missing database path"));
            }
            return Ok(Endpoint::sqlite(path));
        }
        if let Some((scheme, _)) = trimmed.split_once("://") {
            if scheme.eq_ignore_ascii_case("postgres") || scheme.eq_ignore_ascii_case("postgresql")
            {
                return Err(invalid(
                    "PostgreSQL endpoints are not supported; use sqlite://<path> or a file path",
                ));
            }
            return Err(invalid(&format!("unsupported scheme '{scheme}'")));
        }
        Ok(Endpoint::sqlite(trimmed))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Memory => write!(f, "sqlite::memory:"),
            Endpoint::Sqlite(path) => write!(f, "sqlite://{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_memory() {
        assert_eq!("sqlite::memory:".parse::<Endpoint>().unwrap(), Endpoint::Memory);
        assert_eq!(":memory:".parse::<Endpoint>().unwrap(), Endpoint::Memory);
    }

    #[test]
    fn parse_paths() {
        assert_eq!(
            "sqlite:///var/lib/app/primary.db".parse::<Endpoint>().unwrap(),
            Endpoint::sqlite("/var/lib/app/primary.db")
        );
        assert_eq!(
            "data/remote.db".parse::<Endpoint>().unwrap(),
            Endpoint::sqlite("data/remote.db")
        );
    }

    #[test]
    fn reject_foreign_schemes() {
        let err = "mysql://user@host/db".parse::<Endpoint>().unwrap_err();
        assert!(err.to_string().contains("unsupported scheme 'mysql'"));
        let err = "postgresql://user@host/db".parse::<Endpoint>().unwrap_err();
        assert!(err.to_string().contains("PostgreSQL endpoints are not supported"));
        assert!("".parse::<Endpoint>().is_err());
        assert!("sqlite://".parse::<Endpoint>().is_err());
    }

    #[test]
    fn display_roundtrips_through_parse() {
        let endpoint = Endpoint::sqlite("/tmp/x.db");
        assert_eq!(endpoint.to_string().parse::<Endpoint>().unwrap(), endpoint);
        assert_eq!(Endpoint::Memory.to_string(), "sqlite::memory:");
    }
}
