use std::time::Duration;

use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "courtside";
/// CouchDB closes idle long-polls after 60 s; answer a little earlier.
const DEFAULT_CHANGES_TIMEOUT: Duration = Duration::from_secs(55);

/// Connection settings for the CouchDB scoreboard store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouchConfig {
    pub base_url: String,
    pub database: String,
    pub credentials: Option<(String, String)>,
    /// Upper bound of one `_changes` long-poll round.
    pub changes_timeout: Duration,
}

impl CouchConfig {
    /// Read `COUCH_BASE_URL` (required), `COUCH_DB`, `COUCH_USERNAME`/`COUCH_PASSWORD` and
    /// `COUCH_CHANGES_TIMEOUT_SECS`.
    pub fn from_env() -> CouchResult<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CouchResult<Self> {
        let base_url = lookup("COUCH_BASE_URL").ok_or(CouchDaoError::MissingEnvVar {
            var: "COUCH_BASE_URL",
        })?;
        let database = lookup("COUCH_DB").unwrap_or_else(|| DEFAULT_DATABASE.to_owned());
        let credentials = lookup("COUCH_USERNAME").zip(lookup("COUCH_PASSWORD"));

        let changes_timeout = match lookup("COUCH_CHANGES_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(CouchDaoError::InvalidEnvVar {
                    var: "COUCH_CHANGES_TIMEOUT_SECS",
                    value: raw,
                })?,
            None => DEFAULT_CHANGES_TIMEOUT,
        };

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            database,
            credentials,
            changes_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let vars: HashMap<_, _> = vars.iter().copied().collect();
        move |key| vars.get(key).map(|value| value.to_string())
    }

    #[test]
    fn base_url_is_required() {
        let err = CouchConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(
            err,
            CouchDaoError::MissingEnvVar {
                var: "COUCH_BASE_URL"
            }
        ));
    }

    #[test]
    fn defaults_fill_optional_settings() {
        let config =
            CouchConfig::from_lookup(lookup(&[("COUCH_BASE_URL", "http://couch:5984/")])).unwrap();
        assert_eq!(config.base_url, "http://couch:5984");
        assert_eq!(config.database, "courtside");
        assert_eq!(config.credentials, None);
        assert_eq!(config.changes_timeout, DEFAULT_CHANGES_TIMEOUT);
    }

    #[test]
    fn credentials_need_both_halves() {
        let config = CouchConfig::from_lookup(lookup(&[
            ("COUCH_BASE_URL", "http://couch:5984"),
            ("COUCH_USERNAME", "admin"),
        ]))
        .unwrap();
        assert_eq!(config.credentials, None);

        let config = CouchConfig::from_lookup(lookup(&[
            ("COUCH_BASE_URL", "http://couch:5984"),
            ("COUCH_USERNAME", "admin"),
            ("COUCH_PASSWORD", "secret"),
        ]))
        .unwrap();
        assert_eq!(
            config.credentials,
            Some(("admin".to_owned(), "secret".to_owned()))
        );
    }

    #[test]
    fn changes_timeout_must_be_positive_seconds() {
        let config = CouchConfig::from_lookup(lookup(&[
            ("COUCH_BASE_URL", "http://couch:5984"),
            ("COUCH_CHANGES_TIMEOUT_SECS", "20"),
        ]))
        .unwrap();
        assert_eq!(config.changes_timeout, Duration::from_secs(20));

        let err = CouchConfig::from_lookup(lookup(&[
            ("COUCH_BASE_URL", "http://couch:5984"),
            ("COUCH_CHANGES_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, CouchDaoError::InvalidEnvVar { .. }));
    }
}
