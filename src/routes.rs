//! Virtual-host route table.
//!
//! Built once at startup from `PREFIX_SUB_DOMAIN=backend-url` variables and
//! shared read-only afterwards.

use axum::http::Uri;
use std::collections::HashMap;
use std::ffi::OsString;
use tracing::{error, info, warn};

use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, Uri>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from `(key, value)` pairs, keeping only keys that start
    /// with `prefix`. Values that fail to parse are logged and skipped.
    pub fn from_vars<I, K, V>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut table = Self::new();

        for (key, value) in vars {
            let key = key.as_ref();
            let Some(name) = key.strip_prefix(prefix) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }

            let host = name.replace('_', ".").to_lowercase();
            match parse_backend(key, value.as_ref()) {
                Ok(backend) => {
                    info!(host = %host, backend = %backend, "Registered route");
                    table.routes.insert(host, backend);
                }
                Err(e) => error!(error = %e, "Skipping route"),
            }
        }

        table
    }

    /// Read routes from the process environment.
    ///
    /// Variables whose name or value is not valid UTF-8 are skipped.
    pub fn from_env(prefix: &str) -> Self {
        Self::from_vars_os(prefix, std::env::vars_os())
    }

    fn from_vars_os<I>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let vars = vars.into_iter().filter_map(|(key, value)| {
            match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => Some((key, value)),
                (Ok(key), Err(_)) if key.starts_with(prefix) => {
                    warn!(key = %key, "Skipping route with non UTF-8 value");
                    None
                }
                _ => None,
            }
        });
        Self::from_vars(prefix, vars)
    }

    /// Add a route. `host` must already be lowercase.
    pub fn insert(&mut self, host: impl Into<String>, backend: &str) -> Result<()> {
        let host = host.into();
        let backend = parse_backend(&host, backend)?;
        self.routes.insert(host, backend);
        Ok(())
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, host: &str) -> Option<&Uri> {
        self.routes.get(host)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

}

fn parse_backend(key: &str, value: &str) -> Result<Uri> {
    let value = value.trim();
    let candidate = if value.starts_with("http") {
        value.to_string()
    } else {
        format!("http://{}", value)
    };

    let uri: Uri = candidate.parse().map_err(|e| GatewayError::InvalidRoute {
        key: key.to_string(),
        reason: format!("{}", e),
    })?;

    if uri.host().map_or(true, str::is_empty) {
        return Err(GatewayError::InvalidRoute {
            key: key.to_string(),
            reason: format!("backend '{}' has no host", value),
        });
    }

    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_dot_joined_and_lowercased() {
        let table = RouteTable::from_vars(
            "RO_",
            vec![
                ("RO_PHOTOS_EXAMPLE_COM", "http://immich:2283"),
                ("RO_Api_Example_Com", "backend:8080"),
            ],
        );

        assert_eq!(table.len(), 2);
        let photos = table.get("photos.example.com").unwrap();
        assert_eq!(photos.scheme_str(), Some("http"));
        assert_eq!(photos.authority().unwrap().as_str(), "immich:2283");
        assert_eq!(
            table.get("api.example.com").unwrap().authority().unwrap().as_str(),
            "backend:8080"
        );
    }

    #[test]
    fn test_unrelated_and_empty_keys_are_ignored() {
        let table = RouteTable::from_vars(
            "RO_",
            vec![("PATH", "/usr/bin"), ("RO_", "http://x"), ("XRO_A", "http://y")],
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_invalid_backend_is_skipped() {
        let table = RouteTable::from_vars(
            "RO_",
            vec![("RO_BAD_HOST", "http://exa mple"), ("RO_GOOD", "good:80")],
        );
        assert_eq!(table.len(), 1);
        assert!(table.get("good").is_some());
        assert!(table.get("bad.host").is_none());
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let mut table = RouteTable::new();
        table.insert("app.example.com", "http://127.0.0.1:9000").unwrap();

        assert!(table.get("app.example.com").is_some());
        assert!(table.get("App.Example.com").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_variables_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let junk = || OsString::from_vec(vec![0xff, 0xfe]);
        let table = RouteTable::from_vars_os(
            "RO_",
            vec![
                (OsString::from("UNRELATED_JUNK"), junk()),
                (junk(), OsString::from("http://x")),
                (OsString::from("RO_BROKEN"), junk()),
                (OsString::from("RO_APP_LOCAL"), OsString::from("app:8080")),
            ],
        );

        assert_eq!(table.len(), 1);
        assert!(table.get("app.local").is_some());
        assert!(table.get("broken").is_none());
    }

    #[test]
    fn test_insert_rejects_garbage() {
        let mut table = RouteTable::new();
        assert!(table.insert("x", "http://").is_err());
    }
}
