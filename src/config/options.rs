use std::collections::HashMap;

use crate::constants::{
    DEFAULT_DISCOVERY_PATH, OPTION_KV_CACERTFILE, OPTION_KV_CERTFILE, OPTION_KV_KEYFILE,
    OPTION_KV_PATH,
};
use crate::TlsFiles;

/// Parsed `kv.*` option map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvOptions {
    /// Namespace base below the uri prefix
    pub base_path: String,
    /// Set only when all three TLS files are configured
    pub tls: Option<TlsFiles>,
}

impl Default for KvOptions {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_DISCOVERY_PATH.to_string(),
            tls: None,
        }
    }
}

fn non_empty<'a>(
    options: &'a HashMap<String, String>,
    key: &str,
) -> Option<&'a str> {
    options.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

impl KvOptions {
    /// Unrecognized keys are ignored.
    pub fn from_map(options: &HashMap<String, String>) -> Self {
        let base_path = match non_empty(options, OPTION_KV_PATH) {
            Some(path) => path.trim().to_string(),
            None => DEFAULT_DISCOVERY_PATH.to_string(),
        };

        let tls = match (
            non_empty(options, OPTION_KV_CACERTFILE),
            non_empty(options, OPTION_KV_CERTFILE),
            non_empty(options, OPTION_KV_KEYFILE),
        ) {
            (Some(ca), Some(cert), Some(key)) => Some(TlsFiles::new(ca, cert, key)),
            _ => None,
        };

        Self { base_path, tls }
    }
}
