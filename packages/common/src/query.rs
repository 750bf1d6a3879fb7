//! # Startup Query
//!
//! Addressable page parameters (`?gist=abc&rev=123&execute=1`), decoded once
//! at startup and never mutated afterwards.

use percent_encoding::percent_decode_str;
use std::collections::BTreeMap;

const SNIPPET_KEY: &str = "gist";
const REVISION_KEYS: [&str; 2] = ["rev", "sha"];
const EXECUTE_KEYS: [&str; 2] = ["execute", "exec"];

/// Immutable key/value view of the startup parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    params: BTreeMap<String, String>,
}

impl Query {
    /// Decode a query string. A leading `?` is optional.
    ///
    /// `+` decodes to a space, `%XX` escapes are decoded (invalid UTF-8 is
    /// replaced), keys without `=` map to an empty value and the first
    /// occurrence of a repeated key wins.
    pub fn parse(search: &str) -> Self {
        let search = search.strip_prefix('?').unwrap_or(search);
        let mut params = BTreeMap::new();

        for pair in search.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_component(key);
            if key.is_empty() {
                continue;
            }
            params.entry(key).or_insert_with(|| decode_component(value));
        }

        Self { params }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Snippet requested by the page, if any
    pub fn snippet_id(&self) -> Option<&str> {
        self.non_empty(SNIPPET_KEY)
    }

    /// Requested revision (`rev`, falling back to `sha`)
    pub fn revision(&self) -> Option<&str> {
        REVISION_KEYS.iter().find_map(|key| self.non_empty(key))
    }

    /// Whether a loaded snippet should be bundled right away
    pub fn auto_execute(&self) -> bool {
        EXECUTE_KEYS.iter().any(|key| self.non_empty(key).is_some())
    }

    // Empty values are treated as absent
    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}
