use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Default directory mirrored as Java sources when none are configured
pub const DEFAULT_SOURCE_ROOT: &str = "src/main/java";

/// Default directory mirrored as resources when none are configured
pub const DEFAULT_RESOURCE_ROOT: &str = "src/main/res";

/// Default output root, relative to the project directory
pub const DEFAULT_TARGET: &str = "build/preprocessed";

/// Manifest file picked up next to the primary source root
pub const DEFAULT_MANIFEST: &str = "AndroidManifest.xml";

/// Preprocessor settings loaded from `preprocessor.yaml`
///
/// This is the long-lived, user-editable configuration. Optional fields stay
/// `None`/empty after a run; defaults are only applied to the per-run
/// [`RunContext`](crate::models::RunContext) built by
/// [`ConfigManager::resolve`](crate::config::ConfigManager::resolve).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreprocessorSettings {
    /// Token to replacement mapping, applied in file order
    #[serde(default)]
    pub replace: ReplaceMap,

    /// Extensions (without the leading dot) whose files get token substitution
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default)]
    pub resources: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PreprocessorSettings {
    fn default() -> Self {
        Self {
            replace: ReplaceMap::new(),
            extensions: default_extensions(),
            sources: Vec::new(),
            resources: Vec::new(),
            target: None,
            manifest: None,
            verbose: false,
            pool_size: default_pool_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["java".to_string(), "xml".to_string()]
}

fn default_pool_size() -> usize {
    4
}

// Two days, long enough that only a wedged filesystem trips it
fn default_timeout_secs() -> u64 {
    2 * 24 * 60 * 60
}

/// Token to replacement entries in the order they were written
///
/// Unlike a map, a token written twice is kept twice, so that rule
/// compilation can reject it instead of the last entry silently winning.
/// Serialized as a plain YAML mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaceMap {
    entries: Vec<(String, ReplaceValue)>,
}

impl ReplaceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, even if `token` is already present
    pub fn insert(&mut self, token: impl Into<String>, value: impl Into<ReplaceValue>) {
        self.entries.push((token.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ReplaceValue)> {
        self.entries
            .iter()
            .map(|(token, value)| (token.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ReplaceMap
where
    K: Into<String>,
    V: Into<ReplaceValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (token, value) in iter {
            map.insert(token, value);
        }
        map
    }
}

impl Serialize for ReplaceMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (token, value) in &self.entries {
            map.serialize_entry(token, value)?;
        }
        map.end()
    }
}

struct ReplaceMapVisitor;

impl<'de> Visitor<'de> for ReplaceMapVisitor {
    type Value = ReplaceMap;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a mapping of tokens to replacement values")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(entry) = access.next_entry::<String, ReplaceValue>()? {
            entries.push(entry);
        }
        Ok(ReplaceMap { entries })
    }

    // `replace:` with nothing after it
    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(ReplaceMap::new())
    }
}

impl<'de> Deserialize<'de> for ReplaceMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(ReplaceMapVisitor)
    }
}

/// A replacement value as written in YAML
///
/// Scalars other than strings are accepted so that `VERSION_CODE: 42` works
/// without quoting; they are rendered with their display form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ReplaceValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ReplaceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            // Debug keeps the fractional part, so `1.0` stays `1.0`
            Self::Float(x) => write!(f, "{:?}", x),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ReplaceValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ReplaceValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl PreprocessorSettings {
    /// Token/replacement pairs in configured order, replacements rendered as text
    pub fn replacement_pairs(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.replace
            .iter()
            .map(|(token, value)| (token.to_string(), value.to_string()))
    }
}
