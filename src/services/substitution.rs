use regex::{NoExpand, Regex};
use std::borrow::Cow;
use std::collections::HashSet;
use thiserror::Error;

/// Errors raised while turning configuration into a runnable preprocessor.
///
/// These are always fatal and are reported before any file is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Duplicate replacement token: {0:?}")]
    DuplicateToken(String),

    #[error("Replacement tokens must not be empty")]
    EmptyToken,

    #[error("Invalid replacement token {token:?}: {reason}")]
    InvalidToken { token: String, reason: String },

    #[error("File extensions must not be empty")]
    EmptyExtension,

    #[error("Worker pool size must be at least 1")]
    InvalidPoolSize,
}

/// A single literal token and the text that replaces it.
#[derive(Debug, Clone)]
pub struct SubstitutionRule {
    token: String,
    replacement: String,
    matcher: Regex,
}

impl SubstitutionRule {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }
}

/// Ordered set of literal substitution rules.
///
/// Rules are applied one after another in the order they were configured, so
/// a later rule sees the text produced by the earlier ones. Each token is
/// escaped before it is compiled and each replacement is inserted verbatim
/// through [`NoExpand`], which keeps `$1` or `${name}` in a replacement from
/// being read as a capture group reference.
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    rules: Vec<SubstitutionRule>,
}

impl CompiledRules {
    /// Compile an ordered sequence of `(token, replacement)` pairs.
    ///
    /// # Errors
    /// - [`ConfigError::EmptyToken`] if a token is the empty string
    /// - [`ConfigError::DuplicateToken`] if the same token appears twice
    pub fn compile<I, K, V>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut rules = Vec::new();

        for (token, replacement) in pairs {
            let token = token.into();
            if token.is_empty() {
                return Err(ConfigError::EmptyToken);
            }
            if !seen.insert(token.clone()) {
                return Err(ConfigError::DuplicateToken(token));
            }

            // Escaped literals only fail on the regex size limit
            let matcher =
                Regex::new(&regex::escape(&token)).map_err(|e| ConfigError::InvalidToken {
                    token: token.clone(),
                    reason: e.to_string(),
                })?;

            rules.push(SubstitutionRule {
                token,
                replacement: replacement.into(),
                matcher,
            });
        }

        tracing::debug!("Compiled {} substitution rules", rules.len());
        Ok(Self { rules })
    }

    /// Apply every rule, in order, to `content`.
    pub fn apply(&self, content: &str) -> String {
        let mut current = Cow::Borrowed(content);

        for rule in &self.rules {
            let replaced = match rule
                .matcher
                .replace_all(&current, NoExpand(&rule.replacement))
            {
                Cow::Borrowed(_) => continue,
                Cow::Owned(replaced) => replaced,
            };
            current = Cow::Owned(replaced);
        }

        current.into_owned()
    }

    pub fn rules(&self) -> &[SubstitutionRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
