use crate::services::substitution::{CompiledRules, ConfigError};
use camino::Utf8PathBuf;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Immutable per-run preprocessing policy.
///
/// Shared read-only (behind an `Arc`) by every mirror task of a run.
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    extensions: BTreeSet<String>,
    rules: CompiledRules,
    verbose: bool,
}

impl PreprocessConfig {
    /// Build the policy from configured extensions and ordered replacement pairs.
    ///
    /// A leading dot on an extension is tolerated and stripped.
    pub fn new<E, S, P, K, V>(extensions: E, replacements: P, verbose: bool) -> Result<Self, ConfigError>
    where
        E: IntoIterator<Item = S>,
        S: AsRef<str>,
        P: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| {
                let ext = ext.as_ref().trim_start_matches('.');
                if ext.is_empty() {
                    Err(ConfigError::EmptyExtension)
                } else {
                    Ok(ext.to_string())
                }
            })
            .collect::<Result<BTreeSet<_>, _>>()?;

        let rules = CompiledRules::compile(replacements)?;

        Ok(Self {
            extensions,
            rules,
            verbose,
        })
    }

    /// Whether a file with this extension (case-sensitive, no leading dot)
    /// has its content rewritten rather than copied.
    pub fn is_eligible_for_substitution(&self, extension: &str) -> bool {
        self.extensions.contains(extension)
    }

    pub fn rules(&self) -> &CompiledRules {
        &self.rules
    }

    pub fn extensions(&self) -> &BTreeSet<String> {
        &self.extensions
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Which kind of tree a root holds, and where its mirror lands under the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKind {
    Source,
    Resource,
}

impl RootKind {
    /// Directory under the target root that receives this kind of tree
    pub fn target_dir(&self) -> &'static str {
        match self {
            Self::Source => "java",
            Self::Resource => "res",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Resource => "resource",
        }
    }
}

/// Fully specified inputs for one mirroring pass.
///
/// Built fresh for every run by
/// [`ConfigManager::resolve`](crate::config::ConfigManager::resolve); every
/// default has already been applied and every path is absolute.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub sources: Vec<Utf8PathBuf>,
    pub resources: Vec<Utf8PathBuf>,
    pub target: Utf8PathBuf,
    pub manifest_name: String,
    pub pool_size: usize,
    pub timeout: Duration,
    pub config: Arc<PreprocessConfig>,
}

impl RunContext {
    pub fn roots(&self, kind: RootKind) -> &[Utf8PathBuf] {
        match kind {
            RootKind::Source => &self.sources,
            RootKind::Resource => &self.resources,
        }
    }

    pub fn manifest_target(&self) -> Utf8PathBuf {
        self.target.join(&self.manifest_name)
    }
}
