//! Host platform standard-library filter.

use crate::config::AnalysisConfig;

use super::SymbolRef;

/// Pure predicate over assembly names: does an assembly belong to the
/// platform's standard library?
///
/// An assembly matches a prefix when it equals it or continues it with a
/// `.` (`System.Runtime` matches `System`, `Systematic` does not).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformFilter {
    prefixes: Vec<String>,
}

impl PlatformFilter {
    pub fn new<S: Into<String>>(prefixes: impl IntoIterator<Item = S>) -> Self {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.platform_assembly_prefixes.iter().cloned())
    }

    pub fn is_platform_assembly(&self, assembly: &str) -> bool {
        self.prefixes.iter().any(|prefix| {
            assembly == prefix
                || assembly
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    pub fn is_platform(&self, symbol: &SymbolRef) -> bool {
        self.is_platform_assembly(&symbol.assembly)
    }
}

impl Default for PlatformFilter {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}
