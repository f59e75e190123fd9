use std::path::Path;
use std::sync::Arc;

use super::csharp::CSharpParser;
use super::{ParseError, SourceParser};

/// Front ends available to an analysis, looked up by file extension.
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn SourceParser>>,
    /// Extensions analysis is allowed to parse, lowercase. Empty allows all.
    enabled: Vec<String>,
}

impl ParserRegistry {
    /// Registry with every built-in front end enabled. Fails when a
    /// built-in grammar cannot be loaded.
    pub fn new() -> Result<Self, ParseError> {
        Ok(Self::from_parsers(vec![Arc::new(CSharpParser::new()?)]))
    }

    pub fn from_parsers(parsers: Vec<Arc<dyn SourceParser>>) -> Self {
        Self {
            parsers,
            enabled: Vec::new(),
        }
    }

    /// Restrict parsing to the given extensions (`analysis.include_extensions`).
    pub fn restricted_to<S: AsRef<str>>(mut self, extensions: &[S]) -> Self {
        self.enabled = extensions
            .iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// Front end for a path, if its extension is enabled.
    pub fn parser_for_path(&self, path: &str) -> Option<Arc<dyn SourceParser>> {
        let extension = Path::new(path).extension()?.to_str()?;
        if !self.enabled.is_empty() && !self.enabled.iter().any(|e| e.eq_ignore_ascii_case(extension)) {
            return None;
        }
        self.parsers
            .iter()
            .find(|p| p.can_parse(extension))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csharp_by_path() {
        let registry = ParserRegistry::new().unwrap();
        let parser = registry.parser_for_path("src/Program.cs").unwrap();
        assert_eq!(parser.language_name(), "C#");
        assert!(registry.parser_for_path("src/Program.CS").is_some());
        assert!(registry.parser_for_path("README.md").is_none());
        assert!(registry.parser_for_path("Makefile").is_none());
    }

    #[test]
    fn test_restriction_disables_extensions() {
        let registry = ParserRegistry::new().unwrap().restricted_to(&["md"]);
        assert!(registry.parser_for_path("src/Program.cs").is_none());

        let registry = ParserRegistry::new().unwrap().restricted_to(&[".CS"]);
        assert!(registry.parser_for_path("src/Program.cs").is_some());
    }
}
