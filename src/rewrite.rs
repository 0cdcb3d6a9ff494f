//! URL rewrite engine.
//!
//! Rewrites request paths through an ordered list of (pattern, template)
//! rules before routing. Patterns are matched segment by segment: a literal
//! segment matches itself, `:name` captures one segment, and a trailing `*`
//! captures the rest of the path. Templates substitute `:name` captures and
//! `$1` for the wildcard remainder. The first matching rule wins and is
//! applied exactly once; a rewritten path is never fed back into the rules.

use std::collections::HashMap;

use crate::config::RewriteRuleConfig;

/// Errors raised while compiling rewrite rules from configuration.
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("rule `{0}`: `*` is only allowed as the final pattern segment")]
    WildcardNotLast(String),

    #[error("rule `{0}`: template references `:{1}` which the pattern does not capture")]
    UnknownCapture(String, String),

    #[error("rule `{0}`: template references `$1` but the pattern has no `*`")]
    MissingWildcard(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Literal(String),
    Param(String),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplateSegment {
    Literal(String),
    Param(String),
    Rest,
}

/// One compiled rewrite rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: Vec<PatternSegment>,
    template: Vec<TemplateSegment>,
}

impl Rule {
    /// Compile a rule from its textual pattern and replacement template.
    pub fn parse(pattern: &str, replacement: &str) -> Result<Self, RewriteError> {
        let raw_pattern: Vec<&str> = segments(pattern);

        let mut compiled_pattern = Vec::with_capacity(raw_pattern.len());
        for (index, segment) in raw_pattern.iter().enumerate() {
            let compiled = if *segment == "*" {
                if index + 1 != raw_pattern.len() {
                    return Err(RewriteError::WildcardNotLast(pattern.to_string()));
                }
                PatternSegment::Wildcard
            } else if let Some(name) = segment.strip_prefix(':') {
                PatternSegment::Param(name.to_string())
            } else {
                PatternSegment::Literal(segment.to_string())
            };
            compiled_pattern.push(compiled);
        }

        let mut compiled_template = Vec::new();
        for segment in segments(replacement) {
            let compiled = if segment == "$1" {
                if !compiled_pattern.contains(&PatternSegment::Wildcard) {
                    return Err(RewriteError::MissingWildcard(pattern.to_string()));
                }
                TemplateSegment::Rest
            } else if let Some(name) = segment.strip_prefix(':') {
                let captured = compiled_pattern
                    .iter()
                    .any(|p| matches!(p, PatternSegment::Param(n) if n == name));
                if !captured {
                    return Err(RewriteError::UnknownCapture(
                        pattern.to_string(),
                        name.to_string(),
                    ));
                }
                TemplateSegment::Param(name.to_string())
            } else {
                TemplateSegment::Literal(segment.to_string())
            };
            compiled_template.push(compiled);
        }

        Ok(Self {
            pattern: compiled_pattern,
            template: compiled_template,
        })
    }

    /// Apply this rule to a path, returning the rewritten path on a match.
    pub fn apply(&self, path: &str) -> Option<String> {
        let path_segments = segments(path);

        let mut captures: HashMap<&str, &str> = HashMap::new();
        let mut rest: Option<String> = None;

        for (index, pattern) in self.pattern.iter().enumerate() {
            match pattern {
                PatternSegment::Literal(literal) => {
                    if path_segments.get(index) != Some(&literal.as_str()) {
                        return None;
                    }
                }
                PatternSegment::Param(name) => {
                    let segment = path_segments.get(index)?;
                    captures.insert(name.as_str(), segment);
                }
                PatternSegment::Wildcard => {
                    // The wildcard needs at least one segment to capture
                    if index >= path_segments.len() {
                        return None;
                    }
                    rest = Some(path_segments[index..].join("/"));
                }
            }
        }

        // Without a wildcard, the pattern must consume the whole path
        if rest.is_none() && path_segments.len() != self.pattern.len() {
            return None;
        }

        let mut rewritten = String::new();
        for template in &self.template {
            rewritten.push('/');
            match template {
                TemplateSegment::Literal(literal) => rewritten.push_str(literal),
                TemplateSegment::Param(name) => rewritten.push_str(captures.get(name.as_str())?),
                TemplateSegment::Rest => rewritten.push_str(rest.as_deref()?),
            }
        }
        if rewritten.is_empty() {
            rewritten.push('/');
        }

        Some(rewritten)
    }
}

/// An ordered set of rewrite rules; the first match wins.
#[derive(Debug, Clone)]
pub struct Rewriter {
    rules: Vec<Rule>,
}

impl Rewriter {
    /// Compile the configured rules in declaration order.
    pub fn from_rules(rules: &[RewriteRuleConfig]) -> Result<Self, RewriteError> {
        let rules = rules
            .iter()
            .map(|rule| Rule::parse(&rule.pattern, &rule.replacement))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Rewrite a path, or `None` when no rule matches.
    pub fn rewrite(&self, path: &str) -> Option<String> {
        self.rules.iter().find_map(|rule| rule.apply(path))
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_rewriter() -> Rewriter {
        Rewriter::from_rules(&crate::config::ServerConfig::default().rewrites).unwrap()
    }

    #[test]
    fn test_wildcard_strips_api_prefix() {
        let rewriter = default_rewriter();
        assert_eq!(rewriter.rewrite("/api/widgets"), Some("/widgets".to_string()));
        assert_eq!(
            rewriter.rewrite("/api/widgets/3"),
            Some("/widgets/3".to_string())
        );
    }

    #[test]
    fn test_named_captures_flatten_nested_resource() {
        let rewriter = default_rewriter();
        assert_eq!(
            rewriter.rewrite("/blog/posts/42/show"),
            Some("/posts/42".to_string())
        );
    }

    #[test]
    fn test_non_matching_paths_pass_through() {
        let rewriter = default_rewriter();
        assert_eq!(rewriter.rewrite("/widgets"), None);
        assert_eq!(rewriter.rewrite("/api"), None);
        assert_eq!(rewriter.rewrite("/blog/posts/42"), None);
    }

    #[test]
    fn test_first_match_wins() {
        let rules = vec![
            RewriteRuleConfig {
                pattern: "/api/*".to_string(),
                replacement: "/first/$1".to_string(),
            },
            RewriteRuleConfig {
                pattern: "/api/widgets".to_string(),
                replacement: "/second".to_string(),
            },
        ];
        let rewriter = Rewriter::from_rules(&rules).unwrap();
        assert_eq!(
            rewriter.rewrite("/api/widgets"),
            Some("/first/widgets".to_string())
        );
    }

    #[test]
    fn test_wildcard_must_be_last() {
        assert!(matches!(
            Rule::parse("/api/*/tail", "/$1"),
            Err(RewriteError::WildcardNotLast(_))
        ));
    }

    #[test]
    fn test_template_captures_must_exist() {
        assert!(matches!(
            Rule::parse("/blog/:resource", "/:id"),
            Err(RewriteError::UnknownCapture(_, _))
        ));
        assert!(matches!(
            Rule::parse("/api/widgets", "/$1"),
            Err(RewriteError::MissingWildcard(_))
        ));
    }

    #[test]
    fn test_exact_length_without_wildcard() {
        let rule = Rule::parse("/blog/:resource/:id/show", "/:resource/:id").unwrap();
        assert!(rule.apply("/blog/posts/42/show/extra").is_none());
        assert!(rule.apply("/blog/posts/42").is_none());
    }
}
