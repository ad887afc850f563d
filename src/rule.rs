//! Rule descriptors

use crate::violation::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rule category for grouping related rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleCategory {
    /// Naming conventions
    Naming,
    /// Element and file layout
    Layout,
    /// Ordering of members and directives
    Ordering,
    /// Readability of expressions and statements
    #[default]
    Readability,
    /// Spacing and whitespace
    Spacing,
    /// Documentation requirements
    Documentation,
    /// Maintainability concerns
    Maintainability,
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleCategory::Naming => write!(f, "naming"),
            RuleCategory::Layout => write!(f, "layout"),
            RuleCategory::Ordering => write!(f, "ordering"),
            RuleCategory::Readability => write!(f, "readability"),
            RuleCategory::Spacing => write!(f, "spacing"),
            RuleCategory::Documentation => write!(f, "documentation"),
            RuleCategory::Maintainability => write!(f, "maintainability"),
        }
    }
}

impl std::str::FromStr for RuleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "naming" => Ok(RuleCategory::Naming),
            "layout" => Ok(RuleCategory::Layout),
            "ordering" => Ok(RuleCategory::Ordering),
            "readability" => Ok(RuleCategory::Readability),
            "spacing" => Ok(RuleCategory::Spacing),
            "documentation" | "docs" => Ok(RuleCategory::Documentation),
            "maintainability" => Ok(RuleCategory::Maintainability),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

/// A rule an add-in can detect
///
/// Rules are immutable once their add-in has been initialized. The
/// `context` string is the message template; positional `{0}`, `{1}`
/// placeholders are filled by [`Rule::render`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique rule identifier (e.g., "AvoidGoto")
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,

    /// Message template
    pub context: String,

    /// Detailed description
    #[serde(default)]
    pub description: Option<String>,

    /// Default severity level
    #[serde(default)]
    pub severity: Severity,

    /// Rule category
    #[serde(default)]
    pub category: RuleCategory,

    /// Whether this rule is enabled when settings say nothing about it
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Identifier of the add-in that owns the rule
    #[serde(default)]
    pub addin_id: String,

    /// Line pattern for manifest-declared rules
    #[serde(default)]
    pub pattern: Option<String>,

    /// Replacement applied by auto-fix for pattern rules
    #[serde(default)]
    pub fix: Option<String>,

    /// Only honoured when the owning module is trusted
    #[serde(default)]
    pub trusted_only: bool,
}

fn default_true() -> bool {
    true
}

impl Rule {
    /// Create a new rule with minimal required fields
    pub fn new(id: &str, context: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            context: context.to_string(),
            description: None,
            severity: Severity::Warning,
            category: RuleCategory::default(),
            enabled: true,
            addin_id: String::new(),
            pattern: None,
            fix: None,
            trusted_only: false,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_category(mut self, category: RuleCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }

    pub fn with_fix(mut self, replacement: &str) -> Self {
        self.fix = Some(replacement.to_string());
        self
    }

    /// Set the default-enabled flag
    pub fn enabled_by_default(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn owned_by(mut self, addin_id: &str) -> Self {
        self.addin_id = addin_id.to_string();
        self
    }

    /// Name of the synthesized boolean option controlling this rule
    pub fn enabled_option(&self) -> String {
        format!("{}#Enabled", self.id)
    }

    /// Render the message template with positional arguments
    pub fn render(&self, args: &[&str]) -> String {
        let mut message = self.context.clone();
        for (i, arg) in args.iter().enumerate() {
            message = message.replace(&format!("{{{}}}", i), arg);
        }
        message
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_creation() {
        let rule = Rule::new("AvoidGoto", "Do not use goto");

        assert_eq!(rule.id, "AvoidGoto");
        assert_eq!(rule.severity, Severity::Warning);
        assert!(rule.enabled);
        assert_eq!(rule.display_name(), "AvoidGoto");
    }

    #[test]
    fn test_rule_builder() {
        let rule = Rule::new("R1", "msg")
            .with_name("Rule One")
            .with_severity(Severity::Error)
            .with_category(RuleCategory::Naming)
            .enabled_by_default(false)
            .owned_by("naming");

        assert_eq!(rule.display_name(), "Rule One");
        assert_eq!(rule.category, RuleCategory::Naming);
        assert!(!rule.enabled);
        assert_eq!(rule.addin_id, "naming");
    }

    #[test]
    fn test_render() {
        let rule = Rule::new("R1", "Field '{0}' must start with '{1}'");
        assert_eq!(rule.render(&["count", "m_"]), "Field 'count' must start with 'm_'");
        assert_eq!(rule.render(&[]), "Field '{0}' must start with '{1}'");
    }

    #[test]
    fn test_enabled_option_name() {
        assert_eq!(Rule::new("AvoidGoto", "x").enabled_option(), "AvoidGoto#Enabled");
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("docs".parse::<RuleCategory>(), Ok(RuleCategory::Documentation));
        assert!("nope".parse::<RuleCategory>().is_err());
    }

    #[test]
    fn test_rule_deserialize_defaults() {
        let yaml = r#"
id: AvoidGoto
context: "goto statement on line"
pattern: "\\bgoto\\b"
"#;
        let rule: Rule = serde_yaml::from_str(yaml).unwrap();
        assert!(rule.enabled);
        assert!(!rule.trusted_only);
        assert_eq!(rule.pattern.as_deref(), Some("\\bgoto\\b"));
        assert!(rule.addin_id.is_empty());
    }
}
