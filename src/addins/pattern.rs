//! Regex rule analyzer
//!
//! Each rule declared with a `pattern` is matched against every line of the
//! code model. The first capture group (or the whole match) fills `{0}` in
//! the rule's message template. Rules with a `fix` get a safe fix that
//! replaces every match on the line.

use crate::addin::{AddIn, AddInError, Analyzer, InitDescriptor};
use crate::project::SourceFile;
use crate::registry::AddInSpec;
use crate::rule::Rule;
use crate::run::FileContext;
use crate::violation::{Fix, Violation};
use parking_lot::RwLock;
use regex::Regex;

/// A rule with its compiled pattern
struct ActiveRule {
    rule: Rule,
    regex: Regex,
}

/// Analyzer for manifest-declared pattern rules
pub struct PatternAnalyzer {
    id: String,
    name: Option<String>,
    parser_id: String,
    rules: Vec<Rule>,
    trusted: bool,
    /// Rules captured by `pre_analyze`, released by `post_analyze`
    active: RwLock<Vec<ActiveRule>>,
}

impl PatternAnalyzer {
    pub fn new(id: &str, parser_id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            parser_id: parser_id.to_string(),
            rules: Vec::new(),
            trusted: false,
            active: RwLock::new(Vec::new()),
        }
    }

    pub fn from_spec(spec: &AddInSpec) -> Result<Self, AddInError> {
        let parser_id = spec.parser.as_deref().ok_or_else(|| {
            AddInError::Invalid(format!("Analyzer {} does not name a parser", spec.id))
        })?;
        Ok(Self::new(&spec.id, parser_id))
    }

    /// Number of rules currently captured for analysis
    pub fn active_rule_count(&self) -> usize {
        self.active.read().len()
    }

    fn compile(&self, rule: &Rule) -> Result<Option<Regex>, AddInError> {
        let Some(pattern) = &rule.pattern else {
            return Ok(None);
        };
        Regex::new(pattern)
            .map(Some)
            .map_err(|e| AddInError::Initialization {
                addin: self.id.clone(),
                message: format!("Rule {} has an invalid pattern: {}", rule.id, e),
            })
    }
}

impl AddIn for PatternAnalyzer {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    fn initialize(
        &mut self,
        descriptor: &InitDescriptor,
        primary: bool,
        trusted: bool,
    ) -> Result<(), AddInError> {
        self.trusted = trusted;
        if primary {
            self.name = descriptor.name.clone();
        }

        for rule in &descriptor.rules {
            if self.rules.iter().any(|r| r.id == rule.id) {
                continue;
            }
            self.compile(rule)?;

            let mut rule = rule.clone().owned_by(&self.id);
            if rule.trusted_only && !trusted {
                rule.enabled = false;
            }
            self.rules.push(rule);
        }

        Ok(())
    }

    fn ready(&mut self) -> Result<(), AddInError> {
        if self.rules.is_empty() {
            log::debug!("Analyzer {} declares no rules", self.id);
        }
        Ok(())
    }

    fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

impl Analyzer for PatternAnalyzer {
    fn parser_id(&self) -> &str {
        &self.parser_id
    }

    fn pre_analyze(&self) {
        let active = self
            .rules
            .iter()
            .filter(|rule| self.trusted || !rule.trusted_only)
            .filter_map(|rule| {
                let regex = self.compile(rule).ok()??;
                Some(ActiveRule {
                    rule: rule.clone(),
                    regex,
                })
            })
            .collect();
        *self.active.write() = active;
    }

    fn analyze_file(&self, file: &SourceFile, ctx: &FileContext<'_>) -> Result<(), AddInError> {
        let active = self.active.read();

        for active_rule in active.iter() {
            let rule = &active_rule.rule;
            if !ctx.is_rule_enabled(&rule.id, file.path()) {
                continue;
            }

            // Collect first; reporting reads the model again
            let hits = file
                .with_model(|model| {
                    let mut hits = Vec::new();
                    for line_no in 1..=model.line_count() {
                        let Some(line) = model.line(line_no) else {
                            continue;
                        };
                        let Some(caps) = active_rule.regex.captures(line) else {
                            continue;
                        };

                        let matched = caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str());
                        let message = rule.render(&[matched.unwrap_or_default()]);
                        let fix = rule.fix.as_ref().map(|replacement| {
                            let fixed = active_rule.regex.replace_all(line, replacement.as_str());
                            Fix::safe(&format!("Apply {}", rule.id), &fixed)
                        });
                        hits.push((line_no, message, fix));
                    }
                    hits
                })
                .unwrap_or_default();

            for (line, message, fix) in hits {
                let mut violation = Violation::new(&rule.id, &message, file.path(), line)
                    .with_severity(rule.severity);
                if let Some(fix) = fix {
                    violation = violation.with_fix(fix);
                }
                ctx.report(file, violation);
            }
        }

        Ok(())
    }

    fn post_analyze(&self) {
        self.active.write().clear();
    }
}
