//! Line-oriented parser and code model

use crate::addin::{AddIn, AddInError, InitDescriptor, ParseOutcome, Parser};
use crate::project::{CodeModel, SourceFile};
use crate::registry::AddInSpec;
use crate::rule::Rule;
use crate::run::FileContext;
use regex::Regex;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// Type alias for suppression comment parsing result
type SuppressionParseResult = (
    HashMap<String, HashSet<usize>>,         // suppressed_lines
    HashSet<String>,                         // suppressed_file_rules
    HashMap<String, HashMap<usize, String>>, // reasons
);

// Formats, in any comment style:
//   stylecheck-disable AvoidGoto
//   stylecheck-disable-next-line AvoidGoto: reason here
//   stylecheck-disable-file all
static SUPPRESSION_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"stylecheck-disable(-next-line|-file)?\s+([A-Za-z0-9_.#*-]+)(?:\s*:\s*(.+?))?\s*(?:-->|\*/)?\s*$")
        .ok()
});

/// Source text split into lines, with inline suppressions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextModel {
    lines: Vec<String>,
    line_ending: &'static str,
    trailing_newline: bool,
    suppressed_lines: HashMap<String, HashSet<usize>>,
    suppressed_file_rules: HashSet<String>,
    /// Reasons for suppressions (rule_id -> line -> reason, line 0 = file)
    reasons: HashMap<String, HashMap<usize, String>>,
}

impl TextModel {
    pub fn parse(text: &str) -> Self {
        let lines: Vec<String> = text.lines().map(String::from).collect();
        let line_ending = if text.contains("\r\n") { "\r\n" } else { "\n" };
        let (suppressed_lines, suppressed_file_rules, reasons) = Self::parse_suppressions(&lines);

        Self {
            lines,
            line_ending,
            trailing_newline: text.ends_with('\n'),
            suppressed_lines,
            suppressed_file_rules,
            reasons,
        }
    }

    fn parse_suppressions(lines: &[String]) -> SuppressionParseResult {
        let mut suppressed_lines: HashMap<String, HashSet<usize>> = HashMap::new();
        let mut suppressed_file_rules = HashSet::new();
        let mut reasons: HashMap<String, HashMap<usize, String>> = HashMap::new();

        let Some(re) = SUPPRESSION_RE.as_ref() else {
            return (suppressed_lines, suppressed_file_rules, reasons);
        };

        for (i, line) in lines.iter().enumerate() {
            let Some(cap) = re.captures(line) else {
                continue;
            };

            let rule_id = cap[2].to_string();
            let target = match cap.get(1).map(|m| m.as_str()) {
                Some("-file") => {
                    suppressed_file_rules.insert(rule_id.clone());
                    0
                }
                Some(_) => i + 2,
                None => i + 1,
            };

            if target > 0 {
                suppressed_lines
                    .entry(rule_id.clone())
                    .or_default()
                    .insert(target);
            }

            if let Some(reason) = cap.get(3) {
                reasons
                    .entry(rule_id)
                    .or_default()
                    .insert(target, reason.as_str().trim().to_string());
            }
        }

        (suppressed_lines, suppressed_file_rules, reasons)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Get the reason a rule was suppressed at a line
    pub fn suppression_reason(&self, rule_id: &str, line: usize) -> Option<&str> {
        [rule_id, "all"].iter().find_map(|id| {
            let by_line = self.reasons.get(*id)?;
            by_line.get(&line).or_else(|| by_line.get(&0)).map(String::as_str)
        })
    }

    fn suppressed_for(&self, rule_id: &str, line: usize) -> bool {
        self.suppressed_file_rules.contains(rule_id)
            || self
                .suppressed_lines
                .get(rule_id)
                .is_some_and(|lines| lines.contains(&line))
    }
}

impl CodeModel for TextModel {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn line(&self, line: usize) -> Option<&str> {
        self.lines.get(line.checked_sub(1)?).map(String::as_str)
    }

    fn replace_line(&mut self, line: usize, text: &str) -> bool {
        match line.checked_sub(1).and_then(|i| self.lines.get_mut(i)) {
            Some(slot) => {
                *slot = text.to_string();
                true
            }
            None => false,
        }
    }

    fn to_source(&self) -> String {
        let mut source = self.lines.join(self.line_ending);
        if self.trailing_newline {
            source.push_str(self.line_ending);
        }
        source
    }

    fn is_rule_suppressed(&self, rule_id: &str, line: usize) -> bool {
        self.suppressed_for(rule_id, line) || self.suppressed_for("all", line)
    }
}

/// Parser producing [`TextModel`]s
pub struct TextParser {
    id: String,
    name: Option<String>,
    extensions: Vec<String>,
    rules: Vec<Rule>,
}

impl TextParser {
    pub fn new(id: &str, extensions: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
            rules: Vec::new(),
        }
    }

    pub fn from_spec(spec: &AddInSpec) -> Self {
        let extensions: Vec<&str> = spec.extensions.iter().map(String::as_str).collect();
        Self::new(&spec.id, &extensions)
    }
}

impl AddIn for TextParser {
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
        _trusted: bool,
    ) -> Result<(), AddInError> {
        if primary {
            self.name = descriptor.name.clone();
        }
        for rule in &descriptor.rules {
            if !self.rules.iter().any(|r| r.id == rule.id) {
                self.rules.push(rule.clone().owned_by(&self.id));
            }
        }
        Ok(())
    }

    fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

impl Parser for TextParser {
    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn parse_file(
        &self,
        file: &SourceFile,
        _ctx: &FileContext<'_>,
    ) -> Result<ParseOutcome, AddInError> {
        match file.take_text() {
            Some(text) => {
                file.set_model(Box::new(TextModel::parse(&text)));
                Ok(ParseOutcome::Complete)
            }
            None if file.has_model() => Ok(ParseOutcome::Complete),
            None => Err(AddInError::Failed(format!(
                "No source text for {}",
                file.path().display()
            ))),
        }
    }
}
