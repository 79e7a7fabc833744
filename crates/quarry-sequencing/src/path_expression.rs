//! Path expressions: rules that select changed properties and say where a
//! processor writes its output.
//!
//! A rule has the textual form `"<selection> => <output>"`, for example
//! `"/docs/*/@content => /derived/$1"`. Selections are matched against the
//! synthetic path `<node path>/@<property name>`.
//!
//! Selection syntax:
//!
//! - `*` matches one path segment (no `/`) and captures it
//! - `**` matches any run of characters, including `/`, and captures it
//! - `@name` or `@*` addresses the property; without a property segment the
//!   pattern applies to every property of the selected nodes
//! - everything else is literal
//!
//! Captures are numbered from 1 in the order they appear; `$0` is the whole
//! matched path. The output template uses `$n` or `${n}`, `$$` for a literal
//! dollar sign, and may start with `workspace:` to write into another
//! workspace.

use crate::error::RuleError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between the selection pattern and the output template.
pub use quarry_config::RULE_SEPARATOR;

/// A compiled selection pattern plus output template.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathExpression {
    selection: String,
    output: String,
    regex: Regex,
    groups: usize,
    template: Vec<TemplatePart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplatePart {
    Literal(String),
    Group(usize),
}

impl PathExpression {
    /// Compile a rule from its selection pattern and output template.
    pub fn new(selection: impl Into<String>, output: impl Into<String>) -> Result<Self, RuleError> {
        let selection = selection.into().trim().to_string();
        let output = output.into().trim().to_string();

        let (regex, groups) = compile_selection(&selection)?;
        let template = parse_template(&output, groups)?;

        Ok(Self {
            selection,
            output,
            regex,
            groups,
            template,
        })
    }

    /// The selection pattern as written.
    pub fn selection(&self) -> &str {
        &self.selection
    }

    /// The output template as written.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Number of numbered captures in the selection.
    pub fn group_count(&self) -> usize {
        self.groups
    }

    /// Whether the synthetic property path is selected by this rule.
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Match a synthetic property path and compute the output location.
    ///
    /// Returns `Ok(None)` when the path is not selected and `Err` when it is
    /// selected but the substituted output is not a usable node path.
    pub fn matches(&self, path: &str, workspace: &str) -> Result<Option<OutputLocation>, RuleError> {
        let Some(captures) = self.regex.captures(path) else {
            return Ok(None);
        };

        let mut resolved = String::with_capacity(self.output.len() + path.len());
        for part in &self.template {
            match part {
                TemplatePart::Literal(text) => resolved.push_str(text),
                TemplatePart::Group(index) => {
                    if let Some(value) = captures.get(*index) {
                        resolved.push_str(value.as_str());
                    }
                }
            }
        }

        OutputLocation::parse(&resolved, workspace).map(Some)
    }
}

/// Build the synthetic path a rule is matched against.
pub fn property_path(node_path: &str, property: &str) -> String {
    format!("{}/@{}", node_path.trim_end_matches('/'), property)
}

fn compile_selection(pattern: &str) -> Result<(Regex, usize), RuleError> {
    let invalid = |reason: &str| RuleError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if !pattern.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }

    let (node_part, property_part) = match pattern.rfind("/@") {
        Some(i) if !pattern[i + 2..].contains('/') => (&pattern[..i], Some(&pattern[i + 2..])),
        _ => (pattern.trim_end_matches('/'), None),
    };

    let mut groups = 0;
    let mut source = String::from("^");
    translate_glob(node_part, &mut source, &mut groups);
    match property_part {
        Some("") => return Err(invalid("empty property name after '@'")),
        Some(property) => {
            source.push_str("/@");
            translate_glob(property, &mut source, &mut groups);
        }
        None => source.push_str("/@[^/]+"),
    }
    source.push('$');

    let regex = Regex::new(&source).map_err(|e| invalid(&e.to_string()))?;
    Ok((regex, groups))
}

fn translate_glob(glob: &str, out: &mut String, groups: &mut usize) {
    let mut chars = glob.chars().peekable();
    let mut literal = String::new();

    while let Some(c) = chars.next() {
        if c != '*' {
            literal.push(c);
            continue;
        }

        out.push_str(&regex::escape(&literal));
        literal.clear();
        *groups += 1;

        if chars.peek() == Some(&'*') {
            chars.next();
            out.push_str("(.*)");
        } else {
            out.push_str("([^/]+)");
        }
    }

    out.push_str(&regex::escape(&literal));
}

fn parse_template(template: &str, groups: usize) -> Result<Vec<TemplatePart>, RuleError> {
    let invalid = |reason: &str| RuleError::InvalidTemplate {
        template: template.to_string(),
        reason: reason.to_string(),
    };

    if template.is_empty() {
        return Err(invalid("template is empty"));
    }

    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            literal.push(c);
            continue;
        }

        let braced = match chars.peek() {
            Some('$') => {
                chars.next();
                literal.push('$');
                continue;
            }
            Some('{') => {
                chars.next();
                true
            }
            Some(d) if d.is_ascii_digit() => false,
            _ => return Err(invalid("'$' must be followed by a group number, '{' or '$'")),
        };

        let mut digits = String::new();
        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(d);
            chars.next();
        }
        if braced && chars.next() != Some('}') {
            return Err(invalid("unterminated '${'"));
        }

        let group: usize = digits
            .parse()
            .map_err(|_| invalid("placeholder without a group number"))?;
        if group > groups {
            return Err(RuleError::UnknownGroup {
                template: template.to_string(),
                group,
                available: groups,
            });
        }

        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
        }
        parts.push(TemplatePart::Group(group));
    }

    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(literal));
    }
    Ok(parts)
}

impl FromStr for PathExpression {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(RULE_SEPARATOR) {
            Some((selection, output)) if !selection.trim().is_empty() && !output.trim().is_empty() => {
                Self::new(selection, output)
            }
            _ => Err(RuleError::MissingSeparator(s.to_string())),
        }
    }
}

impl TryFrom<String> for PathExpression {
    type Error = RuleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PathExpression> for String {
    fn from(expression: PathExpression) -> Self {
        expression.to_string()
    }
}

impl PartialEq for PathExpression {
    fn eq(&self, other: &Self) -> bool {
        self.selection == other.selection && self.output == other.output
    }
}

impl Eq for PathExpression {}

impl std::hash::Hash for PathExpression {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.selection.hash(state);
        self.output.hash(state);
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.selection, RULE_SEPARATOR, self.output)
    }
}

impl fmt::Debug for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathExpression").field(&self.to_string()).finish()
    }
}

/// A workspace-qualified node path where a processor writes derived content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputLocation {
    workspace: String,
    path: String,
}

impl OutputLocation {
    /// Parse `[workspace:]/absolute/path`, defaulting to `default_workspace`.
    pub fn parse(text: &str, default_workspace: &str) -> Result<Self, RuleError> {
        let invalid = || RuleError::InvalidOutputPath(text.to_string());

        let (workspace, path) = if text.starts_with('/') {
            (default_workspace, text)
        } else {
            match text.split_once(':') {
                Some((workspace, path))
                    if !workspace.is_empty() && !workspace.contains('/') && path.starts_with('/') =>
                {
                    (workspace, path)
                }
                _ => return Err(invalid()),
            }
        };

        let path = if path.len() > 1 { path.trim_end_matches('/') } else { path };
        let path = if path.is_empty() { "/" } else { path };

        if path != "/" {
            let valid = path[1..]
                .split('/')
                .all(|segment| !segment.is_empty() && segment != "." && segment != ".." && !segment.starts_with('@'));
            if !valid {
                return Err(invalid());
            }
        }

        Ok(Self {
            workspace: workspace.to_string(),
            path: path.to_string(),
        })
    }

    /// Workspace to write into.
    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    /// Absolute node path inside the workspace.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for OutputLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.workspace, self.path)
    }
}
