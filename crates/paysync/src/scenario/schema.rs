//! Feature file schema.
//!
//! Feature files are YAML documents holding Gherkin-style step lines:
//!
//! ```yaml
//! feature: Payments
//! background:
//!   - Given login and access payments page
//! scenarios:
//!   - name: Pay with a data table
//!     tags: [smoke]
//!     steps:
//!       - step: When I make a payment with the following data
//!         table:
//!           - ACCOUNT: Main Account
//!             REFERENCE: "12345"
//!             ENTITY: "98765"
//!             AMOUNT: 100
//!             CATEGORY: Groceries
//!       - Then Verify confirmation window appears with payment details
//! ```
//!
//! Files ending in `.feature` are read as plain Gherkin instead. Their data
//! tables take the first row as the header, so each later row becomes one
//! map keyed by the header cells.

use crate::result::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Root of a feature file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    /// Feature name
    pub feature: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Steps run before every scenario
    #[serde(default)]
    pub background: Vec<StepSpec>,
    /// Scenarios, run in order
    pub scenarios: Vec<Scenario>,
}

/// One scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name
    pub name: String,
    /// Tags used for filtering
    #[serde(default)]
    pub tags: Vec<String>,
    /// Step lines
    pub steps: Vec<StepSpec>,
}

/// A step as written in the file: a bare line, or a line with a data table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepSpec {
    /// `- Given ...`
    Line(String),
    /// `- step: ...` with `table:` rows
    WithTable {
        /// Step line
        step: String,
        /// Data table rows; scalar cells of any YAML type
        #[serde(default)]
        table: Vec<BTreeMap<String, serde_yaml_ng::Value>>,
    },
}

/// Gherkin keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Keyword {
    /// Precondition
    Given,
    /// Action
    When,
    /// Outcome
    Then,
    /// Continues the previous keyword
    And,
    /// Continues the previous keyword
    But,
}

impl Keyword {
    fn split(line: &str) -> Option<(Self, &str)> {
        let (word, rest) = line.trim().split_once(char::is_whitespace)?;
        let keyword = match word {
            "Given" => Self::Given,
            "When" => Self::When,
            "Then" => Self::Then,
            "And" => Self::And,
            "But" => Self::But,
            _ => return None,
        };
        Some((keyword, rest.trim()))
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            Self::Given => "Given",
            Self::When => "When",
            Self::Then => "Then",
            Self::And => "And",
            Self::But => "But",
        };
        write!(f, "{word}")
    }
}

/// A normalised step: keyword, text after the keyword, string table cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Gherkin keyword
    pub keyword: Keyword,
    /// Text after the keyword
    pub text: String,
    /// Data table rows
    pub table: Vec<BTreeMap<String, String>>,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.keyword, self.text)
    }
}

fn cell_to_string(key: &str, value: &serde_yaml_ng::Value) -> SyncResult<String> {
    match value {
        serde_yaml_ng::Value::String(s) => Ok(s.clone()),
        serde_yaml_ng::Value::Number(n) => Ok(n.to_string()),
        serde_yaml_ng::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml_ng::Value::Null => Ok(String::new()),
        _ => Err(SyncError::scenario(format!(
            "table cell '{key}' must be a scalar"
        ))),
    }
}

impl StepSpec {
    /// The raw step line
    #[must_use]
    pub fn line(&self) -> &str {
        match self {
            Self::Line(line) | Self::WithTable { step: line, .. } => line,
        }
    }

    /// Split off the keyword and stringify table cells
    pub fn to_step(&self) -> SyncResult<Step> {
        let line = self.line();
        let (keyword, text) = Keyword::split(line).ok_or_else(|| {
            SyncError::scenario(format!(
                "step must start with Given/When/Then/And/But: '{line}'"
            ))
        })?;
        let table = match self {
            Self::Line(_) => Vec::new(),
            Self::WithTable { table, .. } => table
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|(k, v)| Ok((k.clone(), cell_to_string(k, v)?)))
                        .collect::<SyncResult<BTreeMap<_, _>>>()
                })
                .collect::<SyncResult<Vec<_>>>()?,
        };
        Ok(Step {
            keyword,
            text: text.to_string(),
            table,
        })
    }
}

fn gherkin_steps(steps: &[gherkin::Step]) -> SyncResult<Vec<StepSpec>> {
    steps
        .iter()
        .map(|step| {
            let line = format!("{} {}", step.keyword.trim(), step.value.trim());
            let Some(ref table) = step.table else {
                return Ok(StepSpec::Line(line));
            };
            let Some((header, rows)) = table.rows.split_first() else {
                return Ok(StepSpec::Line(line));
            };
            let table = rows
                .iter()
                .map(|row| {
                    if row.len() != header.len() {
                        return Err(SyncError::scenario(format!(
                            "table row of '{line}' has {} cells, header has {}",
                            row.len(),
                            header.len()
                        )));
                    }
                    Ok(header
                        .iter()
                        .zip(row)
                        .map(|(k, v)| (k.clone(), serde_yaml_ng::Value::String(v.clone())))
                        .collect::<BTreeMap<_, _>>())
                })
                .collect::<SyncResult<Vec<_>>>()?;
            Ok(StepSpec::WithTable { step: line, table })
        })
        .collect()
}

fn gherkin_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|t| t.trim_start_matches('@').to_string())
        .collect()
}

impl Feature {
    /// Parse a feature from Gherkin text
    pub fn from_gherkin(text: &str) -> SyncResult<Self> {
        let parsed = gherkin::Feature::parse(text, gherkin::GherkinEnv::default())
            .map_err(|e| SyncError::scenario(format!("invalid Gherkin: {e}")))?;
        if !parsed.rules.is_empty() {
            return Err(SyncError::scenario(format!(
                "feature '{}' uses Rule blocks, which are not supported",
                parsed.name
            )));
        }

        let feature_tags = gherkin_tags(&parsed.tags);
        let scenarios = parsed
            .scenarios
            .iter()
            .map(|scenario| {
                if !scenario.examples.is_empty() {
                    return Err(SyncError::scenario(format!(
                        "scenario '{}' is an outline; Examples are not supported",
                        scenario.name
                    )));
                }
                let mut tags = feature_tags.clone();
                tags.extend(gherkin_tags(&scenario.tags));
                Ok(Scenario {
                    name: scenario.name.clone(),
                    tags,
                    steps: gherkin_steps(&scenario.steps)?,
                })
            })
            .collect::<SyncResult<Vec<_>>>()?;

        let feature = Self {
            feature: parsed.name.clone(),
            description: parsed
                .description
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            background: match parsed.background {
                Some(ref background) => gherkin_steps(&background.steps)?,
                None => Vec::new(),
            },
            scenarios,
        };
        feature.ensure_scenarios()?;
        Ok(feature)
    }

    fn ensure_scenarios(&self) -> SyncResult<()> {
        if self.scenarios.is_empty() {
            return Err(SyncError::scenario(format!(
                "feature '{}' has no scenarios",
                self.feature
            )));
        }
        Ok(())
    }

    /// Parse a feature from YAML
    pub fn from_yaml(yaml: &str) -> SyncResult<Self> {
        let feature: Self = serde_yaml_ng::from_str(yaml)?;
        feature.ensure_scenarios()?;
        Ok(feature)
    }

    /// Read and parse a feature file; `.feature` files are Gherkin, anything
    /// else is YAML
    pub fn load(path: &Path) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::scenario(format!("cannot read {}: {e}", path.display()))
        })?;
        if path.extension().is_some_and(|ext| ext == "feature") {
            Self::from_gherkin(&text)
        } else {
            Self::from_yaml(&text)
        }
    }

    /// Scenarios carrying `tag`, or all of them when `tag` is `None`
    #[must_use]
    pub fn scenarios_tagged<'a>(&'a self, tag: Option<&'a str>) -> Vec<&'a Scenario> {
        self.scenarios
            .iter()
            .filter(|s| tag.map_or(true, |t| s.tags.iter().any(|x| x == t)))
            .collect()
    }
}
