//! Declarative pipeline stages understood by the log processor

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A `$record['a']['b']` style reference to a (possibly nested) record field
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecordAccessor {
    root: String,
    path: Vec<String>,
}

impl RecordAccessor {
    pub fn new(root: impl Into<String>, path: Vec<String>) -> RecordAccessor {
        RecordAccessor {
            root: root.into(),
            path,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }
}

impl fmt::Display for RecordAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.root)?;
        for part in &self.path {
            write!(f, "['{}']", part.replace('\'', "''"))?;
        }
        Ok(())
    }
}

impl Serialize for RecordAccessor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// What a condition looks at: a top-level temporary key or a record field
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    Key(String),
    Accessor(RecordAccessor),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Key(key) => f.write_str(key),
            Operand::Accessor(accessor) => write!(f, "{accessor}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Condition {
    KeyExists(Operand),
    KeyDoesNotExist(Operand),
    KeyValueMatches(Operand, String),
    KeyValueDoesNotMatch(Operand, String),
}

impl Condition {
    pub fn operand(&self) -> &Operand {
        match self {
            Condition::KeyExists(operand)
            | Condition::KeyDoesNotExist(operand)
            | Condition::KeyValueMatches(operand, _)
            | Condition::KeyValueDoesNotMatch(operand, _) => operand,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::KeyExists(operand) => write!(f, "Key_exists {operand}"),
            Condition::KeyDoesNotExist(operand) => write!(f, "Key_does_not_exist {operand}"),
            Condition::KeyValueMatches(operand, pattern) => {
                write!(f, "Key_value_matches {operand} {pattern}")
            }
            Condition::KeyValueDoesNotMatch(operand, pattern) => {
                write!(f, "Key_value_does_not_match {operand} {pattern}")
            }
        }
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Whether selected records are kept or dropped
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectMode {
    #[default]
    Include,
    Exclude,
}

impl SelectMode {
    /// Grep setting that realizes this mode
    pub fn grep_setting(self) -> &'static str {
        match self {
            SelectMode::Include => "Regex",
            SelectMode::Exclude => "Exclude",
        }
    }
}

impl fmt::Display for SelectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectMode::Include => f.write_str("include"),
            SelectMode::Exclude => f.write_str("exclude"),
        }
    }
}

/// One unit of work for the log processor, applied to records whose tag equals `match_tag`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum Stage {
    /// Moves every field matching `wildcard` under `nest_under`.
    Nest {
        match_tag: String,
        nest_under: String,
        wildcard: String,
    },
    /// Sets `destination_key` to `value` when every condition holds.
    ConditionalSet {
        match_tag: String,
        conditions: Vec<Condition>,
        destination_key: String,
        value: String,
    },
    /// Keeps (include) or drops (exclude) records whose `key` is set.
    Grep {
        match_tag: String,
        mode: SelectMode,
        key: String,
    },
    /// Removes every top-level key starting with `prefix`.
    RemoveWildcard { match_tag: String, prefix: String },
    /// Moves the fields under `nested_under` back to the top level.
    Lift {
        match_tag: String,
        nested_under: String,
    },
}

impl Stage {
    pub fn match_tag(&self) -> &str {
        match self {
            Stage::Nest { match_tag, .. }
            | Stage::ConditionalSet { match_tag, .. }
            | Stage::Grep { match_tag, .. }
            | Stage::RemoveWildcard { match_tag, .. }
            | Stage::Lift { match_tag, .. } => match_tag,
        }
    }

    /// Name of the log processor filter plugin that runs this stage
    pub fn plugin(&self) -> &'static str {
        match self {
            Stage::Nest { .. } | Stage::Lift { .. } => "nest",
            Stage::ConditionalSet { .. } | Stage::RemoveWildcard { .. } => "modify",
            Stage::Grep { .. } => "grep",
        }
    }

    /// Key of the temporary flag this stage writes, if any
    pub fn destination_key(&self) -> Option<&str> {
        match self {
            Stage::ConditionalSet {
                destination_key, ..
            } => Some(destination_key),
            _ => None,
        }
    }

    fn settings(&self) -> Vec<(&'static str, String)> {
        let mut settings = vec![
            ("Name", self.plugin().to_string()),
            ("Match", self.match_tag().to_string()),
        ];
        match self {
            Stage::Nest {
                nest_under,
                wildcard,
                ..
            } => {
                settings.push(("Operation", "nest".to_string()));
                settings.push(("Wildcard", wildcard.clone()));
                settings.push(("Nest_under", nest_under.clone()));
            }
            Stage::ConditionalSet {
                conditions,
                destination_key,
                value,
                ..
            } => {
                for condition in conditions {
                    settings.push(("Condition", condition.to_string()));
                }
                settings.push(("Set", format!("{destination_key} {value}")));
            }
            Stage::Grep { mode, key, .. } => {
                settings.push((mode.grep_setting(), format!("{key} 1")));
            }
            Stage::RemoveWildcard { prefix, .. } => {
                settings.push(("Remove_wildcard", prefix.clone()));
            }
            Stage::Lift { nested_under, .. } => {
                settings.push(("Operation", "lift".to_string()));
                settings.push(("Nested_under", nested_under.clone()));
            }
        }
        settings
    }
}

impl fmt::Display for Stage {
    /// Renders the stage as a `[FILTER]` section with aligned keys.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settings = self.settings();
        let width = settings.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        writeln!(f, "[FILTER]")?;
        for (key, value) in &settings {
            writeln!(f, "    {key:<width$} {value}")?;
        }
        Ok(())
    }
}

/// Renders stages as consecutive `[FILTER]` sections.
pub fn render_sections(stages: &[Stage]) -> String {
    stages
        .iter()
        .map(|stage| stage.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
