//! Reference executor for stage lists
//!
//! Applies stages to a single JSON record the way the log processor would,
//! so lowered filters can be checked without running the processor.

use super::stage::{Condition, Operand, SelectMode, Stage};
use crate::filter::FilterError;
use regex::Regex;
use serde_json::{Map, Value};

pub type Record = Map<String, Value>;

/// Runs `stages` on a record tagged `tag`.
///
/// Returns `None` when a grep stage drops the record. Stages for other tags are skipped.
pub fn run(stages: &[Stage], tag: &str, mut record: Record) -> Result<Option<Record>, FilterError> {
    for stage in stages.iter().filter(|stage| stage.match_tag() == tag) {
        match stage {
            Stage::Nest {
                nest_under,
                wildcard,
                ..
            } => nest(&mut record, nest_under, wildcard),
            Stage::ConditionalSet {
                conditions,
                destination_key,
                value,
                ..
            } => {
                let mut holds = true;
                for condition in conditions {
                    if !evaluate(&record, condition)? {
                        holds = false;
                        break;
                    }
                }
                if holds {
                    record.insert(destination_key.clone(), Value::String(value.clone()));
                }
            }
            Stage::Grep { mode, key, .. } => {
                let flagged = match record.get(key) {
                    Some(value) => matches(value, "1")?,
                    None => false,
                };
                let keep = match mode {
                    SelectMode::Include => flagged,
                    SelectMode::Exclude => !flagged,
                };
                if !keep {
                    log::trace!("record dropped by grep on {key}");
                    return Ok(None);
                }
            }
            Stage::RemoveWildcard { prefix, .. } => {
                record.retain(|key, _| !key.starts_with(prefix.as_str()));
            }
            Stage::Lift { nested_under, .. } => {
                if let Some(Value::Object(inner)) = record.remove(nested_under) {
                    record.extend(inner);
                }
            }
        }
    }
    Ok(Some(record))
}

fn wildcard_matches(wildcard: &str, key: &str) -> bool {
    match wildcard.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == wildcard,
    }
}

fn nest(record: &mut Record, nest_under: &str, wildcard: &str) {
    let keys: Vec<String> = record
        .keys()
        .filter(|key| wildcard_matches(wildcard, key))
        .cloned()
        .collect();
    let mut nested = Map::new();
    for key in keys {
        if let Some(value) = record.remove(&key) {
            nested.insert(key, value);
        }
    }
    record.insert(nest_under.to_string(), Value::Object(nested));
}

fn lookup<'r>(record: &'r Record, operand: &Operand) -> Option<&'r Value> {
    match operand {
        Operand::Key(key) => record.get(key),
        Operand::Accessor(accessor) => {
            let mut value = record.get(accessor.root())?;
            for part in accessor.path() {
                value = value.as_object()?.get(part)?;
            }
            Some(value)
        }
    }
}

fn matches(value: &Value, pattern: &str) -> Result<bool, FilterError> {
    let regex = Regex::new(pattern).map_err(|source| FilterError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })?;
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return Ok(false),
    };
    Ok(regex.is_match(&text))
}

fn evaluate(record: &Record, condition: &Condition) -> Result<bool, FilterError> {
    let value = lookup(record, condition.operand());
    match condition {
        Condition::KeyExists(_) => Ok(value.is_some()),
        Condition::KeyDoesNotExist(_) => Ok(value.is_none()),
        Condition::KeyValueMatches(_, pattern) => match value {
            Some(value) => matches(value, pattern),
            None => Ok(false),
        },
        // the key has to exist for a mismatch to count
        Condition::KeyValueDoesNotMatch(_, pattern) => match value {
            Some(value) => Ok(!matches(value, pattern)?),
            None => Ok(false),
        },
    }
}
