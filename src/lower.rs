//! Lowering of filter expressions into processor pipeline stages
//!
//! Each expression node sets a temporary flag key when a record satisfies
//! it. Records are first nested under a single key so that flags never
//! collide with record fields, and the flags are removed again before the
//! record is lifted back.

pub mod simulate;
pub mod stage;
pub mod target;

pub use stage::{Condition, Operand, RecordAccessor, SelectMode, Stage, render_sections};
pub use target::FieldMapping;

use crate::config::LoweringConfig;
use crate::filter::escape::escape_whitespace;
use crate::filter::{Comparison, Expression, Filter, FilterError, Operator, Restriction};
use std::collections::BTreeMap;

/// Makes a tag usable inside a key.
///
/// ASCII letters and digits are kept. Other characters up to U+00FF become
/// `_` and two hex digits, anything above becomes `_u` and six hex digits.
/// The escapes are fixed width, so distinct tags always give distinct keys.
pub fn sanitize_tag(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len());
    for c in tag.chars() {
        match c as u32 {
            _ if c.is_ascii_alphanumeric() => out.push(c),
            code @ 0..=0xff => out.push_str(&format!("_{code:02x}")),
            code => out.push_str(&format!("_u{code:06x}")),
        }
    }
    out
}

/// Key of the `index`-th child of the node writing `key`
pub fn sub_key(key: &str, index: usize) -> String {
    format!("{key}_{index}")
}

/// Lowers expressions for records of one tag.
pub struct Lowering<'a> {
    tag: &'a str,
    config: &'a LoweringConfig,
}

impl<'a> Lowering<'a> {
    pub fn new(tag: &'a str, config: &'a LoweringConfig) -> Lowering<'a> {
        Lowering { tag, config }
    }

    pub fn tag(&self) -> &str {
        self.tag
    }

    /// Prefix shared by every temporary key this tag uses
    pub fn match_key(&self) -> String {
        format!("{}_{}", self.config.match_prefix, sanitize_tag(self.tag))
    }

    /// Stages that leave `key` set on exactly the records matching `expr`.
    pub fn lower(&self, expr: &Expression, key: &str) -> Result<Vec<Stage>, FilterError> {
        let mut stages = Vec::new();
        self.lower_into(expr, key, &mut stages)?;
        Ok(stages)
    }

    fn lower_into(
        &self,
        expr: &Expression,
        key: &str,
        stages: &mut Vec<Stage>,
    ) -> Result<(), FilterError> {
        match expr {
            Expression::Restriction(restriction) => {
                let condition = self.restriction_condition(restriction)?;
                stages.push(self.set(key, vec![condition]));
            }
            Expression::Conjunction(items) => {
                let mut conditions = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let child = sub_key(key, i);
                    self.lower_into(item, &child, stages)?;
                    conditions.push(Condition::KeyExists(Operand::Key(child)));
                }
                stages.push(self.set(key, conditions));
            }
            Expression::Disjunction(items) => {
                // children must not write `key` themselves, nested nodes would clash
                let mut children = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let child = sub_key(key, i);
                    self.lower_into(item, &child, stages)?;
                    children.push(child);
                }
                for child in children {
                    stages.push(self.set(key, vec![Condition::KeyExists(Operand::Key(child))]));
                }
            }
            Expression::Negation(inner) => {
                let child = sub_key(key, 0);
                self.lower_into(inner, &child, stages)?;
                stages.push(self.set(key, vec![Condition::KeyDoesNotExist(Operand::Key(child))]));
            }
        }
        Ok(())
    }

    fn restriction_condition(&self, restriction: &Restriction) -> Result<Condition, FilterError> {
        if let Some(Comparison { operator, .. }) = &restriction.comparison {
            if !operator.is_implemented() {
                return Err(FilterError::UnsupportedOperator(*operator));
            }
        }

        let lhs = Operand::Accessor(restriction.member.record_accessor(self.config)?);
        let Some(Comparison { operator, value }) = &restriction.comparison else {
            return Ok(Condition::KeyExists(lhs));
        };

        let condition = match operator {
            Operator::Has => {
                let literal = escape_whitespace(&regex::escape(&value.literal()?));
                Condition::KeyValueMatches(lhs, format!(".*{literal}.*"))
            }
            Operator::Equals => {
                let literal = escape_whitespace(&regex::escape(&value.literal()?));
                Condition::KeyValueMatches(lhs, format!("(?i)^{literal}$"))
            }
            Operator::NotEquals => {
                let literal = escape_whitespace(&regex::escape(&value.literal()?));
                Condition::KeyValueDoesNotMatch(lhs, format!("(?i)^{literal}$"))
            }
            Operator::Matches => Condition::KeyValueMatches(lhs, escape_whitespace(value.pattern())),
            Operator::NotMatches => {
                Condition::KeyValueDoesNotMatch(lhs, escape_whitespace(value.pattern()))
            }
            other => return Err(FilterError::UnsupportedOperator(*other)),
        };
        Ok(condition)
    }

    fn set(&self, key: &str, conditions: Vec<Condition>) -> Stage {
        Stage::ConditionalSet {
            match_tag: self.tag.to_string(),
            conditions,
            destination_key: key.to_string(),
            value: "1".to_string(),
        }
    }

    fn nest(&self) -> Stage {
        Stage::Nest {
            match_tag: self.tag.to_string(),
            nest_under: self.config.nest_key.clone(),
            wildcard: "*".to_string(),
        }
    }

    fn teardown(&self) -> Vec<Stage> {
        vec![
            Stage::RemoveWildcard {
                match_tag: self.tag.to_string(),
                prefix: self.match_key(),
            },
            Stage::Lift {
                match_tag: self.tag.to_string(),
                nested_under: self.config.nest_key.clone(),
            },
        ]
    }
}

/// Stages that keep (or drop) records of `tag` matching any of `filters`.
///
/// One nest/lift pair wraps all filters. No filters means no stages.
pub fn selection_stages(
    tag: &str,
    filters: &[Filter],
    mode: SelectMode,
    config: &LoweringConfig,
) -> Result<Vec<Stage>, FilterError> {
    build_selection(tag, filters.iter().enumerate(), mode, config).map_err(|(_, e)| e)
}

/// Same as [`selection_stages`] for named filters. A failure comes back with
/// the name of the filter that could not be lowered.
pub fn named_selection_stages<'n>(
    tag: &str,
    filters: &'n BTreeMap<String, Filter>,
    mode: SelectMode,
    config: &LoweringConfig,
) -> Result<Vec<Stage>, (&'n str, FilterError)> {
    build_selection(
        tag,
        filters.iter().map(|(name, filter)| (name.as_str(), filter)),
        mode,
        config,
    )
}

fn build_selection<'f, K>(
    tag: &str,
    filters: impl IntoIterator<Item = (K, &'f Filter)>,
    mode: SelectMode,
    config: &LoweringConfig,
) -> Result<Vec<Stage>, (K, FilterError)> {
    let lowering = Lowering::new(tag, config);
    let match_key = lowering.match_key();
    let mut stages = vec![lowering.nest()];

    for (i, (id, filter)) in filters.into_iter().enumerate() {
        let key = sub_key(&match_key, i);
        let inner = match lowering.lower(filter.expression(), &key) {
            Ok(inner) => inner,
            Err(e) => return Err((id, e)),
        };
        log::debug!("lowered `{filter}` for tag {tag} into {} stages", inner.len());
        stages.extend(inner);
        stages.push(lowering.set(&match_key, vec![Condition::KeyExists(Operand::Key(key))]));
    }

    // only the nest stage means there was nothing to select on
    if stages.len() == 1 {
        return Ok(Vec::new());
    }
    stages.push(Stage::Grep {
        match_tag: tag.to_string(),
        mode,
        key: match_key,
    });
    stages.extend(lowering.teardown());
    Ok(stages)
}

/// Stages computing one flag per named filter, for callers that act on the flags themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSetStages {
    /// Nest plus the stages setting every result key
    pub setup: Vec<Stage>,
    /// Filter name to the key that is set when the filter matches
    pub results: BTreeMap<String, String>,
    /// Removes the temporary keys and lifts the record back
    pub teardown: Vec<Stage>,
}

impl FilterSetStages {
    /// Setup, then the caller's stages, then teardown
    pub fn wrap(&self, body: impl IntoIterator<Item = Stage>) -> Vec<Stage> {
        let mut stages = self.setup.clone();
        stages.extend(body);
        stages.extend(self.teardown.iter().cloned());
        stages
    }
}

pub fn filter_set_stages(
    tag: &str,
    filters: &BTreeMap<String, Filter>,
    config: &LoweringConfig,
) -> Result<FilterSetStages, FilterError> {
    let lowering = Lowering::new(tag, config);
    let match_key = lowering.match_key();
    let mut setup = vec![lowering.nest()];
    let mut results = BTreeMap::new();

    for (i, (name, filter)) in filters.iter().enumerate() {
        let key = sub_key(&match_key, i);
        setup.extend(lowering.lower(filter.expression(), &key)?);
        results.insert(name.clone(), key);
    }

    Ok(FilterSetStages {
        setup,
        results,
        teardown: lowering.teardown(),
    })
}
