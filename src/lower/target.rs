//! Mapping of filter fields onto processor record fields

use super::stage::RecordAccessor;
use crate::config::LoweringConfig;
use crate::filter::escape::lua_quote;
use crate::filter::{FilterError, Member};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Characters a record accessor segment cannot carry
const FORBIDDEN: &[char] = &['\n', '\r', '"', ',', ' '];

/// How log entry fields are laid out in processor records.
///
/// Value roots are single fields renamed as a whole (`severity`), struct
/// roots are maps whose nested fields keep their names (`labels.x`), and the
/// payload root disappears (`jsonPayload.x` is the record field `x`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub payload_root: String,
    pub value_roots: BTreeMap<String, String>,
    pub struct_roots: BTreeMap<String, String>,
    /// Fields under any other root are used as written; when false they are rejected.
    pub passthrough_unknown: bool,
}

impl Default for FieldMapping {
    fn default() -> Self {
        let value_roots = [("severity", "logging.googleapis.com/severity")];
        let struct_roots = [
            ("labels", "logging.googleapis.com/labels"),
            ("operation", "logging.googleapis.com/operation"),
            ("sourceLocation", "logging.googleapis.com/sourceLocation"),
            ("httpRequest", "logging.googleapis.com/http_request"),
        ];
        Self {
            payload_root: "jsonPayload".to_string(),
            value_roots: value_roots
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            struct_roots: struct_roots
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            passthrough_unknown: true,
        }
    }
}

impl FieldMapping {
    /// Path of the record field that `member` refers to, checked for use in a record accessor.
    pub fn resolve(&self, member: &Member) -> Result<Vec<String>, FilterError> {
        let path = self.path(member)?;
        if path.iter().any(|part| part.contains(FORBIDDEN)) {
            return Err(invalid_target(
                member,
                "may not contain line breaks, spaces, commas, or double-quotes",
            ));
        }
        Ok(path)
    }

    /// Path of the record field that `member` refers to, with any characters.
    pub fn path(&self, member: &Member) -> Result<Vec<String>, FilterError> {
        let segments = member.segments();
        let (root, rest) = (&segments[0], &segments[1..]);
        let invalid = |reason: &str| invalid_target(member, reason);

        let path = if let Some(mapped) = self.value_roots.get(root) {
            if !rest.is_empty() {
                return Err(invalid("field has no nested fields"));
            }
            vec![mapped.clone()]
        } else if let Some(mapped) = self.struct_roots.get(root) {
            if rest.is_empty() {
                return Err(invalid("must name a field inside the structure"));
            }
            std::iter::once(mapped.clone()).chain(rest.iter().cloned()).collect()
        } else if *root == self.payload_root {
            if rest.is_empty() {
                return Err(invalid("must name a field inside the payload"));
            }
            rest.to_vec()
        } else if self.passthrough_unknown {
            segments.to_vec()
        } else {
            return Err(invalid("unknown field"));
        };
        Ok(path)
    }
}

fn invalid_target(member: &Member, reason: &str) -> FilterError {
    FilterError::InvalidTarget {
        field: member.to_string(),
        reason: reason.to_string(),
    }
}

impl Member {
    /// Record accessor for this field once records are nested under the configured key.
    pub fn record_accessor(&self, config: &LoweringConfig) -> Result<RecordAccessor, FilterError> {
        let path = config.fields.resolve(self)?;
        Ok(RecordAccessor::new(config.nest_key.clone(), path))
    }

    /// Lua function expression reading this field from `record`, or writing
    /// it when `write` is set.
    ///
    /// The field is addressed as the processor sees it, before any nesting.
    /// Reading returns `nil` when an enclosing table is missing, writing
    /// creates the missing tables.
    pub fn lua_accessor(&self, write: bool, config: &LoweringConfig) -> Result<String, FilterError> {
        let path: Vec<String> = config
            .fields
            .path(self)?
            .iter()
            .map(|part| lua_quote(part))
            .collect();

        let mut out = String::from(if write { "(function(value)\n" } else { "(function()\n" });
        for depth in 1..path.len() {
            let table = path[..depth].join("][");
            out.push_str(&format!("if record[{table}] == nil\nthen\n"));
            if write {
                out.push_str(&format!("record[{table}] = {{}}\n"));
            } else {
                out.push_str("return nil\n");
            }
            out.push_str("end\n");
        }
        let field = path.join("][");
        if write {
            out.push_str(&format!("record[{field}] = value\nend)"));
        } else {
            out.push_str(&format!("return record[{field}]\nend)"));
        }
        Ok(out)
    }
}
