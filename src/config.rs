use crate::filter::{Filter, FilterError};
use crate::lower::{FieldMapping, SelectMode, Stage, named_selection_stages};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid filter '{name}' in pipeline '{tag}': {source}")]
    InvalidFilter {
        tag: String,
        name: String,
        #[source]
        source: FilterError,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub lowering: LoweringConfig,
    pub pipelines: Vec<PipelineConfig>,
}

/// Knobs of the lowering engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoweringConfig {
    /// Key the record fields are nested under while filters run.
    pub nest_key: String,
    /// Prefix of every temporary flag key.
    pub match_prefix: String,
    pub fields: FieldMapping,
}

impl Default for LoweringConfig {
    fn default() -> Self {
        Self {
            nest_key: "record".to_string(),
            match_prefix: "__match".to_string(),
            fields: FieldMapping::default(),
        }
    }
}

/// Filters applied to records of one tag
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tag: String,
    pub mode: SelectMode,
    /// Filter name to filter text; a record is selected when any filter matches.
    pub filters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompiledPipeline {
    pub tag: String,
    pub mode: SelectMode,
    pub filters: BTreeMap<String, Filter>,
    pub stages: Vec<Stage>,
}

impl PipelineConfig {
    pub fn parse_filters(&self) -> Result<BTreeMap<String, Filter>, ConfigError> {
        self.filters
            .iter()
            .map(|(name, text)| {
                Filter::parse(text)
                    .map(|filter| (name.clone(), filter))
                    .map_err(|source| self.invalid(name, source))
            })
            .collect()
    }

    fn invalid(&self, name: &str, source: FilterError) -> ConfigError {
        ConfigError::InvalidFilter {
            tag: self.tag.clone(),
            name: name.to_string(),
            source,
        }
    }
}

impl CompilerConfig {
    /// Parses and lowers the filters of every pipeline.
    pub fn compile(&self) -> Result<Vec<CompiledPipeline>, ConfigError> {
        self.pipelines
            .iter()
            .map(|pipeline| {
                let filters = pipeline.parse_filters()?;
                let stages =
                    named_selection_stages(&pipeline.tag, &filters, pipeline.mode, &self.lowering)
                        .map_err(|(name, source)| pipeline.invalid(name, source))?;
                log::info!(
                    "compiled pipeline '{}' ({} filters, {} stages)",
                    pipeline.tag,
                    filters.len(),
                    stages.len()
                );
                Ok(CompiledPipeline {
                    tag: pipeline.tag.clone(),
                    mode: pipeline.mode,
                    filters,
                    stages,
                })
            })
            .collect()
    }
}

pub fn load_config(path: Option<&Path>) -> Result<CompilerConfig, ConfigError> {
    if let Some(path) = path {
        load_config_from_path(path)
    } else {
        Ok(default_config().clone())
    }
}

pub fn load_config_from_path(path: &Path) -> Result<CompilerConfig, ConfigError> {
    let path_display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path_display.clone(),
        source,
    })?;

    toml::from_str::<CompilerConfig>(&raw).map_err(|source| ConfigError::Parse {
        path: path_display,
        source,
    })
}

pub fn default_config() -> &'static CompilerConfig {
    static DEFAULT_CONFIG: LazyLock<CompilerConfig> = LazyLock::new(CompilerConfig::default);
    &DEFAULT_CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[lowering]
nest_key = "body"

[lowering.fields]
passthrough_unknown = false

[[pipelines]]
tag = "syslog"
mode = "exclude"

[pipelines.filters]
noisy = 'jsonPayload.message : "health check"'
debug = "severity = DEBUG"
"#;

    #[test]
    fn test_defaults() {
        let config = default_config();
        assert_eq!(config.lowering.nest_key, "record");
        assert_eq!(config.lowering.match_prefix, "__match");
        assert_eq!(config.lowering.fields.payload_root, "jsonPayload");
        assert!(config.pipelines.is_empty());
    }

    #[test]
    fn test_parse_partial_config() {
        let config: CompilerConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.lowering.nest_key, "body");
        assert_eq!(config.lowering.match_prefix, "__match");
        assert!(!config.lowering.fields.passthrough_unknown);
        assert_eq!(
            config.lowering.fields.value_roots["severity"],
            "logging.googleapis.com/severity"
        );
        assert_eq!(config.pipelines[0].mode, SelectMode::Exclude);
        assert_eq!(config.pipelines[0].filters.len(), 2);
    }

    #[test]
    fn test_compile() {
        let config: CompilerConfig = toml::from_str(SAMPLE).unwrap();
        let compiled = config.compile().unwrap();
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].tag, "syslog");
        assert!(matches!(
            &compiled[0].stages[0],
            Stage::Nest { nest_under, .. } if nest_under == "body"
        ));
    }

    #[test]
    fn test_compile_reports_bad_filter() {
        let mut config = CompilerConfig::default();
        config.pipelines.push(PipelineConfig {
            tag: "app".to_string(),
            mode: SelectMode::Include,
            filters: BTreeMap::from([("broken".to_string(), "a = (".to_string())]),
        });
        let err = config.compile().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFilter { ref name, .. } if name == "broken"));
        assert!(err.to_string().contains("pipeline 'app'"));
    }

    #[test]
    fn test_compile_names_the_filter_that_fails() {
        let mut config = CompilerConfig::default();
        config.pipelines.push(PipelineConfig {
            tag: "app".to_string(),
            mode: SelectMode::Exclude,
            filters: BTreeMap::from([
                ("a_fine".to_string(), "severity = ERROR".to_string()),
                ("b_numeric".to_string(), "jsonPayload.latency > 5".to_string()),
            ]),
        });
        let err = config.compile().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFilter { ref name, .. } if name == "b_numeric"));
    }

    #[test]
    fn test_compile_reports_unsupported_operator() {
        let mut config = CompilerConfig::default();
        config.pipelines.push(PipelineConfig {
            tag: "app".to_string(),
            mode: SelectMode::Include,
            filters: BTreeMap::from([("numeric".to_string(), "a.b < 5".to_string())]),
        });
        let err = config.compile().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidFilter { source: FilterError::UnsupportedOperator(_), .. }
        ));
    }
}
