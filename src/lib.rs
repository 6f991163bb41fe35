pub mod cli;
pub mod config;
pub mod filter;
pub mod lower;

pub use cli::{ColorMode, Commands, Mode, OutputFormat, cli_parse};
pub use config::{CompiledPipeline, CompilerConfig, ConfigError, LoweringConfig, load_config};
pub use filter::{Expression, Filter, FilterError, Member, lua_quote, render};
pub use lower::{
    FilterSetStages, Lowering, RecordAccessor, SelectMode, Stage, filter_set_stages,
    named_selection_stages, render_sections, selection_stages,
};

use anyhow::{Context, Result, bail};
use colored::Colorize;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use serde::Serialize;
use serde_json::json;
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeMap;
use std::path::Path;

/// Tag given to the record under test by `eval`
const EVAL_TAG: &str = "eval";

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        log::LevelFilter::Error
    } else {
        match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    // RUST_LOG still wins over the flags
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

fn write_output_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write output file '{}'", path.display()))
}

/// Prints `text` and mirrors it to the output file, if any.
fn emit(output: Option<&Path>, text: &str) -> Result<()> {
    print!("{text}");
    if let Some(path) = output {
        write_output_file(path, text)?;
    }
    Ok(())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    text.push('\n');
    Ok(text)
}

/// Computes a colored line diff between two texts
pub fn compute_text_diff(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut result = String::new();

    for change in diff.iter_all_changes() {
        let line = change.to_string();
        let line = line.trim_end_matches('\n');
        let formatted = match change.tag() {
            ChangeTag::Delete => format!("{}\n", format!("-{line}").red()),
            ChangeTag::Insert => format!("{}\n", format!("+{line}").green()),
            ChangeTag::Equal => format!(" {line}\n"),
        };
        result.push_str(&formatted);
    }

    result
}

fn styled_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.to_vec());
    table
}

fn parse_filters(texts: &[String]) -> Result<Vec<Filter>> {
    texts
        .iter()
        .map(|text| {
            Filter::parse(text).with_context(|| format!("Invalid filter expression '{text}'"))
        })
        .collect()
}

fn check_filters(texts: &[String], format: OutputFormat, output: Option<&Path>) -> Result<()> {
    let results: Vec<(&String, std::result::Result<Filter, FilterError>)> = texts
        .iter()
        .map(|text| (text, Filter::parse(text)))
        .collect();
    let invalid = results.iter().filter(|(_, result)| result.is_err()).count();

    let text = match format {
        OutputFormat::Text => {
            let mut out = String::new();
            for (input, result) in &results {
                let line = match result {
                    Ok(filter) => format!("{} {}\n", "ok".green().bold(), filter),
                    Err(e) => format!("{} {}: {}\n", "error".red().bold(), input, e),
                };
                out.push_str(&line);
            }
            out
        }
        OutputFormat::Json => {
            let entries: Vec<serde_json::Value> = results
                .iter()
                .map(|(input, result)| match result {
                    Ok(filter) => json!({"input": input, "valid": true, "canonical": filter}),
                    Err(e) => json!({"input": input, "valid": false, "error": e.to_string()}),
                })
                .collect();
            to_json(&entries)?
        }
    };
    emit(output, &text)?;

    if invalid > 0 {
        bail!("{invalid} of {} filters are invalid", texts.len());
    }
    Ok(())
}

fn format_filter(
    text: &str,
    check: bool,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<()> {
    let filter = Filter::parse(text).with_context(|| format!("Invalid filter expression '{text}'"))?;
    let canonical = render(&filter);
    let changed = canonical != text;

    let out = match format {
        OutputFormat::Text if check && changed => {
            compute_text_diff(&format!("{text}\n"), &format!("{canonical}\n"))
        }
        OutputFormat::Text => format!("{canonical}\n"),
        OutputFormat::Json => to_json(&json!({
            "input": text,
            "canonical": canonical,
            "changed": changed,
        }))?,
    };
    emit(output, &out)?;

    if check && changed {
        bail!("filter is not in canonical form");
    }
    Ok(())
}

fn lower_filters(
    texts: &[String],
    tag: &str,
    mode: SelectMode,
    config: &CompilerConfig,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<()> {
    let filters = parse_filters(texts)?;
    let stages = selection_stages(tag, &filters, mode, &config.lowering)
        .with_context(|| format!("Failed to lower filters for tag '{tag}'"))?;
    log::info!("{} filters lowered into {} stages", filters.len(), stages.len());

    let text = match format {
        OutputFormat::Text => render_sections(&stages),
        OutputFormat::Json => to_json(&stages)?,
    };
    emit(output, &text)
}

/// One row of the `members` output
struct MemberRow<'a> {
    field: &'a str,
    member: Member,
    accessor: RecordAccessor,
    /// Lua read and write accessors, when asked for
    lua: Option<(String, String)>,
}

fn show_members(
    fields: &[String],
    lua: bool,
    config: &CompilerConfig,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<()> {
    let mut rows = Vec::with_capacity(fields.len());
    for field in fields {
        let member = Member::parse(field)?;
        let accessor = member
            .record_accessor(&config.lowering)
            .with_context(|| format!("Cannot map field '{field}' onto a record field"))?;
        let lua = if lua {
            let read = member.lua_accessor(false, &config.lowering)?;
            let write = member.lua_accessor(true, &config.lowering)?;
            Some((read, write))
        } else {
            None
        };
        rows.push(MemberRow {
            field,
            member,
            accessor,
            lua,
        });
    }

    let text = match format {
        OutputFormat::Text => {
            let mut headers = vec!["Field", "Segments", "Record accessor"];
            if lua {
                headers.extend(["Lua read", "Lua write"]);
            }
            let mut table = styled_table(&headers);
            for row in &rows {
                let segments = serde_json::to_string(row.member.segments())
                    .context("Failed to serialize segments")?;
                let mut cells = vec![row.field.to_string(), segments, row.accessor.to_string()];
                if let Some((read, write)) = &row.lua {
                    cells.extend([read.clone(), write.clone()]);
                }
                table.add_row(cells);
            }
            format!("{table}\n")
        }
        OutputFormat::Json => {
            let entries: Vec<serde_json::Value> = rows
                .iter()
                .map(|row| {
                    let mut entry = json!({
                        "field": row.field,
                        "segments": row.member.segments(),
                        "accessor": row.accessor,
                    });
                    if let Some((read, write)) = &row.lua {
                        entry["lua"] = json!({"read": read, "write": write});
                    }
                    entry
                })
                .collect();
            to_json(&entries)?
        }
    };
    emit(output, &text)
}

fn eval_record(
    texts: &[String],
    record_path: &Path,
    mode: SelectMode,
    config: &CompilerConfig,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<()> {
    let raw = std::fs::read_to_string(record_path)
        .with_context(|| format!("Failed to read record file '{}'", record_path.display()))?;
    let value = json5::from_str::<serde_json::Value>(&raw)
        .with_context(|| format!("Failed to parse record file '{}'", record_path.display()))?;
    let serde_json::Value::Object(record) = value else {
        bail!("Record file '{}' does not hold a JSON object", record_path.display());
    };

    let filters = parse_filters(texts)?;

    // one flag per filter, read before the teardown removes them
    let named: BTreeMap<String, Filter> = filters
        .iter()
        .map(|filter| (filter.to_string(), filter.clone()))
        .collect();
    let set = filter_set_stages(EVAL_TAG, &named, &config.lowering)?;
    let flagged = lower::simulate::run(&set.setup, EVAL_TAG, record.clone())?.unwrap_or_default();
    let matched: BTreeMap<&str, bool> = set
        .results
        .iter()
        .map(|(name, key)| (name.as_str(), flagged.contains_key(key)))
        .collect();

    let stages = selection_stages(EVAL_TAG, &filters, mode, &config.lowering)?;
    let result = lower::simulate::run(&stages, EVAL_TAG, record)?;

    let text = match format {
        OutputFormat::Text => {
            let mut out = String::new();
            for (name, hit) in &matched {
                let label = if *hit { "match".green().bold() } else { "no   ".yellow() };
                out.push_str(&format!("{label} {name}\n"));
            }
            let verdict = match result {
                Some(_) => "record kept".green().bold(),
                None => "record dropped".red().bold(),
            };
            out.push_str(&format!("{verdict}\n"));
            out
        }
        OutputFormat::Json => to_json(&json!({
            "filters": matched,
            "kept": result.is_some(),
            "record": result,
        }))?,
    };
    emit(output, &text)
}

fn compile_config(
    config: &CompilerConfig,
    source: &Path,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<()> {
    let compiled = config.compile()?;
    if compiled.is_empty() {
        log::warn!("no pipelines in '{}'", source.display());
    }

    let text = match format {
        OutputFormat::Text => {
            let mut out = format!(
                "# Generated by log-filter compile\n# Source: {}\n# Date: {}\n",
                source.display(),
                chrono::Local::now().format("%Y-%m-%d")
            );
            for pipeline in &compiled {
                out.push_str(&format!("\n# Pipeline {} ({})\n", pipeline.tag, pipeline.mode));
                for (name, filter) in &pipeline.filters {
                    out.push_str(&format!("#   {name}: {filter}\n"));
                }
                out.push('\n');
                out.push_str(&render_sections(&pipeline.stages));
            }
            out
        }
        OutputFormat::Json => to_json(&compiled)?,
    };
    emit(output, &text)
}

pub fn run() -> Result<()> {
    let cli = cli_parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.color {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto => {}
    }

    let config = load_config(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(path) = &cli.config {
        log::info!("loaded config from {}", path.display());
    }

    let format = cli.format;
    let output = cli.output.as_deref();

    match &cli.command {
        Commands::Check { filters } => check_filters(filters, format, output),
        Commands::Fmt { filter, check } => format_filter(filter, *check, format, output),
        Commands::Lower { filters, tag, mode } => {
            lower_filters(filters, tag, (*mode).into(), &config, format, output)
        }
        Commands::Members { fields, lua } => show_members(fields, *lua, &config, format, output),
        Commands::Eval {
            filters,
            record,
            mode,
        } => eval_record(filters, record, (*mode).into(), &config, format, output),
        Commands::Compile => {
            let Some(source) = cli.config.as_deref() else {
                bail!("compile needs a configuration file, pass one with --config");
            };
            compile_config(&config, source, format, output)
        }
    }
}
