//! Metadata extraction.
//!
//! Scans an inventory directory and parses every unit descriptor into a
//! [`Unit`] record. Parsing is tolerant: a descriptor with malformed or partial
//! front matter still yields a unit with defaulted fields. Only an unreadable
//! descriptor or a duplicate identifier excludes a unit from the run.
//!
//! # Descriptor format
//!
//! ```text
//! ---
//! name: pdf-tools
//! description: Use when the user says "edit pdf" or "merge pdf".
//! tools: Bash, Read
//! type: automation
//! ---
//! Body text...
//! ```

use crate::models::{
    AudienceMode, InventorySnapshot, RunIssue, Unit, UnitId, UnitKind, count_body_lines,
};
use crate::services::keywords::quoted_phrases;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::instrument;

/// File name of the descriptor inside a unit directory.
pub const DESCRIPTOR_FILE: &str = "SKILL.md";

const DELIMITER: &str = "---";

/// Parses unit descriptors and scans inventories.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Creates a new extractor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Scans every non-hidden subdirectory of `root` that holds a descriptor.
    ///
    /// Unreadable descriptors and duplicate identifiers are reported in
    /// [`InventorySnapshot::issues`] and excluded; the scan itself continues.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InventoryUnreadable`] if `root` is missing, is not a
    /// directory, or cannot be listed.
    #[instrument(skip(self), fields(root = %root.display(), unit_count = tracing::field::Empty))]
    #[allow(clippy::cast_precision_loss)]
    pub fn scan(&self, root: &Path) -> Result<InventorySnapshot> {
        let start = Instant::now();
        let unreadable = |cause: String| Error::InventoryUnreadable {
            path: root.display().to_string(),
            cause,
        };

        if !root.is_dir() {
            return Err(unreadable("not a directory".to_string()));
        }
        let entries = std::fs::read_dir(root).map_err(|e| unreadable(e.to_string()))?;

        let mut dirs: Vec<PathBuf> = Vec::new();
        let mut issues = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    let hidden = entry.file_name().to_string_lossy().starts_with('.');
                    if !hidden && path.is_dir() {
                        dirs.push(path);
                    }
                },
                Err(e) => {
                    issues.push(RunIssue::from_error(
                        root.display().to_string(),
                        &Error::operation("read_dir_entry", e),
                    ));
                },
            }
        }
        dirs.sort();

        let mut units: Vec<Unit> = Vec::with_capacity(dirs.len());
        let mut seen: HashMap<UnitId, PathBuf> = HashMap::new();
        for dir in dirs {
            let dir_name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match self.load_unit(&dir) {
                Ok(Some(unit)) => {
                    if let Some(first) = seen.get(&unit.id) {
                        let err = Error::Parse {
                            unit: dir_name.clone(),
                            cause: format!(
                                "identifier '{}' already declared by {}",
                                unit.id,
                                first.display()
                            ),
                        };
                        tracing::warn!(unit = %dir_name, error = %err, "Excluding duplicate unit");
                        issues.push(RunIssue::from_error(dir_name, &err));
                        continue;
                    }
                    seen.insert(unit.id.clone(), dir.clone());
                    units.push(unit);
                },
                Ok(None) => {
                    tracing::debug!(dir = %dir.display(), "Skipping directory without descriptor");
                },
                Err(err) => {
                    tracing::warn!(unit = %dir_name, error = %err, "Excluding unreadable unit");
                    issues.push(RunIssue::from_error(dir_name, &err));
                },
            }
        }
        units.sort_by(|a, b| a.id.cmp(&b.id));

        tracing::Span::current().record("unit_count", units.len() as u64);
        metrics::counter!("curator_units_scanned_total").increment(units.len() as u64);
        metrics::histogram!("curator_scan_duration_ms")
            .record(start.elapsed().as_millis() as f64);

        Ok(InventorySnapshot {
            root: root.to_path_buf(),
            units,
            issues,
        })
    }

    /// Loads the unit stored in `dir`.
    ///
    /// Returns `Ok(None)` if the directory holds no descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the descriptor exists but cannot be read as UTF-8 text.
    pub fn load_unit(&self, dir: &Path) -> Result<Option<Unit>> {
        let descriptor = dir.join(DESCRIPTOR_FILE);
        if !descriptor.is_file() {
            return Ok(None);
        }
        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let text = std::fs::read_to_string(&descriptor).map_err(|e| Error::Parse {
            unit: dir_name.clone(),
            cause: e.to_string(),
        })?;
        let mut unit = self.parse_descriptor(&dir_name, &text);
        unit.path = dir.to_path_buf();
        Ok(Some(unit))
    }

    /// Parses raw descriptor text into a unit.
    ///
    /// Never fails: missing or malformed fields are defaulted, and the
    /// identifier falls back to `dir_name`.
    #[must_use]
    pub fn parse_descriptor(&self, dir_name: &str, text: &str) -> Unit {
        let text = text.replace("\r\n", "\n");
        let (fields, body) = match split_front_matter(&text) {
            Some((yaml, body)) => (parse_fields(yaml), body),
            None => (Map::new(), text.as_str()),
        };

        let id = text_field(&fields, "name")
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| dir_name.to_string());
        let description = text_field(&fields, "description").unwrap_or_default();
        let triggers = if fields.contains_key("triggers") {
            list_field(&fields, "triggers")
        } else {
            quoted_phrases(&description)
        };
        let mut tools = list_field(&fields, "tools");
        if tools.is_empty() {
            tools = list_field(&fields, "allowed-tools");
        }
        dedup_in_order(&mut tools);
        let mut domain = list_field(&fields, "domain");
        if domain.is_empty() {
            domain = list_field(&fields, "operates-on");
        }

        let kind = text_field(&fields, "type")
            .map(|t| UnitKind::parse(&t))
            .unwrap_or_default();
        let user_only = text_field(&fields, "disable-model-invocation")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
            || text_field(&fields, "user-invocable").is_some_and(|v| v.eq_ignore_ascii_case("only"));
        let audience = if user_only {
            AudienceMode::UserOnly
        } else {
            AudienceMode::AutoInvoked
        };

        let body = body.trim_start_matches('\n').trim_end().to_string();
        Unit {
            id: UnitId::new(id),
            description,
            triggers,
            tools,
            domain,
            kind,
            audience,
            version: text_field(&fields, "version"),
            body_lines: count_body_lines(&body),
            body,
            path: PathBuf::new(),
        }
    }
}

/// Splits `---` delimited front matter from the body.
///
/// Returns `None` when the text has no complete front matter block.
fn split_front_matter(text: &str) -> Option<(&str, &str)> {
    let mut lines = text.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != DELIMITER {
        return None;
    }
    let mut offset = first.len();
    for line in lines {
        if line.trim_end() == DELIMITER {
            return Some((&text[first.len()..offset], &text[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Parses front matter as YAML, falling back to line-oriented `key: value` pairs.
fn parse_fields(yaml: &str) -> Map<String, Value> {
    match serde_yaml_ng::from_str::<Value>(yaml) {
        Ok(Value::Object(map)) => map,
        Ok(Value::Null) => Map::new(),
        Ok(_) | Err(_) => {
            tracing::debug!("Front matter is not a YAML mapping, using line fallback");
            parse_lines(yaml)
        },
    }
}

/// Line-oriented fallback for front matter that YAML rejects.
///
/// Continuation lines are indented; `>`, `>-`, `|` and `|-` open a folded value
/// and indented `- item` lines form a list.
fn parse_lines(yaml: &str) -> Map<String, Value> {
    let mut map = Map::new();
    let mut current: Option<(String, Vec<String>, Vec<String>)> = None;

    let flush = |map: &mut Map<String, Value>, entry: Option<(String, Vec<String>, Vec<String>)>| {
        if let Some((key, text, items)) = entry {
            let value = if text.is_empty() && !items.is_empty() {
                Value::Array(items.into_iter().map(Value::String).collect())
            } else {
                Value::String(text.join(" ").trim().to_string())
            };
            map.insert(key, value);
        }
    };

    for line in yaml.lines() {
        let indented = line.starts_with(' ') || line.starts_with('\t');
        if !indented {
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim();
                let valid_key = key
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_')
                    && key
                        .chars()
                        .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
                if valid_key {
                    flush(&mut map, current.take());
                    let value = value.trim();
                    let text = if matches!(value, ">" | ">-" | "|" | "|-" | "") {
                        Vec::new()
                    } else {
                        vec![value.to_string()]
                    };
                    current = Some((key.to_string(), text, Vec::new()));
                    continue;
                }
            }
        }
        if let Some((_, text, items)) = current.as_mut() {
            let trimmed = line.trim();
            if let Some(item) = trimmed.strip_prefix("- ") {
                items.push(item.trim().to_string());
            } else if !trimmed.is_empty() {
                text.push(trimmed.to_string());
            }
        }
    }
    flush(&mut map, current.take());
    map
}

/// Reads a scalar field as text.
fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Reads a list field given either as a sequence or a comma-separated string.
fn list_field(fields: &Map<String, Value>, key: &str) -> Vec<String> {
    let items: Vec<String> = match fields.get(key) {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn dedup_in_order(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}
