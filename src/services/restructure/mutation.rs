//! Pure unit transformations and descriptor rendering.
//!
//! Nothing here touches the filesystem except [`write_descriptor`] and
//! [`copy_aux_files`]; the executor decides where results land.

use crate::models::{AudienceMode, SplitPart, Unit, UnitId, UnitKind};
use crate::services::DESCRIPTOR_FILE;
use crate::services::keywords::normalize_phrase;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Separator placed between merged bodies.
pub const BODY_SEPARATOR: &str = "\n\n---\n\n";

const SECTION_PREFIX: &str = "## ";
const FENCE: &str = "```";

/// Combines `sources` into a single unit named `target`.
///
/// Triggers are de-duplicated on normalised text keeping the first spelling;
/// tools and domain objects are de-duplicated by name in first-seen order.
#[must_use]
pub fn merge_units(target: &UnitId, sources: &[&Unit]) -> Unit {
    let mut seen = HashSet::new();
    let triggers: Vec<String> = sources
        .iter()
        .flat_map(|u| u.triggers.iter())
        .filter(|t| seen.insert(normalize_phrase(t)))
        .cloned()
        .collect();

    let description = sources
        .iter()
        .map(|u| u.description.trim())
        .filter(|d| !d.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let body = sources
        .iter()
        .map(|u| u.body.trim())
        .filter(|b| !b.is_empty())
        .collect::<Vec<_>>()
        .join(BODY_SEPARATOR);

    let kind = if sources.iter().any(|u| u.kind == UnitKind::Automation) {
        UnitKind::Automation
    } else {
        UnitKind::Knowledge
    };
    let audience = if !sources.is_empty()
        && sources.iter().all(|u| u.audience == AudienceMode::UserOnly)
    {
        AudienceMode::UserOnly
    } else {
        AudienceMode::AutoInvoked
    };

    let mut merged = Unit::new(target.clone())
        .with_triggers(triggers)
        .with_tools(union_by_name(sources.iter().map(|u| u.tools.as_slice())))
        .with_description(description)
        .with_body(body);
    merged.domain = union_by_name(sources.iter().map(|u| u.domain.as_slice()));
    merged.kind = kind;
    merged.audience = audience;
    merged
}

fn union_by_name<'a>(lists: impl Iterator<Item = &'a [String]>) -> Vec<String> {
    let mut seen = HashSet::new();
    lists
        .flatten()
        .filter(|item| seen.insert(item.trim().to_string()))
        .cloned()
        .collect()
}

/// Body split into its preamble and `## ` sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodySections {
    /// Text before the first section.
    pub preamble: String,
    /// `(heading, full section text including the heading line)` pairs.
    pub sections: Vec<(String, String)>,
}

/// Splits a body on `## ` headings outside fenced code blocks.
#[must_use]
pub fn body_sections(body: &str) -> BodySections {
    let mut preamble = Vec::new();
    let mut sections: Vec<(String, Vec<&str>)> = Vec::new();
    let mut in_fence = false;

    for line in body.lines() {
        if line.trim_start().starts_with(FENCE) {
            in_fence = !in_fence;
        }
        if let Some(heading) = line.strip_prefix(SECTION_PREFIX).filter(|_| !in_fence) {
            sections.push((heading.trim().to_string(), vec![line]));
            continue;
        }
        match sections.last_mut() {
            Some((_, lines)) => lines.push(line),
            None => preamble.push(line),
        }
    }

    BodySections {
        preamble: preamble.join("\n").trim().to_string(),
        sections: sections
            .into_iter()
            .map(|(heading, lines)| (heading, lines.join("\n").trim().to_string()))
            .collect(),
    }
}

/// Partitions `source` into one unit per part.
///
/// The preamble goes to every part. A section goes to the part that lists its
/// heading (case-insensitive); unlisted sections go to the first part.
#[must_use]
pub fn split_unit(source: &Unit, parts: &[SplitPart]) -> Vec<Unit> {
    let layout = body_sections(&source.body);
    let mut bodies: Vec<Vec<String>> = vec![Vec::new(); parts.len()];

    for (heading, text) in &layout.sections {
        let owner = parts
            .iter()
            .position(|part| {
                part.sections
                    .iter()
                    .any(|s| s.trim().eq_ignore_ascii_case(heading))
            })
            .unwrap_or(0);
        if let Some(body) = bodies.get_mut(owner) {
            body.push(text.clone());
        }
    }

    parts
        .iter()
        .zip(bodies)
        .map(|(part, sections)| {
            let body = std::iter::once(layout.preamble.clone())
                .chain(sections)
                .filter(|chunk| !chunk.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n");
            let mut unit = Unit::new(part.id.clone())
                .with_triggers(part.triggers.clone())
                .with_tools(source.tools.clone())
                .with_description(source.description.clone())
                .with_body(body);
            unit.domain.clone_from(&source.domain);
            unit.kind = source.kind;
            unit.audience = source.audience;
            unit
        })
        .collect()
}

#[derive(Serialize)]
struct FrontMatter<'a> {
    name: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    triggers: &'a [String],
    #[serde(rename = "allowed-tools", skip_serializing_if = "<[String]>::is_empty")]
    tools: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    domain: &'a [String],
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "disable-model-invocation", skip_serializing_if = "std::ops::Not::not")]
    user_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
}

/// Renders a unit as a descriptor: YAML front matter followed by the body.
///
/// # Errors
///
/// Returns an error if the front matter cannot be serialized.
pub fn render_descriptor(unit: &Unit) -> Result<String> {
    let front = FrontMatter {
        name: unit.id.as_str(),
        description: &unit.description,
        triggers: &unit.triggers,
        tools: &unit.tools,
        domain: &unit.domain,
        kind: unit.kind.as_str(),
        user_only: unit.audience == AudienceMode::UserOnly,
        version: unit.version.as_deref(),
    };
    let yaml = serde_yaml_ng::to_string(&front)
        .map_err(|e| Error::operation("serialize_front_matter", e))?;
    Ok(format!("---\n{}---\n\n{}\n", yaml, unit.body.trim()))
}

/// Writes `unit` as the descriptor of `dir`, creating the directory.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn write_descriptor(dir: &Path, unit: &Unit) -> Result<()> {
    fs::create_dir_all(dir)
        .map_err(|e| Error::operation("create_unit_dir", format!("{}: {e}", dir.display())))?;
    let path = dir.join(DESCRIPTOR_FILE);
    fs::write(&path, render_descriptor(unit)?)
        .map_err(|e| Error::operation("write_descriptor", format!("{}: {e}", path.display())))
}

/// Copies every entry of `src` except the descriptor into `dst`, leaving
/// entries that already exist in `dst` untouched.
///
/// # Errors
///
/// Returns an error if a directory cannot be read or a copy fails.
pub fn copy_aux_files(src: &Path, dst: &Path) -> Result<()> {
    let entries = fs::read_dir(src)
        .map_err(|e| Error::operation("read_unit_dir", format!("{}: {e}", src.display())))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::operation("read_unit_dir", e))?;
        if entry.file_name() == DESCRIPTOR_FILE {
            continue;
        }
        let to = dst.join(entry.file_name());
        if to.exists() {
            tracing::debug!(path = %to.display(), "Keeping auxiliary file from earlier source");
            continue;
        }
        let from = entry.path();
        if from.is_dir() {
            super::archive::copy_dir(&from, &to)?;
        } else {
            fs::copy(&from, &to)
                .map_err(|e| Error::operation("copy_aux_file", format!("{}: {e}", from.display())))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MetadataExtractor;

    fn pdf() -> Unit {
        Unit::new("pdf-tools")
            .with_triggers(["edit pdf", "Merge PDF"])
            .with_tools(["Bash", "Read"])
            .with_description("PDF editing.")
            .with_body("# PDF\n\nUse qpdf.")
    }

    fn pdf_extra() -> Unit {
        Unit::new("pdf-extra")
            .with_triggers(["merge  pdf", "split pdf"])
            .with_tools(["Read", "Write"])
            .with_description("More PDF.")
            .with_body("# Extra\n\nUse pdftk.")
    }

    #[test]
    fn test_merge_dedups_triggers_and_tools() {
        let (a, b) = (pdf(), pdf_extra());
        let merged = merge_units(&UnitId::new("pdf"), &[&a, &b]);
        assert_eq!(merged.triggers, vec!["edit pdf", "Merge PDF", "split pdf"]);
        assert_eq!(merged.tools, vec!["Bash", "Read", "Write"]);
        assert_eq!(merged.description, "PDF editing. More PDF.");
        assert_eq!(
            merged.body,
            "# PDF\n\nUse qpdf.\n\n---\n\n# Extra\n\nUse pdftk."
        );
    }

    #[test]
    fn test_body_sections_ignore_fenced_headings() {
        let body = "intro\n\n## One\nfirst\n```md\n## not a heading\n```\n## Two\nsecond";
        let layout = body_sections(body);
        assert_eq!(layout.preamble, "intro");
        let headings: Vec<&str> = layout.sections.iter().map(|(h, _)| h.as_str()).collect();
        assert_eq!(headings, vec!["One", "Two"]);
        assert!(layout.sections[0].1.contains("## not a heading"));
    }

    #[test]
    fn test_split_assigns_sections() {
        let source = Unit::new("office")
            .with_tools(["Bash"])
            .with_description("Office docs.")
            .with_body("Shared intro.\n\n## Word\nword stuff\n\n## Excel\nexcel stuff\n\n## Misc\nmisc");
        let parts = vec![
            SplitPart {
                id: UnitId::new("office-word"),
                triggers: vec!["edit docx".to_string()],
                sections: vec!["word".to_string()],
            },
            SplitPart {
                id: UnitId::new("office-excel"),
                triggers: vec!["edit xlsx".to_string()],
                sections: vec!["Excel".to_string()],
            },
        ];
        let units = split_unit(&source, &parts);
        assert_eq!(units.len(), 2);
        assert!(units[0].body.starts_with("Shared intro."));
        assert!(units[0].body.contains("## Word"));
        assert!(units[0].body.contains("## Misc"));
        assert!(units[1].body.starts_with("Shared intro."));
        assert!(units[1].body.contains("## Excel"));
        assert!(!units[1].body.contains("## Word"));
        assert_eq!(units[1].tools, vec!["Bash"]);
    }

    #[test]
    fn test_rendered_descriptor_parses_back() {
        let mut unit = pdf();
        unit.audience = AudienceMode::UserOnly;
        unit.version = Some("1.2".to_string());
        let text = render_descriptor(&unit).unwrap();
        let parsed = MetadataExtractor::new().parse_descriptor("pdf-tools", &text);
        assert_eq!(parsed.id, unit.id);
        assert_eq!(parsed.triggers, unit.triggers);
        assert_eq!(parsed.tools, unit.tools);
        assert_eq!(parsed.description, unit.description);
        assert_eq!(parsed.audience, AudienceMode::UserOnly);
        assert_eq!(parsed.version.as_deref(), Some("1.2"));
        assert_eq!(parsed.body.trim(), unit.body.trim());
    }

    #[test]
    fn test_copy_aux_files_first_wins() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (a, b, dst) = (tmp.path().join("a"), tmp.path().join("b"), tmp.path().join("dst"));
        for (dir, content) in [(&a, "from a"), (&b, "from b")] {
            fs::create_dir_all(dir.join("scripts")).unwrap();
            fs::write(dir.join(DESCRIPTOR_FILE), "---\nname: x\n---\n").unwrap();
            fs::write(dir.join("notes.md"), content).unwrap();
            fs::write(dir.join("scripts").join("run.sh"), content).unwrap();
        }
        fs::write(b.join("only-b.txt"), "b").unwrap();
        fs::create_dir_all(&dst).unwrap();

        copy_aux_files(&a, &dst).unwrap();
        copy_aux_files(&b, &dst).unwrap();
        assert_eq!(fs::read_to_string(dst.join("notes.md")).unwrap(), "from a");
        assert!(dst.join("only-b.txt").exists());
        assert!(!dst.join(DESCRIPTOR_FILE).exists());
    }
}
