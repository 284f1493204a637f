//! Loading artifacts and splitting markdown into sections.

use std::fs;

use serde_json::Value;

use temper_contracts::verify::{Artifact, ArtifactRef, ArtifactType};

/// One markdown heading and the text under it.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub level: usize,
    pub title: String,
    pub body: String,
}

/// An artifact whose content has been read and, where relevant, parsed.
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub artifact_type: ArtifactType,
    pub text: String,
    pub sections: Vec<Section>,
    /// Present for `ArtifactType::Json`.
    pub json: Option<Value>,
}

impl LoadedArtifact {
    /// Read and parse `artifact`. The error names the violated check and
    /// carries a feedback line describing the problem.
    pub fn load(artifact: &Artifact) -> Result<Self, LoadError> {
        let text = match &artifact.reference {
            ArtifactRef::Inline { content } => content.clone(),
            ArtifactRef::Path { path } => fs::read_to_string(path).map_err(|e| LoadError {
                check: "artifact-readable",
                problem: format!("cannot read artifact '{}': {e}", path.display()),
            })?,
        };
        let json = match artifact.artifact_type {
            ArtifactType::Json => Some(serde_json::from_str(&text).map_err(|e| LoadError {
                check: "artifact-parsable",
                problem: format!("artifact is not valid JSON: {e}"),
            })?),
            _ => None,
        };
        let sections = match artifact.artifact_type {
            ArtifactType::Specification | ArtifactType::Plan => parse_sections(&text),
            _ => Vec::new(),
        };
        Ok(Self {
            artifact_type: artifact.artifact_type,
            text,
            sections,
            json,
        })
    }

    /// First section whose title contains `needle`, case-insensitively.
    pub fn section(&self, needle: &str) -> Option<&Section> {
        let needle = needle.to_lowercase();
        self.sections
            .iter()
            .find(|s| s.title.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadError {
    /// Reported as the violated check.
    pub check: &'static str,
    pub problem: String,
}

/// Split markdown on ATX headings. A section's body runs until the next
/// heading of the same or a higher level, so it includes its subsections.
/// Headings inside fenced code blocks are ignored.
pub fn parse_sections(text: &str) -> Vec<Section> {
    let lines: Vec<&str> = text.lines().collect();
    let mut headings: Vec<(usize, usize, String)> = Vec::new();
    let mut in_fence = false;

    for (index, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        let level = trimmed.chars().take_while(|c| *c == '#').count();
        if (1..=6).contains(&level) && trimmed[level..].starts_with(' ') {
            headings.push((index, level, trimmed[level..].trim().to_string()));
        }
    }

    headings
        .iter()
        .enumerate()
        .map(|(position, (start, level, title))| {
            let end = headings[position + 1..]
                .iter()
                .find(|(_, next_level, _)| next_level <= level)
                .map(|(line, _, _)| *line)
                .unwrap_or(lines.len());
            Section {
                level: *level,
                title: title.clone(),
                body: lines[start + 1..end].join("\n").trim().to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use temper_contracts::verify::{Artifact, ArtifactType};

    use super::{parse_sections, LoadedArtifact};

    #[test]
    fn test_sections_nest_until_same_level() {
        let sections = parse_sections(
            "# Spec\nintro\n## Overview\ntext\n### Detail\nmore\n## Requirements\n- FR-001\n",
        );
        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Spec", "Overview", "Detail", "Requirements"]);
        assert_eq!(sections[1].body, "text\n### Detail\nmore");
        assert_eq!(sections[3].body, "- FR-001");
    }

    #[test]
    fn test_fenced_headings_ignored() {
        let sections = parse_sections("## Real\n```\n## Fake\n```\n");
        assert_eq!(sections.len(), 1);
        assert!(sections[0].body.contains("## Fake"));
    }

    #[test]
    fn test_hash_without_space_is_not_a_heading() {
        assert!(parse_sections("#tag\n#\n").is_empty());
    }

    #[test]
    fn test_section_lookup_is_case_insensitive() {
        let loaded = LoadedArtifact::load(&Artifact::inline(
            ArtifactType::Specification,
            "## User Scenarios & Testing\nGiven x",
        ))
        .unwrap();
        assert!(loaded.section("user scenarios").is_some());
        assert!(loaded.section("requirements").is_none());
    }

    #[test]
    fn test_missing_file_and_bad_json() {
        let missing = LoadedArtifact::load(&Artifact::at_path(
            ArtifactType::Plan,
            "/nonexistent/plan.md",
        ))
        .unwrap_err();
        assert_eq!(missing.check, "artifact-readable");

        let bad = LoadedArtifact::load(&Artifact::inline(ArtifactType::Json, "{ nope"))
            .unwrap_err();
        assert_eq!(bad.check, "artifact-parsable");
    }
}
