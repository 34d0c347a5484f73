//! Source bundle
//!
//! Generated code and user files combined into the single text handed to the
//! compiler. The header carries the fingerprint and revision it was produced
//! for, so a cached bundle can be matched and restamped without re-emitting.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

static FINGERPRINT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^// fingerprint: ([0-9a-f]+)$").expect("valid pattern"));

static REVISION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^// revision: (\d+)$").expect("valid pattern"));

/// Top-level lines hoisted to the start of the bundle
static HOISTED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#!\[.*\]|use\s+[^;]+;)\s*$").expect("valid pattern"));

pub const GENERATED_SECTION: &str = "models.generated.rs";

#[derive(Debug, Clone)]
pub struct SourceBundle {
    fingerprint: String,
    revision: u64,
    /// (file name, text), user files first then the generated section
    sections: Vec<(String, String)>,
}

impl SourceBundle {
    pub fn new(
        fingerprint: impl Into<String>,
        revision: u64,
        user_files: &BTreeMap<String, String>,
        generated: impl Into<String>,
    ) -> Self {
        let mut sections: Vec<(String, String)> = user_files
            .iter()
            .map(|(name, text)| (name.clone(), text.clone()))
            .collect();
        sections.push((GENERATED_SECTION.to_string(), generated.into()));
        Self {
            fingerprint: fingerprint.into(),
            revision,
            sections,
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The generated section alone
    pub fn generated(&self) -> &str {
        self.sections
            .last()
            .map(|(_, text)| text.as_str())
            .unwrap_or_default()
    }

    pub fn render(&self) -> String {
        let mut attributes = BTreeSet::new();
        let mut uses = BTreeSet::new();
        let mut bodies = Vec::with_capacity(self.sections.len());

        for (name, text) in &self.sections {
            let mut body = String::new();
            for line in text.lines() {
                if HOISTED_LINE.is_match(line) {
                    let line = line.trim().to_string();
                    if line.starts_with("#!") {
                        attributes.insert(line);
                    } else {
                        uses.insert(line);
                    }
                } else {
                    body.push_str(line);
                    body.push('\n');
                }
            }
            bodies.push((name, body));
        }

        let mut out = String::new();
        out.push_str(&format!("// fingerprint: {}\n", self.fingerprint));
        out.push_str(&format!("// revision: {}\n", self.revision));
        for attribute in &attributes {
            out.push_str(attribute);
            out.push('\n');
        }
        if !attributes.is_empty() {
            out.push('\n');
        }
        for line in &uses {
            out.push_str(line);
            out.push('\n');
        }
        for (name, body) in bodies {
            out.push_str(&format!("\n// FILE: {}\n", name));
            out.push_str(&body);
        }
        out.push_str("\n// EOF\n");
        out
    }

    /// The (fingerprint, revision) header of rendered bundle text
    pub fn header(text: &str) -> Option<(String, u64)> {
        let fingerprint = FINGERPRINT_LINE.captures(text)?.get(1)?.as_str().to_string();
        let revision = REVISION_LINE.captures(text)?.get(1)?.as_str().parse().ok()?;
        Some((fingerprint, revision))
    }

    /// Rewrite the revision header of rendered bundle text
    pub fn restamp(text: &str, revision: u64) -> String {
        REVISION_LINE
            .replace(text, format!("// revision: {}", revision).as_str())
            .into_owned()
    }
}
