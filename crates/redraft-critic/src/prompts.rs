/// Built-in revision prompt. Placeholders: `{spec}`, `{document}`, `{feedback}`, `{preserve}`.
pub const DEFAULT_REVISER_TEMPLATE: &str = r#"You are revising a document so that it satisfies a target specification.

## Target Specification
{spec}

## Source Document
{document}

## Feedback To Address
{feedback}

---

## Task

Rewrite the source document so that it meets EVERY requirement in the target specification.

1. **Missing requirements**: If the specification asks for something the document lacks, add it where it naturally belongs.
2. **Weak coverage**: Strengthen existing passages so they address the specification directly, reusing its exact phrasing where appropriate.
3. **Feedback**: Resolve every point raised in the feedback above.

## Invariants (must not change)
{preserve}

## Output Format

Return ONLY the complete revised document, in the same format as the source. No commentary, no partial patches."#;

/// Built-in scoring prompt. Placeholders: `{spec}`, `{document}`.
pub const DEFAULT_SCORER_TEMPLATE: &str = r#"You are grading a document against a target specification, checklist style.

## Target Specification
{spec}

## Document
{document}

---

## Task

Derive a checklist of the concrete requirements in the target specification and check the document against each one.

- If every high-priority requirement is covered, give a score of 10.
- Otherwise give a lower score and name exactly which requirements are missing.

## Required Response Format

SCORE: [1-10]
FEEDBACK: [Brief explanation naming any unmet requirement]"#;

/// Text used in place of feedback on the first revision
pub const FIRST_DRAFT_FEEDBACK: &str = "No feedback yet. This is the first draft.";

/// Prompt templates for both refinement stages
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    pub reviser: String,
    pub scorer: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            reviser: DEFAULT_REVISER_TEMPLATE.to_string(),
            scorer: DEFAULT_SCORER_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplates {
    pub fn with_reviser(mut self, template: impl Into<String>) -> Self {
        self.reviser = template.into();
        self
    }

    pub fn with_scorer(mut self, template: impl Into<String>) -> Self {
        self.scorer = template.into();
        self
    }

    /// Build the revision prompt
    pub fn build_revision_prompt(
        &self,
        spec: &str,
        source_document: &str,
        critique: Option<&str>,
        preserve: &[String],
    ) -> String {
        let feedback = match critique {
            Some(c) => format!("Previous critique to fix: {}", c),
            None => FIRST_DRAFT_FEEDBACK.to_string(),
        };
        let preserve = if preserve.is_empty() {
            "- (none specified)".to_string()
        } else {
            preserve
                .iter()
                .map(|p| format!("- Do NOT change {}", p))
                .collect::<Vec<_>>()
                .join("\n")
        };

        render(
            &self.reviser,
            &[
                ("spec", spec),
                ("document", source_document),
                ("feedback", &feedback),
                ("preserve", &preserve),
            ],
        )
    }

    /// Build the scoring prompt for an already-truncated document excerpt
    pub fn build_scoring_prompt(&self, spec: &str, document_excerpt: &str) -> String {
        render(
            &self.scorer,
            &[("spec", spec), ("document", document_excerpt)],
        )
    }
}

/// Substitute `{name}` placeholders in one pass.
///
/// Substituted values are never rescanned, so a document that happens to
/// contain `{feedback}` is passed through untouched. Unknown placeholders are
/// left as written.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let substituted = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });

        match substituted {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Longest prefix of `text` holding at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
