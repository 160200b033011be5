use redraft_agent::{GenerationError, Generator};
use redraft_critic::PromptTemplates;
use tracing::debug;

use crate::RefinementState;

const FENCE: &str = "```";

/// Fence language stripped by default
pub const DEFAULT_FENCE_LANGUAGE: &str = "latex";

/// Default invariants the reviser is told to leave alone
pub fn default_preserved_fields() -> Vec<String> {
    vec![
        "company names, job titles, or dates".to_string(),
        "the contact information header".to_string(),
    ]
}

/// Produces the next full candidate document
pub struct Reviser<'a> {
    generator: &'a dyn Generator,
    prompts: PromptTemplates,
    preserve: Vec<String>,
    fence_language: String,
}

impl<'a> Reviser<'a> {
    pub fn new(generator: &'a dyn Generator) -> Self {
        Self {
            generator,
            prompts: PromptTemplates::default(),
            preserve: default_preserved_fields(),
            fence_language: DEFAULT_FENCE_LANGUAGE.to_string(),
        }
    }

    pub fn with_prompts(mut self, prompts: PromptTemplates) -> Self {
        self.prompts = prompts;
        self
    }

    /// Fields or sections of the source that must survive every revision
    pub fn with_preserved(mut self, preserve: Vec<String>) -> Self {
        self.preserve = preserve;
        self
    }

    pub fn with_fence_language(mut self, language: impl Into<String>) -> Self {
        self.fence_language = language.into();
        self
    }

    pub fn generator(&self) -> &'a dyn Generator {
        self.generator
    }

    /// Generate the next draft from `state`.
    ///
    /// Returns the complete replacement document with wrapper fences removed.
    /// Does not touch `state`; the driver commits the result.
    pub async fn revise(&self, state: &RefinementState) -> Result<String, GenerationError> {
        let prompt = self.prompts.build_revision_prompt(
            state.target_spec(),
            state.source_document(),
            state.latest_critique(),
            &self.preserve,
        );

        debug!(
            prompt_len = prompt.len(),
            iteration = state.iteration(),
            "Running reviser"
        );

        let raw = self.generator.generate(&prompt).await?;
        let document = strip_fences(&raw, &self.fence_language);

        if document.is_empty() {
            return Err(GenerationError::MalformedResponse(
                "reviser returned an empty document".into(),
            ));
        }

        Ok(document)
    }
}

/// Remove code-fence wrappers from the start and end of a generator reply.
///
/// Strips the ```` ```<language> ```` opener or a bare ```` ``` ````, and a
/// trailing ```` ``` ````, repeating until nothing changes. Applying it to its
/// own output is a no-op.
pub fn strip_fences(text: &str, language: &str) -> String {
    let marker = format!("{}{}", FENCE, language);
    let mut current = text.trim();

    loop {
        let before = current;

        if let Some(rest) = current
            .strip_prefix(marker.as_str())
            .or_else(|| current.strip_prefix(FENCE))
        {
            current = rest.trim_start();
        }
        if let Some(rest) = current.strip_suffix(FENCE) {
            current = rest.trim_end();
        }

        if current == before {
            break;
        }
    }

    current.to_string()
}
