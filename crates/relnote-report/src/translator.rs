use std::sync::Arc;

use relnote_infer::{GenerationRequest, ResponseShape, TextGenerator, strip_code_fence};
use tracing::{Instrument, Span};

pub struct Translator {
    generator: Arc<dyn TextGenerator>,
    target_language: String,
    span: Span,
}

impl Translator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        target_language: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            generator,
            target_language: target_language.into(),
            span,
        }
    }

    /// Translates the whole document in one request.
    ///
    /// Never fails: errors and empty answers produce a labeled error document
    /// that carries the original text verbatim.
    pub async fn translate(&self, document: &str) -> String {
        let request = GenerationRequest::user(
            translation_prompt(document, &self.target_language),
            ResponseShape::Markdown,
        );
        let result = self
            .generator
            .generate(&request)
            .instrument(self.span.clone())
            .await;

        match result {
            Ok(text) => {
                let translated = strip_code_fence(&text);
                if translated.is_empty() {
                    tracing::warn!(parent: &self.span, "translation came back empty");
                    return translation_error_document("empty response", document);
                }
                tracing::info!(
                    parent: &self.span,
                    language = %self.target_language,
                    "translated report"
                );
                translated
            }
            Err(err) => {
                tracing::warn!(parent: &self.span, error = %err, "translation failed");
                translation_error_document(&err.to_string(), document)
            }
        }
    }
}

pub fn translation_error_document(reason: &str, original: &str) -> String {
    format!("# Translation Error\n\nFailed to translate the report: {reason}\n\n---\n\n{original}")
}

fn translation_prompt(document: &str, target_language: &str) -> String {
    format!(
        "Translate the following markdown report into {target_language}.\n\
Requirements:\n\
1. Keep every markdown marker (#, ##, ###, -, **, [text](url)) exactly where it is.\n\
2. Keep all links and URLs unchanged.\n\
3. Use accurate technical terminology.\n\
4. Output only the translated document, without extra explanations.\n\n\
{document}"
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use relnote_infer::{GeminiGenerator, InferError, ScriptedGenerator};

    use super::*;

    const DOCUMENT: &str = "# Report\n\n- [#1](https://github.com/acme/widget/pull/1)\n";

    fn translator(generator: Arc<ScriptedGenerator>) -> Translator {
        Translator::new(generator, "Chinese", Span::none())
    }

    #[tokio::test]
    async fn fenced_translation_is_unwrapped() {
        let generator = Arc::new(ScriptedGenerator::with_responses([
            "```markdown\n# 报告\n```",
        ]));

        let translated = translator(generator.clone()).translate(DOCUMENT).await;

        assert_eq!(translated, "# 报告");
        let prompt = generator.requests()[0]
            .last_user_message()
            .map(str::to_owned)
            .unwrap_or_default();
        assert!(prompt.contains("Chinese"));
        assert!(prompt.ends_with(DOCUMENT));
    }

    #[tokio::test]
    async fn failure_embeds_original_document() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push_err(InferError::InvalidResponse("quota exceeded".to_owned()));

        let translated = translator(generator).translate(DOCUMENT).await;

        assert!(translated.starts_with("# Translation Error\n\nFailed to translate the report: "));
        assert!(translated.contains("quota exceeded"));
        assert!(translated.ends_with(&format!("---\n\n{DOCUMENT}")));
    }

    #[tokio::test]
    async fn empty_answer_is_treated_as_failure() {
        let generator = Arc::new(ScriptedGenerator::with_responses(["   "]));

        let translated = translator(generator).translate(DOCUMENT).await;

        assert_eq!(
            translated,
            translation_error_document("empty response", DOCUMENT)
        );
    }

    #[tokio::test]
    async fn transport_failure_document_omits_credentials() {
        let generator = GeminiGenerator::new(
            "SECRET-KEY-123".to_owned(),
            "gemini-test".to_owned(),
            Duration::from_secs(5),
        )
        .expect("client")
        .with_api_base("http://127.0.0.1:9/v1beta");

        let translated = Translator::new(Arc::new(generator), "Chinese", Span::none())
            .translate(DOCUMENT)
            .await;

        assert!(translated.starts_with("# Translation Error\n\n"));
        assert!(translated.ends_with(DOCUMENT));
        assert!(!translated.contains("SECRET-KEY-123"));
    }
}
