use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use super::{check_response, request_error, OpenAiClient};
use crate::collab::{CollabResult, Rewriter, Translator};
use crate::error::{Collaborator, CollaboratorError};
use crate::utils::text::clean_model_reply;

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

fn translation_prompt(source_language: &str, target_language: &str) -> String {
    format!(
        "You are a professional subtitle translator. Translate the user's text from '{}' to '{}'. \
         Keep the meaning and tone, keep it concise enough to be spoken in the same time. \
         Reply with the translation only, without quotes or comments.",
        source_language, target_language
    )
}

fn rewrite_prompt(language: &str) -> String {
    format!(
        "Rewrite the user's '{}' text so that it reads fluently and naturally for a native speaker \
         and sounds good when read aloud. You may polish the wording but keep the meaning. \
         Do not add headings, lists or paragraph formatting. Reply with the rewritten text only.",
        language
    )
}

fn first_reply(completion: ChatCompletion) -> Option<String> {
    completion
        .choices
        .into_iter()
        .next()
        .map(|choice| clean_model_reply(&choice.message.content))
        .filter(|reply| !reply.is_empty())
}

impl OpenAiClient {
    async fn chat(&self, collaborator: Collaborator, system: String, user: &str) -> CollabResult<String> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system,
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: 0.3,
        };

        let response = self
            .http
            .post(self.endpoint("chat/completions"))
            .header("Authorization", self.bearer())
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(collaborator, e))?;
        let response = check_response(collaborator, response).await?;

        let completion: ChatCompletion = response.json().await.map_err(|e| request_error(collaborator, e))?;
        first_reply(completion)
            .ok_or_else(|| CollaboratorError::Empty(collaborator, "chat completion has no content".to_string()))
    }
}

#[async_trait]
impl Translator for OpenAiClient {
    async fn translate(&self, text: &str, source_language: &str, target_language: &str) -> CollabResult<String> {
        debug!("Translating {} chars {} -> {}", text.len(), source_language, target_language);
        self.chat(
            Collaborator::Translator,
            translation_prompt(source_language, target_language),
            text,
        )
        .await
    }
}

#[async_trait]
impl Rewriter for OpenAiClient {
    async fn rewrite(&self, text: &str, language: &str) -> CollabResult<String> {
        debug!("Rewriting {} chars in {}", text.len(), language);
        self.chat(Collaborator::Rewriter, rewrite_prompt(language), text).await
    }
}
