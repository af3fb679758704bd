use futures::future::{BoxFuture, FutureExt};

use crate::services::clarification_store::ClarificationBackend;
use crate::services::llm_client::{LlmClient, LlmMessage};

/// System prompt for clarifications
const CLARIFY_SYSTEM_PROMPT: &str = r#"You are an expert tutor helping someone understand an AI assistant's answer. The reader has highlighted a passage of that answer and asked a question about it.

Your task is to clarify the highlighted passage in response to their question.

## Guidelines
1. Keep answers SHORT - 2-4 sentences max
2. Be direct and educational
3. Answer about the highlighted passage, using the conversation only as background
4. NO markdown formatting (plain text only)
5. NO emojis
6. Do not say things like "as mentioned above" - just answer directly"#;

const CLARIFY_TEMPERATURE: f32 = 0.7;

/// Build the message list for a clarification call
pub fn build_clarify_messages(selected_text: &str, question: &str, context: &[String]) -> Vec<LlmMessage> {
    let mut user_prompt = String::new();
    if !context.is_empty() {
        user_prompt.push_str("## Conversation so far\n");
        for line in context {
            user_prompt.push_str(line);
            user_prompt.push('\n');
        }
        user_prompt.push('\n');
    }
    user_prompt.push_str(&format!(
        "Highlighted text: \"{}\"\n\nQuestion: {}",
        selected_text, question
    ));

    vec![
        LlmClient::system_message(CLARIFY_SYSTEM_PROMPT),
        LlmClient::user_message(&user_prompt),
    ]
}

/// Ask the configured LLM to clarify a highlighted passage
pub async fn clarify_selection(selected_text: &str, question: &str, context: &[String]) -> Result<String, String> {
    // Config is read per call so key/model changes apply without a restart
    let client = LlmClient::from_config()?;
    let messages = build_clarify_messages(selected_text, question, context);
    let response = client.chat_completion(messages, Some(CLARIFY_TEMPERATURE)).await?;
    Ok(response.trim().to_string())
}

/// Clarification backend backed by the OpenAI-compatible client.
#[derive(Debug, Clone, Copy, Default)]
pub struct LlmClarifier;

impl ClarificationBackend for LlmClarifier {
    fn clarify(&self, selected_text: &str, question: &str, context: &[String]) -> BoxFuture<'static, Result<String, String>> {
        let selected_text = selected_text.to_string();
        let question = question.to_string();
        let context = context.to_vec();
        async move { clarify_selection(&selected_text, &question, &context).await }.boxed()
    }
}
