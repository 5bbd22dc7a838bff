use std::path::Path;

use crate::completion::{CompletionProvider, CompletionRequest};
use crate::error::{ServiceError, ServiceResult};
use crate::prompts::{PromptSet, build_chat_context};
use crate::storage::DocumentStore;
use crate::survey::summary_if_present;
use crate::types::{
    ChatMessage, ChatRole, EventsDocument, MeasuresDocument, MessagesDocument,
};

pub fn list_messages(store: &DocumentStore) -> Vec<ChatMessage> {
    store.load::<MessagesDocument>().messages
}

/// Append the user's message, ask the model and append its reply.
///
/// On a provider failure the user message is still stored, flagged with
/// `error`, and the provider error is returned.
pub fn post_message(
    store: &DocumentStore,
    prompts_dir: &Path,
    provider: Option<&dyn CompletionProvider>,
    text: &str,
) -> ServiceResult<Vec<ChatMessage>> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ServiceError::BadRequest("Message text must not be empty".to_string()));
    }

    let mut doc: MessagesDocument = store.load();
    let history = doc.messages.clone();
    doc.messages.push(ChatMessage::new(ChatRole::User, text));

    let reply = provider
        .ok_or_else(|| ServiceError::Config("GROQ_API_KEY is not set".to_string()))
        .and_then(|provider| {
            let events: EventsDocument = store.load();
            let measures: MeasuresDocument = store.load();
            let survey = summary_if_present(&store.survey_path());
            let context = build_chat_context(&events, &measures, survey.as_deref(), &history);
            let prompts = PromptSet::chat(prompts_dir);
            provider.complete(&CompletionRequest::new(prompts.system_prompt, context, text))
        });

    match reply {
        Ok(answer) => {
            doc.messages
                .push(ChatMessage::new(ChatRole::Assistant, answer.trim()));
            store.save(&doc)?;
            Ok(doc.messages)
        }
        Err(err) => {
            tracing::error!("chat completion failed: {err}");
            if let Some(last) = doc.messages.last_mut() {
                last.error = true;
            }
            store.save(&doc)?;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::StubProvider;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn successful_post_appends_user_and_assistant() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let provider = StubProvider::replying("  Am Mittwoch.  ");

        let messages = post_message(&store, dir.path(), Some(&provider), "Wann ist Teamtag?").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::User);
        assert_eq!(messages[1].role, ChatRole::Assistant);
        assert_eq!(messages[1].text, "Am Mittwoch.");
        assert_eq!(list_messages(&store), messages);

        post_message(&store, dir.path(), Some(&provider), "Danke").unwrap();
        assert_eq!(list_messages(&store).len(), 4);
    }

    #[test]
    fn context_includes_documents_and_survey() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        fs::write(dir.path().join("events.json"), r#"{"Monday": [{"title": "Jour fixe", "hour": 10}]}"#).unwrap();
        fs::write(dir.path().join("table.csv"), "Lieblingstag\nDienstag\n").unwrap();
        let provider = StubProvider::replying("ok");

        post_message(&store, dir.path(), Some(&provider), "Was steht an?").unwrap();
        let seen = provider.seen.lock().unwrap();
        assert!(seen[0].instructions.contains("Jour fixe"));
        assert!(seen[0].instructions.contains("Lieblingstag\nDienstag"));
        assert_eq!(seen[0].payload, "Was steht an?");
        assert!(seen[0].response_format.is_none());
    }

    #[test]
    fn provider_failure_stores_only_flagged_user_message() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let provider = StubProvider::failing("timeout");

        let err = post_message(&store, dir.path(), Some(&provider), "Hallo").unwrap_err();
        assert!(matches!(err, ServiceError::ApiError(_)));
        let stored = list_messages(&store);
        assert_eq!(stored.len(), 1);
        assert!(stored[0].error);
        assert_eq!(stored[0].role, ChatRole::User);
    }

    #[test]
    fn missing_provider_behaves_like_a_failure() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let err = post_message(&store, dir.path(), None, "Hallo").unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
        assert_eq!(list_messages(&store).len(), 1);
    }

    #[test]
    fn blank_message_is_rejected_without_writing() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let provider = StubProvider::replying("ok");
        assert!(post_message(&store, dir.path(), Some(&provider), "   ").is_err());
        assert!(!dir.path().join("messages.json").exists());
    }
}
