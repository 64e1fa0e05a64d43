use crate::llm::PromptMessage;

pub const SYSTEM_INSTRUCTION: &str =
    "You are a helpful AI assistant answering questions based on provided context.";

/// Render the conversational RAG prompt.
pub fn render_prompt(context: &str, chat_history: &str, input: &str) -> String {
    format!(
        "{SYSTEM_INSTRUCTION}\n\nContext from document: {context}\n\nChat History: {chat_history}\nHuman: {input}\nAI: "
    )
}

/// Messages for the single-shot fallback call. Carries no history.
pub fn fallback_messages(context: &str, question: &str) -> Vec<PromptMessage> {
    vec![
        PromptMessage::system(format!(
            "{SYSTEM_INSTRUCTION} If the context does not contain the answer, say so."
        )),
        PromptMessage::user(format!(
            "Context from document: {context}\n\nQuestion: {question}"
        )),
    ]
}
