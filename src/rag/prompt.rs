use crate::llm::ChatMessage;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions based on the provided context from Telegram channels.

RULES:
1. Answer based ONLY on the provided context. If the context doesn't contain relevant information, say so.
2. Be concise and direct in your answers.
3. If referencing specific information, mention the source number (e.g., [1], [2]).
4. Respond in the same language as the user's question.
5. If the context contains code or technical information, format it properly using markdown.";

pub fn user_prompt(question: &str, context: &str) -> String {
    if context.is_empty() {
        question.to_string()
    } else {
        format!("Context:\n{}\n\nQuestion: {}", context, question)
    }
}

/// System and user turns for one answer.
pub fn answer_messages(question: &str, context: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(user_prompt(question, context)),
    ]
}
