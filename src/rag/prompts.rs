//! Answer prompt over retrieved passages

/// Answer returned when generation fails or times out
pub const ANSWER_UNAVAILABLE: &str =
    "I'm sorry, I couldn't generate an answer right now. The sources and images below may still help.";

/// Build the question-answering prompt
pub fn build_answer_prompt(question: &str, context: &str) -> String {
    let context = if context.trim().is_empty() {
        "(no matching passages were found)"
    } else {
        context.trim_end()
    };

    format!(
        r"I have the following question: {question}

Here is some context that might help you answer:

{context}

Please provide a comprehensive answer based on the context provided. If the context doesn't contain enough information to answer the question, please say so. Include references to the sources in your answer."
    )
}
