use crate::db::models::{ChatMessage, Question};

/// Default summary of a conversation that has not been titled yet.
pub(crate) const PLACEHOLDER_SUMMARY: &str = "New Chat";

pub(crate) const TUTOR_PROMPT: &str = "You are ALAASKA, a supportive teaching assistant. \
Your job is to guide the user to think critically and find the solution on their own. \
Keep the conversation going with a question at the end of your replies. \
Identify the student's level with guiding questions about the topic they are inquiring about. \
When appropriate throughout the conversation use these: flashcards, mini quizzes, scenarios, hints. \
Discuss only academic topics and nothing else.";

pub(crate) const WELCOME_GREETING: &str = "Hi! Welcome to ALAASKA. How can I help you today?";

pub(crate) const TITLE_PROMPT: &str = "Give a 4-word title to this message";

pub(crate) fn question_system_prompt(question: &Question) -> String {
    let mut prompt = format!(
        "{TUTOR_PROMPT}\n\nThe student needs to solve this assignment question:\n\nQuestion {}: {}",
        question.number, question.prompt_md
    );

    if !question.hints.is_empty() {
        prompt.push_str("\n\nAvailable hints for this question:");
        for hint in &question.hints {
            prompt.push_str("\n- ");
            prompt.push_str(hint);
        }
    }

    prompt
}

pub(crate) fn question_greeting(question: &Question) -> String {
    format!(
        "Hi! I'm here to help you work through this assignment question:\n\n\
         **Question {}:** {}\n\n\
         Before we dive in, I'd like to understand your initial thoughts. \
         What's your first impression of this question? \
         What concepts or ideas come to mind when you read it?\n\n\
         Take your time - there's no rush. Let's work through this together!",
        question.number, question.prompt_md
    )
}

/// The two messages every question-scoped conversation starts with.
pub(crate) fn question_seed(question: &Question) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(question_system_prompt(question)),
        ChatMessage::assistant(question_greeting(question)),
    ]
}

pub(crate) fn question_summary(assignment_title: &str, question: &Question) -> String {
    format!("{assignment_title} - Q{}", question.number)
}

pub(crate) fn is_placeholder_summary(summary: &str) -> bool {
    let summary = summary.trim();
    summary.is_empty() || summary == PLACEHOLDER_SUMMARY
}
