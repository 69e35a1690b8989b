const SYSTEM_PROMPT: &str =
    "You are a helpful code review assistant that provides concise, actionable feedback.";

const REVIEW_INSTRUCTIONS: &str = "\
You are a senior software engineer reviewing a pull request.
Analyze the following code diff and provide:
1. A concise summary of the changes
2. Potential issues or bugs
3. Suggestions for improvements
4. Any security concerns
5. Code quality feedback

Format your response in markdown with clear sections.";

/// Build the system prompt for the analysis model.
///
/// # Examples
///
/// ```
/// use papa_review::prompt::build_system_prompt;
///
/// assert!(build_system_prompt().contains("code review"));
/// ```
pub fn build_system_prompt() -> String {
    SYSTEM_PROMPT.to_string()
}

/// Build the user prompt containing the diff to review.
///
/// # Examples
///
/// ```
/// use papa_review::prompt::build_review_prompt;
///
/// let prompt = build_review_prompt("+new line");
/// assert!(prompt.contains("+new line"));
/// assert!(prompt.contains("security concerns"));
/// ```
pub fn build_review_prompt(diff: &str) -> String {
    format!("{REVIEW_INSTRUCTIONS}\n\nHere's the diff:\n```diff\n{diff}\n```\n")
}
