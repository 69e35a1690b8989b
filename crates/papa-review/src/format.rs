//! Rendering of review comments.
//!
//! Every comment this crate posts carries [`SIGNATURE`]. Prior reviews are
//! found by a plain substring search for it, so the formatter must emit it
//! exactly once.

/// Marker embedded in every posted comment.
pub const SIGNATURE: &str = "Code Review Papa";

/// Posted instead of a review when the diff is over the size limit.
pub const TOO_LARGE_ADVISORY: &str = "⚠️ **Code Review Papa**: This PR is too large for automated review. Consider breaking it into smaller PRs for better feedback.";

/// Introductory header. Must not contain [`SIGNATURE`].
pub const HEADER: &str = "# 🧙‍♂️ Automated Pull Request Review

I've analyzed this pull request and have some feedback for you!

";

/// Closing footer. Carries the only copy of [`SIGNATURE`].
pub const FOOTER: &str = "

---
*This automated review was generated by [Code Review Papa](https://github.com/ziadalikhalifa/code-review-papa). If you find this helpful, please give it a ⭐!*
";

// Same words as SIGNATURE, joined by a no-break space so a substring
// search no longer matches.
const NEUTRALIZED_SIGNATURE: &str = "Code Review\u{a0}Papa";

const CONFLICTING_HEADER: &str = "code review";

/// Turn raw analysis text into the final comment body.
///
/// The header is skipped when the analysis already mentions "code review"
/// in any case, since the model tends to write its own heading. Copies of
/// the signature inside the analysis are neutralized so the result contains
/// it exactly once.
///
/// # Examples
///
/// ```
/// use papa_review::format::{format_comment, FOOTER, HEADER, SIGNATURE};
///
/// let body = format_comment("Looks good.");
/// assert!(body.starts_with(HEADER));
/// assert!(body.ends_with(FOOTER));
/// assert_eq!(body.matches(SIGNATURE).count(), 1);
///
/// let body = format_comment("## Code Review\n\nLooks good.");
/// assert!(!body.starts_with(HEADER));
/// ```
pub fn format_comment(analysis: &str) -> String {
    let analysis = analysis.replace(SIGNATURE, NEUTRALIZED_SIGNATURE);

    if analysis.to_lowercase().contains(CONFLICTING_HEADER) {
        return format!("{analysis}{FOOTER}");
    }

    format!("{HEADER}{analysis}{FOOTER}")
}

/// Whether a comment body was produced by this bot.
///
/// # Examples
///
/// ```
/// use papa_review::format::is_signed;
///
/// assert!(is_signed("Reviewed by Code Review Papa already"));
/// assert!(!is_signed("LGTM"));
/// ```
pub fn is_signed(body: &str) -> bool {
    body.contains(SIGNATURE)
}
