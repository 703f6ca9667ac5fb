//! Title annotation, matching `Policy.cpp::annotateTitle`: trim, substitute
//! a default when empty, then truncate to the stage's maximum length.

const MAX_TITLE_LENGTH: usize = 60;
const DEFAULT_TITLE: &str = "LIVE on Caffeine!";

/// Trim whitespace, substitute the default title if the result is empty,
/// then truncate to 60 characters.
pub fn annotate_title(title: &str) -> String {
    let trimmed = title.trim();
    let mut annotated = if trimmed.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        trimmed.to_string()
    };

    if annotated.chars().count() > MAX_TITLE_LENGTH {
        annotated = annotated.chars().take(MAX_TITLE_LENGTH).collect();
    }

    annotated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(annotate_title("  Title  "), "Title");
    }

    #[test]
    fn blank_title_becomes_default() {
        assert_eq!(annotate_title("     "), "LIVE on Caffeine!");
    }

    #[test]
    fn empty_title_becomes_default() {
        assert_eq!(annotate_title(""), "LIVE on Caffeine!");
    }

    #[test]
    fn overlong_title_truncates_to_sixty() {
        let long_title = "a".repeat(500);
        let annotated = annotate_title(&long_title);
        assert_eq!(annotated.len(), 60);
        assert!(annotated.chars().all(|c| c == 'a'));
    }

    #[test]
    fn title_at_exact_boundary_is_untouched() {
        let exact = "a".repeat(60);
        assert_eq!(annotate_title(&exact), exact);
    }
}
