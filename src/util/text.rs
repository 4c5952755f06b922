/// Normalizes a nullable text column: `None` becomes an empty string and
/// surrounding whitespace is trimmed.
///
/// Avoids reallocating when the value is already trimmed.
///
/// # Examples
///
/// ```
/// use rss_migrate::util::strip_to_empty;
///
/// assert_eq!(strip_to_empty(None), "");
/// assert_eq!(strip_to_empty(Some("  Tech  ".to_string())), "Tech");
/// ```
pub fn strip_to_empty(value: Option<String>) -> String {
    match value {
        None => String::new(),
        Some(s) => {
            let trimmed = s.trim();
            if trimmed.len() == s.len() {
                s
            } else {
                trimmed.to_owned()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_becomes_empty() {
        assert_eq!(strip_to_empty(None), "");
    }

    #[test]
    fn test_surrounding_whitespace_trimmed() {
        assert_eq!(
            strip_to_empty(Some("\t https://example.com/rss \n".to_string())),
            "https://example.com/rss"
        );
    }

    #[test]
    fn test_inner_whitespace_preserved() {
        assert_eq!(
            strip_to_empty(Some(" Linux  News ".to_string())),
            "Linux  News"
        );
    }

    #[test]
    fn test_whitespace_only_becomes_empty() {
        assert_eq!(strip_to_empty(Some("   \r\n".to_string())), "");
    }

    #[test]
    fn test_unicode_preserved() {
        assert_eq!(strip_to_empty(Some(" 世界 ".to_string())), "世界");
    }
}
