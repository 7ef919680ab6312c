//! Identifier case conversion used for table names and record keys.

use std::sync::LazyLock;

use regex::Regex;

static WORD_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("invalid word boundary regex"));
static DOUBLE_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__([A-Z])").expect("invalid double underscore regex"));
static LOWER_UPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("invalid case transition regex"));

/// Convert a type name such as `UserAccount` into `user_account`.
///
/// Inserts an underscore before every capitalized word, collapses a double
/// underscore in front of a capital, splits lower-to-upper transitions and
/// lowercases the result. Total over all input strings.
pub fn to_snake_case(name: &str) -> String {
    let spaced = WORD_BOUNDARY.replace_all(name, "${1}_${2}");
    let collapsed = DOUBLE_UNDERSCORE.replace_all(&spaced, "_${1}");
    LOWER_UPPER
        .replace_all(&collapsed, "${1}_${2}")
        .to_lowercase()
}

/// Convert a snake_case key such as `created_at` into `createdAt`.
pub fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, segment) in key.split('_').filter(|s| !s.is_empty()).enumerate() {
        if i == 0 {
            out.push_str(segment);
            continue;
        }
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case_simple_words() {
        assert_eq!(to_snake_case("UserAccount"), "user_account");
        assert_eq!(to_snake_case("Account"), "account");
        assert_eq!(to_snake_case("OrderLineItem"), "order_line_item");
    }

    #[test]
    fn test_snake_case_acronyms_and_digits() {
        assert_eq!(to_snake_case("HTTPRequest"), "http_request");
        assert_eq!(to_snake_case("OAuth2Token"), "o_auth2_token");
        assert_eq!(to_snake_case("Version2Entry"), "version2_entry");
    }

    #[test]
    fn test_snake_case_is_total() {
        assert_eq!(to_snake_case(""), "");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_snake_case("A"), "a");
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(to_camel_case("created_at"), "createdAt");
        assert_eq!(to_camel_case("id"), "id");
        assert_eq!(to_camel_case("team_member_count"), "teamMemberCount");
        assert_eq!(to_camel_case(""), "");
    }
}
