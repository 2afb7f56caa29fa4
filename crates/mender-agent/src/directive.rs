//! Directive parser
//!
//! Extracts the first `refactor service '<name>'` (quoted) or
//! `refactor service <name>` (bare word) instruction from advisory text.
//! The extracted name is untrusted; it is validated before any filesystem
//! or process action.

use mender_core::RefactorDirective;
use regex::Regex;
use std::sync::OnceLock;

static QUOTED: OnceLock<Regex> = OnceLock::new();
static BARE: OnceLock<Regex> = OnceLock::new();

fn quoted() -> &'static Regex {
    QUOTED.get_or_init(|| Regex::new(r"(?i)refactor\s+service\s+'([^']+)'").expect("valid regex"))
}

fn bare() -> &'static Regex {
    BARE.get_or_init(|| Regex::new(r"(?i)refactor\s+service\s+(\w+)").expect("valid regex"))
}

/// Find a refactor directive in `text`
///
/// The quoted form wins whenever it appears anywhere in the text; the bare
/// form is only tried when no quoted form exists.
pub fn parse_directive(text: &str) -> Option<RefactorDirective> {
    let name = quoted()
        .captures(text)
        .or_else(|| bare().captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())?;

    Some(RefactorDirective::new(name))
}

/// Cheap pre-check: does the text mention refactoring at all
pub fn mentions_refactor(text: &str) -> bool {
    text.to_lowercase().contains("refactor")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_form() {
        let d = parse_directive("... you should refactor service 'payments-api' now ...").unwrap();
        assert_eq!(d.service_name, "payments-api");
        assert!(d.instructions.is_none());
    }

    #[test]
    fn test_bare_form() {
        let d = parse_directive("... refactor service payments_api ...").unwrap();
        assert_eq!(d.service_name, "payments_api");
    }

    #[test]
    fn test_no_mention() {
        assert!(parse_directive("no mention here").is_none());
        assert!(parse_directive("refactor the service layer").is_none());
    }

    #[test]
    fn test_case_insensitive_and_whitespace() {
        let d = parse_directive("REFACTOR   Service\n'web'").unwrap();
        assert_eq!(d.service_name, "web");
    }

    #[test]
    fn test_quoted_preferred_over_earlier_bare() {
        let d =
            parse_directive("refactor service cache, or better refactor service 'web'").unwrap();
        assert_eq!(d.service_name, "web");
    }

    #[test]
    fn test_first_quoted_match_wins() {
        let d = parse_directive("refactor service 'a' then refactor service 'b'").unwrap();
        assert_eq!(d.service_name, "a");
    }

    #[test]
    fn test_bare_stops_at_non_word() {
        let d = parse_directive("refactor service web-frontend please").unwrap();
        assert_eq!(d.service_name, "web");
    }

    #[test]
    fn test_mentions_refactor() {
        assert!(mentions_refactor("[GPT-4 SAYS]\nRefactor it"));
        assert!(!mentions_refactor("restart the container"));
    }
}
