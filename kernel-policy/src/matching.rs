//! Glob and domain pattern matching.
//!
//! DESIGN NOTE (spec.md §9, first open question): the teacher's source
//! mixed naive prefix matching (`StartsWith`) with explicit wildcards.
//! This kernel picks one algorithm — `*`/`?` glob, compiled to an
//! anchored regex — and applies it uniformly everywhere a rule subject
//! is matched.

use regex::Regex;

/// Compile a `*`/`?` glob into an anchored regex. `*` matches any run
/// of characters (including none); `?` matches exactly one character.
fn compile_glob(pattern: &str, case_insensitive: bool) -> Regex {
    let mut regex_str = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => regex_str.push_str(".*"),
            '?' => regex_str.push('.'),
            other => regex_str.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex_str.push('$');
    let prefix = if case_insensitive { "(?i)" } else { "" };
    Regex::new(&format!("{prefix}{regex_str}")).expect("glob compiles to a valid regex")
}

/// Case-sensitive glob match, used for tool ids and plugin ids.
pub fn glob_match(pattern: &str, subject: &str) -> bool {
    compile_glob(pattern, false).is_match(subject)
}

/// Case-insensitive glob match, used for domain host patterns.
pub fn glob_match_ci(pattern: &str, subject: &str) -> bool {
    compile_glob(pattern, true).is_match(subject)
}

/// `pattern` matches `host` if they are equal (case-insensitively) or
/// `host` is a subdomain of `pattern` — subdomain matching is
/// mandatory and unconditional, independent of whether `pattern`
/// itself contains glob characters.
pub fn domain_matches(pattern: &str, host: &str) -> bool {
    let pattern_lower = pattern.to_ascii_lowercase();
    let host_lower = host.to_ascii_lowercase();

    if glob_match_ci(&pattern_lower, &host_lower) {
        return true;
    }
    host_lower.ends_with(&format!(".{pattern_lower}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_any_run() {
        assert!(glob_match("shell-*", "shell-exec"));
        assert!(glob_match("shell-*", "shell-"));
        assert!(!glob_match("shell-*", "sh-exec"));
    }

    #[test]
    fn question_matches_one_char() {
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "abbc"));
    }

    #[test]
    fn domain_exact_and_subdomain_match() {
        assert!(domain_matches("blocked.com", "blocked.com"));
        assert!(domain_matches("blocked.com", "api.blocked.com"));
        assert!(domain_matches("blocked.com", "deep.api.blocked.com"));
        assert!(!domain_matches("blocked.com", "notblocked.com"));
    }

    #[test]
    fn domain_matching_is_case_insensitive() {
        assert!(domain_matches("Blocked.COM", "api.blocked.com"));
    }

    #[test]
    fn plugin_id_matching_is_case_sensitive() {
        assert!(glob_match("com.x.*", "com.x.greeter"));
        assert!(!glob_match("com.x.*", "COM.X.GREETER"));
    }
}
