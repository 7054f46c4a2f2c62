//! Three-tier redaction applied to every event payload before persistence
//! (spec §4.H). Mandatory, cannot be disabled by callers. A redaction pass
//! panics only on a regex-compile error at startup (fail fast on bad
//! config), never per-event.

use regex::Regex;

const T3_MAX_PAYLOAD_BYTES: usize = 8192;

/// T1: obvious secrets by pattern (tokens, keys, passwords).
const T1_PATTERNS: &[&str] = &[
    r"(?i)sk-[a-zA-Z0-9]{20,}",
    r"(?i)ghp_[a-zA-Z0-9]{20,}",
    r"(?i)Bearer\s+[A-Za-z0-9\-_.]{16,}",
    r#"(?i)("?password"?\s*[:=]\s*"?)[^\s"]{4,}"#,
    r#"(?i)("?api[_-]?key"?\s*[:=]\s*"?)[A-Za-z0-9\-_]{12,}"#,
];

pub struct Redactor {
    t1: Vec<Regex>,
    t2: Vec<Regex>,
}

impl Redactor {
    /// Compile the built-in T1 set plus operator-configured T2 patterns.
    /// Panics on a malformed `REDACTION_PATTERNS` entry — fail fast at
    /// startup rather than per event.
    pub fn new(extra_t2_patterns: &[String]) -> Self {
        let t1 = T1_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("built-in T1 pattern must compile"))
            .collect();
        let t2 = extra_t2_patterns
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("invalid REDACTION_PATTERNS entry '{p}': {e}")))
            .collect();
        Self { t1, t2 }
    }

    /// Run all three tiers in order. T1/T2 replace matches with `[REDACTED]`;
    /// T3 truncates the result to a configured byte cap.
    pub fn redact(&self, payload: &str) -> String {
        let mut text = payload.to_string();
        for re in &self.t1 {
            text = re.replace_all(&text, "[REDACTED]").into_owned();
        }
        for re in &self.t2 {
            text = re.replace_all(&text, "[REDACTED]").into_owned();
        }
        if text.len() > T3_MAX_PAYLOAD_BYTES {
            let mut cut = T3_MAX_PAYLOAD_BYTES;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            text.push_str("...[truncated]");
        }
        text
    }
}
