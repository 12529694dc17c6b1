//! Redaction of secrets in command lines and command output.

use std::sync::LazyLock;

use regex::Regex;

/// Replacement for masked values.
pub const MASK: &str = "***";

/// Keys whose values are considered sensitive.
const SANITIZE_KEYS: &[&str] = &[
    "adminPass",
    "admin_pass",
    "admin_password",
    "auth_password",
    "auth_token",
    "new_pass",
    "secret_uuid",
    "secret",
    "sys_pswd",
    "token",
    "configdrive",
    "CHAPPASSWORD",
    "encrypted_key",
    "private_key",
    "fernetkey",
    "sslkey",
    "passphrase",
    "cephxkey",
    "password",
];

struct KeyRules {
    key: String,
    /// Shapes with a value between two delimiters.
    delimited: Vec<Regex>,
    /// `key=value` with a bare value.
    bare: Regex,
}

impl KeyRules {
    fn new(key: &str) -> Self {
        let k = regex::escape(key);
        let delimited = [
            format!(r#"(?i)({k}\s*=\s*["'])[^"']*(["'])"#),
            format!(r#"(?i)({k}\s+["'])[^"']*(["'])"#),
            format!(r#"(?i)(--{k}\s+)[^'"=\s]+(\s*)"#),
            format!(r"(?i)(<{k}>)[^<]*(</{k}>)"),
            format!(r#"(?i)(["']{k}["']\s*:\s*["'])[^"']*(["'])"#),
        ]
        .iter()
        .map(|p| Regex::new(p).expect("Invalid mask pattern"))
        .collect();
        let bare = Regex::new(&format!(r#"(?i)({k}\s*=\s*)[^\s'"]+"#))
            .expect("Invalid mask pattern");

        Self {
            key: key.to_ascii_lowercase(),
            delimited,
            bare,
        }
    }
}

static RULES: LazyLock<Vec<KeyRules>> =
    LazyLock::new(|| SANITIZE_KEYS.iter().map(|k| KeyRules::new(k)).collect());

/// Replace the values of password-like fields in `text` with [`MASK`].
///
/// Handles `key=value`, `key="value"`, `key 'value'`, `--key value`,
/// `<key>value</key>` and `"key": "value"`, case-insensitively.
pub fn mask_password(text: &str) -> String {
    let lowered = text.to_ascii_lowercase();
    let mut out = text.to_string();

    for rules in RULES.iter() {
        if !lowered.contains(&rules.key) {
            continue;
        }
        for re in &rules.delimited {
            out = re.replace_all(&out, format!("${{1}}{MASK}${{2}}")).into_owned();
        }
        out = rules
            .bare
            .replace_all(&out, format!("${{1}}{MASK}"))
            .into_owned();
    }

    out
}
