//! Field rules for usernames, emails and passwords
//!
//! Messages are phrased for end users; the frontend shows them verbatim under
//! the offending field.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Longest username accepted
pub const USERNAME_MAX_LENGTH: usize = 150;

/// Longest email accepted
pub const EMAIL_MAX_LENGTH: usize = 254;

/// Longest first/last name accepted
pub const NAME_MAX_LENGTH: usize = 150;

/// Password/attribute similarity at or above which a password is refused
const MAX_SIMILARITY: f64 = 0.7;

static USERNAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.@+-]+$").expect("username regex is valid"));

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\W+").expect("non-word regex is valid"));

static DOMAIN_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$").expect("domain label regex is valid")
});

static LOCAL_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-!#$%&'*+/=?^_`{}|~0-9a-z]+(\.[-!#$%&'*+/=?^_`{}|~0-9a-z]+)*$")
        .expect("local part regex is valid")
});

const COMMON_PASSWORDS: &[&str] = &[
    "123456", "password", "12345678", "qwerty", "123456789", "12345", "1234", "111111",
    "1234567", "dragon", "123123", "baseball", "abc123", "football", "monkey", "letmein",
    "696969", "shadow", "master", "666666", "qwertyuiop", "123321", "mustang", "1234567890",
    "michael", "654321", "superman", "1qaz2wsx", "7777777", "121212", "000000", "qazwsx",
    "123qwe", "killer", "trustno1", "jordan", "jennifer", "zxcvbnm", "asdfgh", "hunter",
    "buster", "soccer", "harley", "batman", "andrew", "tigger", "sunshine", "iloveyou",
    "2000", "charlie", "robert", "thomas", "hockey", "ranger", "daniel", "starwars",
    "klaster", "112233", "george", "computer", "michelle", "jessica", "pepper", "1111",
    "zxcvbn", "555555", "11111111", "131313", "freedom", "777777", "pass", "maggie",
    "159753", "aaaaaa", "ginger", "princess", "joshua", "cheese", "amanda", "summer",
    "love", "ashley", "nicole", "chelsea", "biteme", "matthew", "access", "yankees",
    "987654321", "dallas", "austin", "thunder", "taylor", "matrix", "password1",
    "password123", "welcome", "welcome1", "admin", "admin123", "qwerty123", "netflix",
    "netflix123", "passw0rd", "p@ssw0rd", "letmein1", "changeme", "secret", "abcd1234",
    "1q2w3e4r", "q1w2e3r4", "asdfghjkl", "iloveyou1", "football1", "monkey123",
];

/// Lowercase the domain part; the local part is kept as typed
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Problems with an email address
pub fn validate_email(email: &str) -> Vec<String> {
    if email.trim().is_empty() {
        return vec!["This field may not be blank.".to_string()];
    }
    if email.chars().count() > EMAIL_MAX_LENGTH {
        return vec![format!(
            "Ensure this field has no more than {} characters.",
            EMAIL_MAX_LENGTH
        )];
    }

    let valid = match email.rsplit_once('@') {
        Some((local, domain)) => {
            let domain = domain.to_lowercase();
            LOCAL_PART.is_match(&local.to_lowercase())
                && domain.contains('.')
                && domain.split('.').all(|label| DOMAIN_LABEL.is_match(label))
                && domain.rsplit('.').next().is_some_and(|tld| tld.len() >= 2)
        }
        None => false,
    };

    if valid {
        Vec::new()
    } else {
        vec!["Enter a valid email address.".to_string()]
    }
}

/// Problems with a username
pub fn validate_username(username: &str) -> Vec<String> {
    if username.is_empty() {
        return vec!["This field may not be blank.".to_string()];
    }
    let mut problems = Vec::new();
    if username.chars().count() > USERNAME_MAX_LENGTH {
        problems.push(format!(
            "Ensure this field has no more than {} characters.",
            USERNAME_MAX_LENGTH
        ));
    }
    if !USERNAME_PATTERN.is_match(username) {
        problems.push(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
                .to_string(),
        );
    }
    problems
}

/// Problems with a first or last name
pub fn validate_name(name: &str) -> Vec<String> {
    if name.chars().count() > NAME_MAX_LENGTH {
        vec![format!(
            "Ensure this field has no more than {} characters.",
            NAME_MAX_LENGTH
        )]
    } else {
        Vec::new()
    }
}

/// Account attributes a password must not resemble
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordContext<'a> {
    /// Username
    pub username: &'a str,
    /// Email address
    pub email: &'a str,
    /// Given name
    pub first_name: &'a str,
    /// Family name
    pub last_name: &'a str,
}

/// Password strength rules
#[derive(Debug, Clone, Copy)]
pub struct PasswordPolicy {
    min_length: usize,
}

impl PasswordPolicy {
    /// Policy with a minimum length
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }

    /// Every rule the password breaks
    pub fn check(&self, password: &str, context: &PasswordContext<'_>) -> Vec<String> {
        let mut problems = Vec::new();

        if let Some(attribute) = too_similar(password, context) {
            problems.push(format!("The password is too similar to the {}.", attribute));
        }
        if password.chars().count() < self.min_length {
            problems.push(format!(
                "This password is too short. It must contain at least {} characters.",
                self.min_length
            ));
        }
        if is_common(password) {
            problems.push("This password is too common.".to_string());
        }
        if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
            problems.push("This password is entirely numeric.".to_string());
        }

        problems
    }
}

fn is_common(password: &str) -> bool {
    let lower = password.trim().to_lowercase();
    COMMON_PASSWORDS.contains(&lower.as_str())
}

/// Name of the first attribute the password is too close to
fn too_similar(password: &str, context: &PasswordContext<'_>) -> Option<&'static str> {
    let password = password.to_lowercase();
    let attributes = [
        ("username", context.username),
        ("email address", context.email),
        ("first name", context.first_name),
        ("last name", context.last_name),
    ];

    for (label, value) in attributes {
        if value.is_empty() {
            continue;
        }
        let value = value.to_lowercase();
        let mut parts: Vec<&str> = NON_WORD.split(&value).filter(|p| !p.is_empty()).collect();
        parts.push(&value);

        for part in parts {
            if exceeds_length_ratio(&password, part) {
                continue;
            }
            if quick_ratio(&password, part) >= MAX_SIMILARITY {
                return Some(label);
            }
        }
    }
    None
}

/// A password far longer than the attribute can't be similar to it
fn exceeds_length_ratio(password: &str, value: &str) -> bool {
    let password_len = password.chars().count();
    let value_len = value.chars().count();
    let bound = MAX_SIMILARITY / 2.0 * password_len as f64;
    password_len >= 10 * value_len && (value_len as f64) < bound
}

/// Upper bound on sequence similarity: shared characters over total length
fn quick_ratio(a: &str, b: &str) -> f64 {
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return 1.0;
    }
    let mut available: HashMap<char, usize> = HashMap::new();
    for c in b.chars() {
        *available.entry(c).or_default() += 1;
    }
    let mut matches = 0;
    for c in a.chars() {
        if let Some(count) = available.get_mut(&c) {
            if *count > 0 {
                *count -= 1;
                matches += 1;
            }
        }
    }
    2.0 * matches as f64 / total as f64
}
