//! Random code value and share token generation.
//!
//! Both are drawn from the operating system RNG over a 62-symbol alphabet:
//! 24 symbols (~142 bits) for code values and 32 symbols (~190 bits) for share tokens.

use once_cell::sync::Lazy;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use regex::Regex;

/// Prefix of every scanner-facing code value.
pub const CODE_VALUE_PREFIX: &str = "acc_";

/// Prefix of every share token.
pub const SHARE_TOKEN_PREFIX: &str = "token_";

/// Random symbols after the code value prefix.
pub const CODE_VALUE_LEN: usize = 24;

/// Random symbols after the share token prefix.
pub const SHARE_TOKEN_LEN: usize = 32;

static CODE_VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^acc_[A-Za-z0-9]{24}$").expect("code value pattern is valid"));

static SHARE_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^token_[A-Za-z0-9]{32}$").expect("share token pattern is valid"));

/// Generate a fresh scanner-facing code value.
#[must_use]
pub fn generate_code_value() -> String {
    format!("{CODE_VALUE_PREFIX}{}", random_symbols(CODE_VALUE_LEN))
}

/// Generate a fresh share token.
#[must_use]
pub fn generate_share_token() -> String {
    format!("{SHARE_TOKEN_PREFIX}{}", random_symbols(SHARE_TOKEN_LEN))
}

/// Returns `true` if `value` has the shape of a code value.
#[must_use]
pub fn is_valid_code_value(value: &str) -> bool {
    CODE_VALUE_RE.is_match(value)
}

/// Returns `true` if `token` has the shape of a share token.
#[must_use]
pub fn is_valid_share_token(token: &str) -> bool {
    SHARE_TOKEN_RE.is_match(token)
}

fn random_symbols(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
