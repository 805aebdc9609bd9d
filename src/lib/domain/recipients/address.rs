//! Recipient address

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Serialize, Serializer};
use thiserror::Error;

use RecipientAddressError::*;

lazy_static! {
    static ref ADDRESS_REGEX: Regex = Regex::new(concat!(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@",
        r"[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?",
        r"(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    ))
    .unwrap();
}

/// Longest address accepted by the submission server (RFC 5321 path limit)
pub const MAX_ADDRESS_LENGTH: usize = 254;

/// Domains handing out short-lived, low-trust mailboxes
pub const DISPOSABLE_DOMAINS: [&str; 5] = [
    "tempmail.com",
    "throwaway.email",
    "guerrillamail.com",
    "10minutemail.com",
    "mailinator.com",
];

/// An error that can occur when parsing a recipient address
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecipientAddressError {
    /// The address is empty
    #[error("Email is empty")]
    Empty,

    /// The address is longer than [`MAX_ADDRESS_LENGTH`]
    #[error("Email too long (max 254 chars)")]
    TooLong,

    /// The address does not match the address grammar
    #[error("Invalid email format")]
    InvalidFormat,

    /// The domain is a known disposable-mail provider
    #[error("Disposable email domain not allowed: {0}")]
    DisposableDomain(String),

    /// The address contains `..`
    #[error("Consecutive dots not allowed")]
    ConsecutiveDots,

    /// The local part or the domain is missing
    #[error("Missing local or domain part")]
    MissingPart,

    /// The domain has no top-level domain
    #[error("Domain must have a TLD")]
    MissingTld,
}

/// A normalized (trimmed, lower-cased) and syntactically valid email address
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecipientAddress(String);

impl RecipientAddress {
    /// Normalize and validate a raw address.
    ///
    /// Disposable domains are accepted here; blocking them is a policy decision
    /// made by [`validate`](crate::domain::recipients::validate).
    pub fn parse(raw: &str) -> Result<Self, RecipientAddressError> {
        Self::parse_with(raw, false)
    }

    pub(super) fn parse_with(
        raw: &str,
        reject_disposable: bool,
    ) -> Result<Self, RecipientAddressError> {
        let normalized = raw.trim().to_lowercase();

        if normalized.is_empty() {
            return Err(Empty);
        }

        if normalized.len() > MAX_ADDRESS_LENGTH {
            return Err(TooLong);
        }

        if !ADDRESS_REGEX.is_match(&normalized) {
            return Err(InvalidFormat);
        }

        let address = Self(normalized);

        if reject_disposable && address.is_disposable() {
            return Err(DisposableDomain(address.domain().to_string()));
        }

        check_structure(address.as_str())?;

        Ok(address)
    }

    /// Wrap an address without validating it.
    pub fn new_unchecked(raw: &str) -> Self {
        Self(raw.to_string())
    }

    /// The address as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part after the `@`
    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map_or("", |(_, domain)| domain)
    }

    /// Whether the domain, or a domain it belongs to, is on the disposable-mail block list
    pub fn is_disposable(&self) -> bool {
        let domain = self.domain();

        DISPOSABLE_DOMAINS.iter().any(|blocked| {
            domain == *blocked
                || domain
                    .strip_suffix(blocked)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

fn check_structure(address: &str) -> Result<(), RecipientAddressError> {
    if address.contains("..") {
        return Err(ConsecutiveDots);
    }

    let Some((local, domain)) = address.split_once('@') else {
        return Err(MissingPart);
    };

    if local.is_empty() || domain.is_empty() {
        return Err(MissingPart);
    }

    if !domain.contains('.') {
        return Err(MissingTld);
    }

    Ok(())
}

impl fmt::Display for RecipientAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<RecipientAddress> for String {
    fn from(address: RecipientAddress) -> Self {
        address.0
    }
}

impl AsRef<str> for RecipientAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for RecipientAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn test_address_is_trimmed_and_lowercased() -> TestResult {
        let address = RecipientAddress::parse("  Jane.Doe@Example.COM \n")?;

        assert_eq!(address.as_str(), "jane.doe@example.com");

        Ok(())
    }

    #[test]
    fn test_address_display() -> TestResult {
        let address = RecipientAddress::parse("email@example.com")?;

        assert_eq!(format!("{}", address), "email@example.com".to_string());

        Ok(())
    }

    #[test]
    fn test_empty_address_is_invalid() {
        assert_eq!(RecipientAddress::parse("   "), Err(Empty));
    }

    #[test]
    fn test_address_without_at_symbol_is_invalid() {
        assert_eq!(RecipientAddress::parse("not-an-email"), Err(InvalidFormat));
    }

    #[test]
    fn test_address_with_two_at_symbols_is_invalid() {
        assert_eq!(RecipientAddress::parse("a@@b.com"), Err(InvalidFormat));
    }

    #[test]
    fn test_consecutive_dots_are_invalid() {
        assert_eq!(RecipientAddress::parse("a..b@c.com"), Err(ConsecutiveDots));
    }

    #[test]
    fn test_domain_without_tld_is_invalid() {
        assert_eq!(RecipientAddress::parse("user@localhost"), Err(MissingTld));
    }

    #[test]
    fn test_overlong_address_is_invalid() {
        let local = "a".repeat(MAX_ADDRESS_LENGTH + 1 - "@example.com".len());
        let raw = format!("{local}@example.com");

        assert_eq!(raw.len(), 255);
        assert_eq!(RecipientAddress::parse(&raw), Err(TooLong));
    }

    #[test]
    fn test_address_at_length_limit_is_valid() {
        let local = "a".repeat(MAX_ADDRESS_LENGTH - "@example.com".len());
        let raw = format!("{local}@example.com");

        assert!(RecipientAddress::parse(&raw).is_ok());
    }

    #[test]
    fn test_domain_label_cannot_start_with_hyphen() {
        assert_eq!(
            RecipientAddress::parse("user@-example.com"),
            Err(InvalidFormat)
        );
    }

    #[test]
    fn test_disposable_domain_detection() -> TestResult {
        assert!(RecipientAddress::parse("bot@mailinator.com")?.is_disposable());
        assert!(!RecipientAddress::parse("person@example.com")?.is_disposable());

        Ok(())
    }

    #[test]
    fn test_disposable_subdomains_are_detected() -> TestResult {
        assert!(RecipientAddress::parse("bot@x.mailinator.com")?.is_disposable());
        assert!(!RecipientAddress::parse("person@notmailinator.com")?.is_disposable());
        assert_eq!(
            RecipientAddress::parse_with("bot@inbox.tempmail.com", true),
            Err(DisposableDomain("inbox.tempmail.com".to_string()))
        );

        Ok(())
    }

    #[test]
    fn test_serializes_as_plain_string() -> TestResult {
        let address = RecipientAddress::parse("email@example.com")?;

        assert_eq!(serde_json::to_string(&address)?, r#""email@example.com""#);

        Ok(())
    }
}
