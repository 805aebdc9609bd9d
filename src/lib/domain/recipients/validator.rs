//! Parsing free text into a validated recipient set

use std::{fmt, str::FromStr};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use super::{errors::RecipientsError, RecipientAddress, RecipientAddressError, RecipientSet};

lazy_static! {
    static ref SEPARATORS: Regex = Regex::new(r"[,;\s]+").unwrap();
}

/// Most addresses accepted in one submission
pub const DEFAULT_MAX_ADDRESSES: usize = 1000;

/// How many invalid entries the summary lists before collapsing the rest
const SUMMARY_LIMIT: usize = 5;

/// What to do with addresses on a disposable-mail domain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisposablePolicy {
    /// Accept silently
    Allow,

    /// Accept, but report in [`RecipientReport::disposable`]
    Warn,

    /// Reject as invalid
    #[default]
    Reject,
}

impl FromStr for DisposablePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "warn" => Ok(Self::Warn),
            "reject" => Ok(Self::Reject),
            other => Err(format!(
                "unknown disposable policy \"{other}\", expected allow, warn or reject"
            )),
        }
    }
}

/// Options controlling [`normalize`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Drop repeated addresses before counting
    pub deduplicate: bool,

    /// Treatment of disposable domains
    pub disposable: DisposablePolicy,

    /// Upper bound on the number of parsed entries
    pub max_addresses: usize,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            deduplicate: true,
            disposable: DisposablePolicy::default(),
            max_addresses: DEFAULT_MAX_ADDRESSES,
        }
    }
}

/// An entry that failed validation
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InvalidRecipient {
    /// The token as it was parsed
    pub input: String,

    /// Why it was rejected
    #[serde(serialize_with = "serialize_display")]
    pub reason: RecipientAddressError,
}

impl fmt::Display for InvalidRecipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.input, self.reason)
    }
}

/// The result of validating a block of free text
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RecipientReport {
    /// Number of entries parsed from the input
    pub total: usize,

    /// Entries that passed validation, in input order
    pub valid: Vec<RecipientAddress>,

    /// Entries that failed validation, in input order
    pub invalid: Vec<InvalidRecipient>,

    /// Accepted addresses on a disposable domain (only under [`DisposablePolicy::Warn`])
    pub disposable: Vec<RecipientAddress>,
}

impl RecipientReport {
    /// Human-readable list of the first few invalid entries.
    ///
    /// Returns `None` when every entry was valid.
    pub fn invalid_summary(&self) -> Option<String> {
        if self.invalid.is_empty() {
            return None;
        }

        let mut summary = self
            .invalid
            .iter()
            .take(SUMMARY_LIMIT)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");

        if self.invalid.len() > SUMMARY_LIMIT {
            summary.push_str(&format!(
                " (and {} more)",
                self.invalid.len() - SUMMARY_LIMIT
            ));
        }

        Some(summary)
    }

    /// Warning about accepted disposable addresses, if any
    pub fn disposable_warning(&self) -> Option<String> {
        if self.disposable.is_empty() || !self.invalid.is_empty() {
            return None;
        }

        Some(format!(
            "Warning: {} disposable email(s) detected",
            self.disposable.len()
        ))
    }

    /// Turn the report into a recipient set.
    ///
    /// Refuses when any entry was invalid, unless `allow_invalid` is set, in
    /// which case the invalid entries are dropped.
    pub fn into_recipients(self, allow_invalid: bool) -> Result<RecipientSet, RecipientsError> {
        if !allow_invalid {
            if let Some(summary) = self.invalid_summary() {
                return Err(RecipientsError::Invalid(summary));
            }
        }

        Ok(self.valid.into_iter().collect())
    }
}

/// Split free text on commas, semicolons and whitespace into normalized tokens.
pub fn tokenize(raw: &str, deduplicate: bool) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();

    SEPARATORS
        .split(raw)
        .map(|token| token.trim().to_lowercase())
        .filter(|token| !token.is_empty())
        .filter(|token| !deduplicate || seen.insert(token.clone()))
        .collect()
}

/// Validate a single address under `policy`.
pub fn validate(
    raw: &str,
    policy: &ValidationPolicy,
) -> Result<RecipientAddress, RecipientAddressError> {
    RecipientAddress::parse_with(raw, policy.disposable == DisposablePolicy::Reject)
}

/// Parse and validate a block of free text.
pub fn normalize(raw: &str, policy: &ValidationPolicy) -> Result<RecipientReport, RecipientsError> {
    if raw.trim().is_empty() {
        return Err(RecipientsError::Empty);
    }

    let tokens = tokenize(raw, policy.deduplicate);

    if tokens.is_empty() {
        return Err(RecipientsError::NoAddresses);
    }

    if tokens.len() > policy.max_addresses {
        return Err(RecipientsError::TooMany {
            max: policy.max_addresses,
            provided: tokens.len(),
        });
    }

    let mut report = RecipientReport {
        total: tokens.len(),
        ..Default::default()
    };

    for token in tokens {
        match validate(&token, policy) {
            Ok(address) => {
                if policy.disposable == DisposablePolicy::Warn && address.is_disposable() {
                    report.disposable.push(address.clone());
                }

                report.valid.push(address);
            }
            Err(reason) => report.invalid.push(InvalidRecipient {
                input: token,
                reason,
            }),
        }
    }

    Ok(report)
}

fn serialize_display<T: fmt::Display, S: serde::Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn test_tokenize_splits_on_every_separator() {
        let tokens = tokenize("a@x.com, b@x.com;c@x.com\nd@x.com\te@x.com  f@x.com", true);

        assert_eq!(
            tokens,
            vec!["a@x.com", "b@x.com", "c@x.com", "d@x.com", "e@x.com", "f@x.com"]
        );
    }

    #[test]
    fn test_duplicates_differing_in_case_and_whitespace_collapse() -> TestResult {
        let report = normalize("a@x.com\nA@X.com ", &ValidationPolicy::default())?;
        let recipients = report.into_recipients(false)?;

        let listed: Vec<&str> = recipients.iter().map(RecipientAddress::as_str).collect();

        assert_eq!(listed, vec!["a@x.com"]);

        Ok(())
    }

    #[test]
    fn test_deduplication_can_be_disabled() -> TestResult {
        let policy = ValidationPolicy {
            deduplicate: false,
            ..Default::default()
        };

        let report = normalize("a@x.com a@x.com", &policy)?;

        assert_eq!(report.total, 2);
        assert_eq!(report.valid.len(), 2);

        Ok(())
    }

    #[test]
    fn test_normalize_is_idempotent() -> TestResult {
        let policy = ValidationPolicy::default();
        let once = normalize("B@x.com; a@Y.org,, b@x.com\n c@z.net", &policy)?
            .into_recipients(false)?;
        let twice = normalize(&once.to_string(), &policy)?.into_recipients(false)?;

        assert_eq!(once, twice);

        Ok(())
    }

    #[test]
    fn test_rejected_inputs_carry_a_reason() -> TestResult {
        let long = format!("{}@example.com", "a".repeat(243));
        let raw = format!("not-an-email a@@b.com a..b@c.com {long}");

        let report = normalize(&raw, &ValidationPolicy::default())?;

        assert!(report.valid.is_empty());
        assert_eq!(
            report
                .invalid
                .iter()
                .map(|invalid| invalid.reason.clone())
                .collect::<Vec<_>>(),
            vec![
                RecipientAddressError::InvalidFormat,
                RecipientAddressError::InvalidFormat,
                RecipientAddressError::ConsecutiveDots,
                RecipientAddressError::TooLong,
            ]
        );

        Ok(())
    }

    #[test]
    fn test_invalid_entries_block_without_override() -> TestResult {
        let report = normalize("good@x.com bad", &ValidationPolicy::default())?;

        let result = report.clone().into_recipients(false);

        assert!(matches!(result, Err(RecipientsError::Invalid(ref summary)) if summary == "bad (Invalid email format)"));

        let recipients = report.into_recipients(true)?;

        assert_eq!(recipients.len(), 1);

        Ok(())
    }

    #[test]
    fn test_invalid_summary_is_capped() -> TestResult {
        let raw = (1..=8).map(|i| format!("bad{i}")).collect::<Vec<_>>().join(" ");

        let report = normalize(&raw, &ValidationPolicy::default())?;

        let summary = report.invalid_summary().unwrap_or_default();

        assert!(summary.starts_with("bad1 (Invalid email format); bad2"));
        assert!(summary.contains("bad5"));
        assert!(!summary.contains("bad6"));
        assert!(summary.ends_with("(and 3 more)"));

        Ok(())
    }

    #[test]
    fn test_disposable_policy() -> TestResult {
        let raw = "real@example.com temp@mailinator.com";

        let rejected = normalize(raw, &ValidationPolicy::default())?;
        assert_eq!(
            rejected.invalid[0].reason,
            RecipientAddressError::DisposableDomain("mailinator.com".to_string())
        );

        let warned = normalize(
            raw,
            &ValidationPolicy {
                disposable: DisposablePolicy::Warn,
                ..Default::default()
            },
        )?;
        assert_eq!(warned.valid.len(), 2);
        assert_eq!(
            warned.disposable_warning().as_deref(),
            Some("Warning: 1 disposable email(s) detected")
        );

        let allowed = normalize(
            raw,
            &ValidationPolicy {
                disposable: DisposablePolicy::Allow,
                ..Default::default()
            },
        )?;
        assert_eq!(allowed.valid.len(), 2);
        assert!(allowed.disposable.is_empty());

        Ok(())
    }

    #[test]
    fn test_empty_and_oversized_input() {
        let policy = ValidationPolicy {
            max_addresses: 2,
            ..Default::default()
        };

        assert!(matches!(normalize("  ", &policy), Err(RecipientsError::Empty)));
        assert!(matches!(
            normalize(",;,", &policy),
            Err(RecipientsError::NoAddresses)
        ));
        assert!(matches!(
            normalize("a@x.com b@x.com c@x.com", &policy),
            Err(RecipientsError::TooMany {
                max: 2,
                provided: 3
            })
        ));
    }
}
