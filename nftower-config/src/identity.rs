//! Extraction of user identities from assumed-role ARNs.
//!
//! Access lists name users as STS assumed-role ARNs whose role session name
//! is the user's email, e.g.
//! `arn:aws:sts::563295687221:assumed-role/AWSReservedSSO_Developer_baa6fed639faf5e7/tess.thyer@sagebase.org`.

use tracing::warn;

use nftower_core::error::{Result, TowerError};
use nftower_core::is_valid_email;
use nftower_messages::{msg, MESSAGES};

/// What to do with an ARN that has no email-shaped session name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArnPolicy {
    /// Log a warning and leave the ARN out.
    #[default]
    Lenient,
    /// Reject the whole descriptor.
    Strict,
}

impl ArnPolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            ArnPolicy::Strict
        } else {
            ArnPolicy::Lenient
        }
    }
}

/// Return the email role session name carried by `arn`, if any.
pub fn extract_identity(arn: &str) -> Option<&str> {
    arn.rsplit_once('/')
        .map(|(_, session_name)| session_name)
        .filter(|session_name| is_valid_email(session_name))
}

/// Extract the emails of a list of ARNs, dropping duplicates but keeping
/// the first-seen order.
pub fn extract_identities<S: AsRef<str>>(arns: &[S], policy: ArnPolicy) -> Result<Vec<String>> {
    let mut emails: Vec<String> = Vec::new();
    for arn in arns {
        let arn = arn.as_ref();
        match extract_identity(arn) {
            Some(email) => {
                if !emails.iter().any(|e| e == email) {
                    emails.push(email.to_string());
                }
            }
            None => match policy {
                ArnPolicy::Lenient => {
                    warn!(arn = %arn, "{}", msg!(MESSAGES.config.arn_skipped, arn = arn));
                }
                ArnPolicy::Strict => {
                    return Err(TowerError::Validation(msg!(
                        MESSAGES.config.arn_rejected,
                        arn = arn
                    )));
                }
            },
        }
    }
    Ok(emails)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_ARNS: [&str; 3] = [
        "arn:aws:sts::563295687221:assumed-role/AWSReservedSSO_Viewer_19d3ce703c9acf2e/bruno.grande@sagebase.org",
        "arn:aws:sts::563295687221:assumed-role/AWSReservedSSO_Developer_baa6fed639faf5e7/tess.thyer@sagebase.org",
        "arn:aws:sts::563295687221:assumed-role/AWSReservedSSO_Administrator_934edbf73c05264e/thomas.yu@sagebase.org",
    ];

    const INVALID_ARNS: [&str; 3] = [
        "arn:aws:iam::035458030717:role/aws-reserved/sso.amazonaws.com/AWSReservedSSO_Administrator_580e9f32ac55c4e7",
        "arn:aws:sts::035458030717:assumed-role/AWSReservedSSO_Viewer_fd80909e6a51c6e7/thomas.yu",
        "arn:aws:sts::035458030717:assumed-role/AWSReservedSSO_Viewer_fd80909e6a51c6e7",
    ];

    #[test]
    fn test_extract_identity_valid() {
        for arn in VALID_ARNS {
            let expected = arn.rsplit('/').next().unwrap();
            assert_eq!(extract_identity(arn), Some(expected));
        }
    }

    #[test]
    fn test_extract_identity_invalid() {
        for arn in INVALID_ARNS {
            assert_eq!(extract_identity(arn), None, "{arn}");
        }
    }

    #[test]
    fn test_extract_identity_requires_two_letter_tld() {
        assert_eq!(
            extract_identity("arn:aws:sts::1:assumed-role/Role/user@example.c"),
            None
        );
        assert_eq!(
            extract_identity("arn:aws:sts::1:assumed-role/Role/user@example.co"),
            Some("user@example.co")
        );
    }

    #[test]
    fn test_extract_identity_takes_last_segment_only() {
        assert_eq!(extract_identity("bruno.grande@sagebase.org"), None);
        assert_eq!(
            extract_identity("arn:aws:sts::1:assumed-role/Role/user@@example.org"),
            None
        );
        assert_eq!(
            extract_identity("arn:aws:sts::1:assumed-role/a@b.org/Role"),
            None
        );
    }

    #[test]
    fn test_extract_identities_preserves_order_and_dedups() {
        let arns = [VALID_ARNS[1], VALID_ARNS[0], VALID_ARNS[1]];
        let emails = extract_identities(&arns, ArnPolicy::Strict).unwrap();
        assert_eq!(
            emails,
            vec!["tess.thyer@sagebase.org", "bruno.grande@sagebase.org"]
        );
    }

    #[test]
    fn test_extract_identities_empty() {
        let arns: [&str; 0] = [];
        assert!(extract_identities(&arns, ArnPolicy::Strict).unwrap().is_empty());
    }

    #[test]
    fn test_lenient_policy_skips_invalid() {
        let arns = [VALID_ARNS[0], INVALID_ARNS[1]];
        let emails = extract_identities(&arns, ArnPolicy::Lenient).unwrap();
        assert_eq!(emails, vec!["bruno.grande@sagebase.org"]);
    }

    #[test]
    fn test_strict_policy_rejects_invalid() {
        for arn in INVALID_ARNS {
            let err = extract_identities(&[arn], ArnPolicy::Strict).unwrap_err();
            assert!(matches!(err, TowerError::Validation(_)));
            assert!(err.to_string().contains(arn));
        }
    }
}
