//! Decides which upstream failures may be cached and replayed.
//!
//! A failure is cachable only when it is a deterministic, subject-specific
//! answer from the upstream protocol (domain not found, invalid domain
//! syntax). Transport errors, server errors, authentication failures and
//! throttling are transient and must reach upstream again on the next call.

use crate::domain::{QueryOutcome, RecordValue};
use shared::{Error, Result, UpstreamError};
use std::collections::HashSet;

const NEVER_CACHABLE: [u16; 4] = [401, 403, 408, 429];

#[derive(Clone, Debug)]
pub struct ErrorClassifier {
    statuses: HashSet<u16>,
    codes: HashSet<String>,
}

impl ErrorClassifier {
    pub fn new(
        statuses: impl IntoIterator<Item = u16>,
        codes: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
            codes: codes.into_iter().collect(),
        }
    }

    pub fn is_cachable(&self, status: Option<u16>, code: Option<&str>) -> bool {
        match status {
            Some(s) if s >= 500 || NEVER_CACHABLE.contains(&s) => return false,
            Some(s) if self.statuses.contains(&s) => return true,
            _ => {}
        }

        code.is_some_and(|c| self.codes.contains(c))
    }

    /// Marks the error's cachability according to this classifier.
    pub fn classify(&self, err: UpstreamError) -> UpstreamError {
        let cachable = self.is_cachable(err.status, err.code.as_deref());
        err.cachable(cachable)
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new([400, 404, 422], Vec::<String>::new())
    }
}

/// Folds an upstream query result into the outcome union.
///
/// Cachable failures become `QueryOutcome::CachableError`; everything else
/// propagates as `Error::UpstreamNonCachable`.
pub fn into_outcome(
    result: std::result::Result<RecordValue, UpstreamError>,
) -> Result<QueryOutcome> {
    match result {
        Ok(record) => Ok(QueryOutcome::Result(record)),
        Err(err) if err.cachable => Ok(QueryOutcome::CachableError(err)),
        Err(err) => Err(Error::UpstreamNonCachable(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_statuses() {
        let classifier = ErrorClassifier::default();

        assert!(classifier.is_cachable(Some(404), None));
        assert!(classifier.is_cachable(Some(400), None));
        assert!(!classifier.is_cachable(Some(401), None));
        assert!(!classifier.is_cachable(Some(429), None));
        assert!(!classifier.is_cachable(Some(502), None));
        assert!(!classifier.is_cachable(None, None));
    }

    #[test]
    fn test_codes_mark_protocol_errors() {
        let classifier = ErrorClassifier::new(Vec::<u16>::new(), ["DOMAIN_NOT_FOUND".to_string()]);

        assert!(classifier.is_cachable(Some(200), Some("DOMAIN_NOT_FOUND")));
        assert!(classifier.is_cachable(None, Some("DOMAIN_NOT_FOUND")));
        assert!(!classifier.is_cachable(Some(200), Some("RATE_LIMITED")));
    }

    #[test]
    fn test_transient_status_wins_over_code() {
        let classifier = ErrorClassifier::new(Vec::<u16>::new(), ["DOMAIN_NOT_FOUND".to_string()]);

        assert!(!classifier.is_cachable(Some(503), Some("DOMAIN_NOT_FOUND")));
        assert!(!classifier.is_cachable(Some(403), Some("DOMAIN_NOT_FOUND")));
    }

    #[test]
    fn test_classify_sets_flag() {
        let classifier = ErrorClassifier::default();

        let err = classifier.classify(UpstreamError::new(Some(404), None, "not found"));
        assert!(err.cachable);

        let err = classifier.classify(UpstreamError::transport("connection reset").cachable(true));
        assert!(!err.cachable);
    }

    #[test]
    fn test_into_outcome() {
        assert_eq!(
            into_outcome(Ok(json!({"a": 1}))).unwrap(),
            QueryOutcome::Result(json!({"a": 1}))
        );

        let cachable = UpstreamError::new(Some(404), None, "not found").cachable(true);
        assert_eq!(
            into_outcome(Err(cachable.clone())).unwrap(),
            QueryOutcome::CachableError(cachable)
        );

        let transient = UpstreamError::new(Some(502), None, "bad gateway");
        assert!(matches!(
            into_outcome(Err(transient)),
            Err(Error::UpstreamNonCachable(_))
        ));
    }
}
