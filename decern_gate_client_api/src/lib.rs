//! Interfaces the gate uses to reach the decision service.
//!
//! Both calls are synchronous and single-shot: implementations perform one
//! request bounded by the endpoint timeout and report every failure as a
//! [`ClientError`] value.

mod types;

pub use types::{
    normalize_confidence, ClientError, ClientResult, JudgeCredentials, JudgeRequest, JudgeVerdict,
    ServiceEndpoint, ValidationOutcome, ValidationRequest,
};

/// Checks whether a reference points at an approved decision.
pub trait DecisionValidator {
    /// Validate one reference against the decision service.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] for transport failures, timeouts and
    /// undecodable responses. A well-formed rejection is an `Ok` outcome.
    fn validate(
        &self,
        endpoint: &ServiceEndpoint,
        request: &ValidationRequest,
    ) -> ClientResult<ValidationOutcome>;
}

/// Asks the service to compare a diff against the referenced decision.
pub trait DecisionJudge {
    /// Submit the bounded diff for semantic review.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::FeatureUnavailable`] when the caller's plan does
    /// not include the judge, and other variants for transport or protocol
    /// failures.
    fn judge(&self, endpoint: &ServiceEndpoint, request: &JudgeRequest)
        -> ClientResult<JudgeVerdict>;
}
