use decern_gate_api::Reference;
use decern_gate_client_api::{
    ClientError, ClientResult, DecisionValidator, ServiceEndpoint, ValidationOutcome,
    ValidationRequest,
};

use crate::http::{excerpt, send, HttpTransport};

const VALIDATE_PATH: &str = "api/decision-gate/validate";
const OPERATION: &str = "validation";

/// Validates references with `GET /api/decision-gate/validate`.
#[derive(Debug, Clone)]
pub struct HttpDecisionValidator {
    transport: HttpTransport,
}

impl HttpDecisionValidator {
    /// Construct a validator over the given transport.
    #[must_use]
    pub const fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

impl DecisionValidator for HttpDecisionValidator {
    fn validate(
        &self,
        endpoint: &ServiceEndpoint,
        request: &ValidationRequest,
    ) -> ClientResult<ValidationOutcome> {
        let query = validation_query(request);
        tracing::debug!(reference = %request.reference, "validating reference");
        let (status, body) = send(
            OPERATION,
            endpoint.timeout,
            self.transport.get(endpoint, VALIDATE_PATH).query(&query),
        )?;

        let mut outcome = match serde_json::from_str::<ValidationOutcome>(&body) {
            Ok(outcome) => outcome,
            Err(err) if status == 200 => {
                return Err(ClientError::Decode {
                    operation: OPERATION,
                    message: err.to_string(),
                })
            }
            Err(_) => ValidationOutcome {
                reason: Some(excerpt(&body)).filter(|text| !text.is_empty()),
                ..ValidationOutcome::default()
            },
        };
        outcome.http_status = status;
        tracing::debug!(status, valid = outcome.valid, "validation response");
        Ok(outcome)
    }
}

fn validation_query(request: &ValidationRequest) -> Vec<(&'static str, String)> {
    let reference = match &request.reference {
        Reference::Adr(code) => ("adrRef", code.clone()),
        Reference::Decision(id) => ("decisionId", id.clone()),
    };
    let mut query = vec![reference, ("highImpact", request.high_impact.to_string())];
    if request.require_linked_pr {
        query.push(("requireLinkedPR", "true".to_owned()));
    }
    query
}
