use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use decern_gate_api::Reference;
use decern_gate_client_api::{
    normalize_confidence, ClientError, ClientResult, DecisionJudge, JudgeCredentials, JudgeRequest,
    JudgeVerdict, ServiceEndpoint,
};

use crate::http::{excerpt, send, HttpTransport};

const JUDGE_PATH: &str = "api/decision-gate/judge";
const OPERATION: &str = "judge";
const PAYMENT_REQUIRED: u16 = 402;
const UNAVAILABLE_CODES: &[&str] = &["plan_required", "judge_unavailable"];

/// Runs the semantic judge with `POST /api/decision-gate/judge`.
#[derive(Debug, Clone)]
pub struct HttpDecisionJudge {
    transport: HttpTransport,
}

impl HttpDecisionJudge {
    /// Construct a judge client over the given transport.
    #[must_use]
    pub const fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JudgeBody<'a> {
    diff: &'a str,
    truncated: bool,
    excluded_files: &'a [String],
    base_sha: &'a str,
    head_sha: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    decision_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    adr_ref: Option<&'a str>,
    llm: LlmBody<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LlmBody<'a> {
    base_url: &'a str,
    api_key: &'a str,
    model: &'a str,
}

impl<'a> From<&'a JudgeCredentials> for LlmBody<'a> {
    fn from(credentials: &'a JudgeCredentials) -> Self {
        Self {
            base_url: &credentials.base_url,
            api_key: credentials.api_key.expose_secret(),
            model: &credentials.model,
        }
    }
}

impl<'a> From<&'a JudgeRequest> for JudgeBody<'a> {
    fn from(request: &'a JudgeRequest) -> Self {
        let (decision_id, adr_ref) = match &request.reference {
            Reference::Decision(id) => (Some(id.as_str()), None),
            Reference::Adr(code) => (None, Some(code.as_str())),
        };
        Self {
            diff: &request.diff.diff,
            truncated: request.diff.truncated,
            excluded_files: &request.diff.excluded_files,
            base_sha: &request.diff.base,
            head_sha: &request.diff.head,
            decision_id,
            adr_ref,
            llm: LlmBody::from(&request.credentials),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JudgeResponseBody {
    #[serde(default)]
    allowed: bool,
    reason: Option<String>,
    #[serde(default)]
    advisory: bool,
    confidence: Option<f64>,
    advisory_message: Option<String>,
    code: Option<String>,
    error: Option<String>,
}

impl JudgeResponseBody {
    fn message(&self) -> Option<String> {
        self.reason.clone().or_else(|| self.error.clone())
    }

    fn into_verdict(self) -> JudgeVerdict {
        JudgeVerdict {
            allowed: self.allowed,
            reason: self.reason,
            advisory: self.advisory,
            confidence: self.confidence.and_then(normalize_confidence),
            advisory_message: self.advisory_message,
        }
    }
}

impl DecisionJudge for HttpDecisionJudge {
    fn judge(
        &self,
        endpoint: &ServiceEndpoint,
        request: &JudgeRequest,
    ) -> ClientResult<JudgeVerdict> {
        tracing::debug!(
            reference = %request.reference,
            bytes = request.diff.diff.len(),
            truncated = request.diff.truncated,
            "submitting diff to judge"
        );
        let (status, body) = send(
            OPERATION,
            endpoint.timeout,
            self.transport
                .post(endpoint, JUDGE_PATH)
                .json(&JudgeBody::from(request)),
        )?;
        interpret_response(status, &body)
    }
}

fn interpret_response(status: u16, body: &str) -> ClientResult<JudgeVerdict> {
    let parsed = serde_json::from_str::<JudgeResponseBody>(body);

    if (200..300).contains(&status) {
        return parsed
            .map(JudgeResponseBody::into_verdict)
            .map_err(|err| ClientError::Decode {
                operation: OPERATION,
                message: err.to_string(),
            });
    }

    let parsed = parsed.unwrap_or_default();
    let plan_restricted = parsed
        .code
        .as_deref()
        .is_some_and(|code| UNAVAILABLE_CODES.contains(&code));
    if status == PAYMENT_REQUIRED || plan_restricted {
        return Err(ClientError::FeatureUnavailable {
            message: parsed
                .message()
                .unwrap_or_else(|| "the judge is not included in the current plan".to_owned()),
        });
    }

    Err(ClientError::Status {
        operation: OPERATION,
        status,
        message: parsed.message().unwrap_or_else(|| excerpt(body)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use decern_gate_api::JudgeDiffResult;

    fn request(reference: Reference) -> JudgeRequest {
        JudgeRequest {
            diff: JudgeDiffResult {
                diff: "diff --git a/a.rs b/a.rs".into(),
                excluded_files: vec!["logo.png".into()],
                truncated: false,
                base: "base".into(),
                head: "head".into(),
            },
            reference,
            credentials: JudgeCredentials {
                base_url: "https://llm.test".into(),
                api_key: "sk".into(),
                model: "gpt".into(),
            },
        }
    }

    #[test]
    fn body_names_the_reference_kind() {
        let decision = request(Reference::Decision("abc".into()));
        let json = serde_json::to_value(JudgeBody::from(&decision)).expect("serialize");
        assert_eq!(json["decisionId"], "abc");
        assert!(json.get("adrRef").is_none());
        assert_eq!(json["baseSha"], "base");
        assert_eq!(json["llm"]["apiKey"], "sk");
        assert_eq!(json["llm"]["baseUrl"], "https://llm.test");
        assert_eq!(json["llm"]["model"], "gpt");

        let adr = request(Reference::Adr("ADR-2".into()));
        let json = serde_json::to_value(JudgeBody::from(&adr)).expect("serialize");
        assert_eq!(json["adrRef"], "ADR-2");
        assert!(json.get("decisionId").is_none());
    }

    #[test]
    fn success_normalizes_percent_confidence() {
        let verdict = interpret_response(200, r#"{"allowed":true,"confidence":92}"#)
            .expect("verdict");
        assert!(verdict.allowed);
        assert_eq!(verdict.confidence, Some(0.92));
    }

    #[test]
    fn payment_required_is_feature_unavailable() {
        let err = interpret_response(402, "").expect_err("unavailable");
        assert!(matches!(err, ClientError::FeatureUnavailable { .. }));
    }

    #[test]
    fn plan_code_is_feature_unavailable() {
        let err = interpret_response(403, r#"{"code":"plan_required","reason":"upgrade"}"#)
            .expect_err("unavailable");
        match err {
            ClientError::FeatureUnavailable { message } => assert_eq!(message, "upgrade"),
            other => panic!("expected FeatureUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn other_failures_keep_status() {
        let err = interpret_response(500, "<html>boom</html>").expect_err("status");
        match err {
            ClientError::Status { status, message, .. } => {
                assert_eq!(status, 500);
                assert_eq!(message, "<html>boom</html>");
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }
}
