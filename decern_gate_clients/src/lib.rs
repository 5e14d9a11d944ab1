//! HTTP clients for the decision service.

mod http;
mod judge;
mod validator;

pub use http::HttpTransport;
pub use judge::HttpDecisionJudge;
pub use validator::HttpDecisionValidator;

use decern_gate_client_api::ClientResult;

/// Build the validator and judge sharing one connection pool.
///
/// # Errors
///
/// Fails when the underlying HTTP client cannot be initialised.
pub fn default_clients() -> ClientResult<(HttpDecisionValidator, HttpDecisionJudge)> {
    let transport = HttpTransport::new()?;
    Ok((
        HttpDecisionValidator::new(transport.clone()),
        HttpDecisionJudge::new(transport),
    ))
}
