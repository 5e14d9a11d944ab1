//! The gate pipeline: policy, references, validation and the optional judge.
//!
//! Every external failure is folded into a [`GateOutcome`]; nothing in here
//! returns an error to the caller. The pipeline stops at the first blocking
//! step, and the accompanying [`GateReport`] records each decision point.

use std::fmt;

use decern_gate_client_api::{
    ClientError, DecisionJudge, DecisionValidator, JudgeRequest, JudgeVerdict, ServiceEndpoint,
    ValidationOutcome, ValidationRequest,
};

use crate::config::{GateConfig, MissingSettings, JUDGE_MIN_CONFIDENCE_VAR};
use crate::diff::DiffEngine;
use crate::policy::HighImpactPolicy;
use crate::references::extract_references;
use crate::report::GateReport;
use crate::repository::DiffSource;
use crate::{Reference, RevisionPair};

/// Why a run passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassReason {
    /// No changed path is high-impact.
    NotRequired,
    /// A reference validated and the judge step is off.
    Validated,
    /// The judge accepted the change.
    JudgeAllowed,
    /// The judge rejected the change in advisory mode.
    JudgeAdvisory,
    /// The judge is not available on the caller's plan.
    JudgeUnavailable,
    /// The judge diff was empty after filtering.
    NothingToJudge,
}

/// Why a run was blocked.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockReason {
    /// Required variables are not set.
    MissingConfig(Vec<&'static str>),
    /// Configuration could not be loaded.
    InvalidConfig(String),
    /// Changed files could not be determined.
    DiffUnavailable(String),
    /// No reference in the PR or commit text.
    NoReferences,
    /// None of the references validated.
    NoValidReference,
    /// The judge found the change inconsistent with the decision.
    JudgeRejected(String),
    /// The judge allowed the change below the configured confidence.
    LowConfidence {
        /// Reported confidence, if any.
        confidence: Option<f64>,
        /// Configured minimum.
        threshold: f64,
    },
    /// The judge call itself failed.
    JudgeFailed(String),
}

impl BlockReason {
    /// What to do about it.
    #[must_use]
    pub fn remediation(&self) -> String {
        match self {
            Self::MissingConfig(variables) => {
                format!("set {} in the CI environment", variables.join(", "))
            }
            Self::InvalidConfig(_) => {
                "fix the value named above (decern-gate --help lists the variable behind each \
                 flag); timeouts are positive milliseconds and confidence is 0-1 or 0-100"
                    .to_owned()
            }
            Self::DiffUnavailable(_) => "fetch the full history (fetch-depth: 0) or set \
                CI_BASE_SHA and CI_HEAD_SHA to commits present in the checkout"
                .to_owned(),
            Self::NoReferences => "add decern:<id>, DECERN-<id>, a /decisions/<id> link or \
                ADR-<n> to the PR title, PR body or commit message"
                .to_owned(),
            Self::NoValidReference => {
                "reference an approved decision, or get the referenced decision approved"
                    .to_owned()
            }
            Self::JudgeRejected(_) => {
                "align the change with the decision, or update the decision first".to_owned()
            }
            Self::LowConfidence { .. } => format!(
                "make the decision more specific or split the change; the threshold comes from \
                 {JUDGE_MIN_CONFIDENCE_VAR}"
            ),
            Self::JudgeFailed(_) => "re-run the job once the decision service is reachable".to_owned(),
        }
    }
}

impl fmt::Display for PassReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotRequired => "no high-impact changes",
            Self::Validated => "decision reference validated",
            Self::JudgeAllowed => "decision reference validated and judge allowed the change",
            Self::JudgeAdvisory => "judge rejection is advisory",
            Self::JudgeUnavailable => "judge not available on this plan",
            Self::NothingToJudge => "nothing left to judge after filtering",
        })
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingConfig(variables) => {
                write!(f, "missing configuration: {}", variables.join(", "))
            }
            Self::InvalidConfig(message) => write!(f, "invalid configuration: {message}"),
            Self::DiffUnavailable(message) => write!(
                f,
                "could not determine changed files, treating the change as high-impact: {message}"
            ),
            Self::NoReferences => f.write_str("high-impact change without a decision reference"),
            Self::NoValidReference => f.write_str("no referenced decision is valid"),
            Self::JudgeRejected(reason) => write!(f, "judge rejected the change: {reason}"),
            Self::LowConfidence {
                confidence: Some(confidence),
                threshold,
            } => write!(
                f,
                "judge confidence {} is below the required {}",
                percent(*confidence),
                percent(*threshold)
            ),
            Self::LowConfidence {
                confidence: None,
                threshold,
            } => write!(
                f,
                "judge reported no confidence; {} required",
                percent(*threshold)
            ),
            Self::JudgeFailed(message) => write!(f, "judge call failed: {message}"),
        }
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// The change may merge.
    Passed(PassReason),
    /// The change is blocked.
    Blocked(BlockReason),
}

impl GateOutcome {
    /// Whether the run passed.
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Passed(_))
    }

    /// Process exit code: `0` on pass, `1` when blocked.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        if self.is_pass() {
            0
        } else {
            1
        }
    }
}

/// Outcome plus the report lines that explain it.
#[derive(Debug, Clone, PartialEq)]
pub struct GateResult {
    /// Final outcome.
    pub outcome: GateOutcome,
    /// Console report, ending with the verdict.
    pub report: GateReport,
}

impl GateResult {
    /// Result for a run that could not open the repository at all.
    #[must_use]
    pub fn repository_unavailable(error: &impl fmt::Display) -> Self {
        let mut report = GateReport::new();
        report.fail(format!("could not open repository: {error}"));
        Self::finish(
            GateOutcome::Blocked(BlockReason::DiffUnavailable(error.to_string())),
            report,
        )
    }

    /// Result for a configuration that could not be loaded.
    #[must_use]
    pub fn invalid_config(error: &impl fmt::Display) -> Self {
        Self::finish(
            GateOutcome::Blocked(BlockReason::InvalidConfig(error.to_string())),
            GateReport::new(),
        )
    }

    fn finish(outcome: GateOutcome, mut report: GateReport) -> Self {
        match &outcome {
            GateOutcome::Passed(reason) => report.line(format!("Result: PASS ({reason})")),
            GateOutcome::Blocked(reason) => {
                report.line(format!("Result: BLOCKED ({reason})"));
                report.line(format!("Hint: {}", reason.remediation()));
            }
        }
        Self { outcome, report }
    }
}

/// One gate run over a set of collaborators.
pub struct Gate<'a> {
    config: &'a GateConfig,
    policy: &'a HighImpactPolicy,
    source: &'a dyn DiffSource,
    validator: &'a dyn DecisionValidator,
    judge: &'a dyn DecisionJudge,
    engine: DiffEngine,
}

impl<'a> Gate<'a> {
    /// Wire up a gate with the default judge diff budget.
    #[must_use]
    pub fn new(
        config: &'a GateConfig,
        policy: &'a HighImpactPolicy,
        source: &'a dyn DiffSource,
        validator: &'a dyn DecisionValidator,
        judge: &'a dyn DecisionJudge,
    ) -> Self {
        Self {
            config,
            policy,
            source,
            validator,
            judge,
            engine: DiffEngine::new(),
        }
    }

    /// Replace the diff engine used to build the judge payload.
    #[must_use]
    pub const fn with_diff_engine(mut self, engine: DiffEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Run the pipeline for `revisions`, searching `reference_text` for
    /// decision references.
    #[must_use]
    pub fn run(&self, revisions: &RevisionPair, reference_text: &str) -> GateResult {
        let mut report = GateReport::new();
        report.line(format!("Comparing {revisions}"));
        let outcome = self.evaluate(revisions, reference_text, &mut report);
        tracing::debug!(?outcome, "gate finished");
        GateResult::finish(outcome, report)
    }

    fn evaluate(
        &self,
        revisions: &RevisionPair,
        reference_text: &str,
        report: &mut GateReport,
    ) -> GateOutcome {
        let changed = match self.source.changed_files(revisions) {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!(error = %err, %revisions, "changed files unavailable");
                report.fail(format!("could not list changed files: {err}"));
                return GateOutcome::Blocked(BlockReason::DiffUnavailable(err.to_string()));
            }
        };
        report.list("Changed files", &changed);

        let decision = self.policy.evaluate(&changed);
        tracing::debug!(
            required = decision.required,
            matches = decision.matches.len(),
            "policy evaluated"
        );
        if !decision.required {
            report.line("Decision required: no");
            return GateOutcome::Passed(PassReason::NotRequired);
        }
        report.line("Decision required: yes");
        for matched in &decision.matches {
            report.item(format!(
                "{} matches {} ({})",
                matched.path, matched.pattern, matched.kind
            ));
        }

        let endpoint = match self.config.validation_endpoint() {
            Ok(endpoint) => endpoint,
            Err(missing) => return missing_config(report, missing),
        };

        let references = extract_references(reference_text);
        report.list(
            "References found",
            references.iter().map(ToString::to_string),
        );
        if references.is_empty() {
            return GateOutcome::Blocked(BlockReason::NoReferences);
        }

        let Some(reference) = self.first_valid(&endpoint, &references, report) else {
            return GateOutcome::Blocked(BlockReason::NoValidReference);
        };

        if !self.config.judge.enabled {
            return GateOutcome::Passed(PassReason::Validated);
        }
        self.run_judge(revisions, reference, report)
    }

    fn first_valid<'r>(
        &self,
        endpoint: &ServiceEndpoint,
        references: &'r [Reference],
        report: &mut GateReport,
    ) -> Option<&'r Reference> {
        for reference in references {
            let request = ValidationRequest {
                reference: reference.clone(),
                high_impact: true,
                require_linked_pr: self.config.require_linked_pr,
            };
            match self.validator.validate(endpoint, &request) {
                Ok(outcome) if outcome.is_valid() => {
                    tracing::debug!(%reference, status = ?outcome.status, "reference validated");
                    report.ok(format!(
                        "{reference}: {}",
                        outcome.status.as_deref().unwrap_or("valid")
                    ));
                    if let Some(observation) = &outcome.observation {
                        report.warn(format!("{reference}: {observation}"));
                    }
                    return Some(reference);
                }
                Ok(outcome) => {
                    tracing::debug!(%reference, http_status = outcome.http_status, "reference rejected");
                    report.fail(format!("{reference}: {}", rejection(&outcome)));
                }
                Err(err) => {
                    tracing::warn!(%reference, error = %err, "validation call failed");
                    report.fail(format!("{reference}: {err}"));
                }
            }
        }
        None
    }

    fn run_judge(
        &self,
        revisions: &RevisionPair,
        reference: &Reference,
        report: &mut GateReport,
    ) -> GateOutcome {
        let credentials = match self.config.judge_credentials() {
            Ok(credentials) => credentials,
            Err(missing) => return missing_config(report, missing),
        };
        let endpoint = match self.config.judge_endpoint() {
            Ok(endpoint) => endpoint,
            Err(missing) => return missing_config(report, missing),
        };

        let diff = self.engine.diff_for_judge(self.source, revisions);
        report.line(format!(
            "Judge diff: {} bytes{}",
            diff.diff.len(),
            if diff.truncated { " (truncated)" } else { "" }
        ));
        report.list("Excluded from judge", &diff.excluded_files);
        if diff.is_empty() {
            report.warn("judge diff is empty, skipping the judge");
            return GateOutcome::Passed(PassReason::NothingToJudge);
        }

        let request = JudgeRequest {
            diff,
            reference: reference.clone(),
            credentials,
        };
        match self.judge.judge(&endpoint, &request) {
            Ok(verdict) => self.interpret(&verdict, report),
            Err(ClientError::FeatureUnavailable { message }) => {
                tracing::warn!(%message, "judge unavailable");
                report.warn(format!("judge unavailable: {message}"));
                GateOutcome::Passed(PassReason::JudgeUnavailable)
            }
            Err(err) => {
                tracing::warn!(error = %err, "judge call failed");
                report.fail(format!("judge: {err}"));
                GateOutcome::Blocked(BlockReason::JudgeFailed(err.to_string()))
            }
        }
    }

    fn interpret(&self, verdict: &JudgeVerdict, report: &mut GateReport) -> GateOutcome {
        let reason = verdict
            .reason
            .clone()
            .unwrap_or_else(|| "no reason given".to_owned());

        if !verdict.allowed {
            if verdict.advisory {
                report.warn(format!("judge (advisory): {reason}"));
                if let Some(message) = &verdict.advisory_message {
                    report.warn(message);
                }
                return GateOutcome::Passed(PassReason::JudgeAdvisory);
            }
            report.fail(format!("judge: {reason}"));
            return GateOutcome::Blocked(BlockReason::JudgeRejected(reason));
        }

        if let Some(threshold) = self.config.judge.min_confidence {
            match verdict.confidence {
                Some(confidence) if confidence >= threshold => {}
                confidence => {
                    report.fail(format!("judge: {reason}"));
                    return GateOutcome::Blocked(BlockReason::LowConfidence {
                        confidence,
                        threshold,
                    });
                }
            }
        }

        match verdict.confidence {
            Some(confidence) => report.ok(format!("judge ({}): {reason}", percent(confidence))),
            None => report.ok(format!("judge: {reason}")),
        }
        GateOutcome::Passed(PassReason::JudgeAllowed)
    }
}

impl fmt::Debug for Gate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

fn missing_config(report: &mut GateReport, MissingSettings(variables): MissingSettings) -> GateOutcome {
    report.fail(format!("not configured: {}", variables.join(", ")));
    GateOutcome::Blocked(BlockReason::MissingConfig(variables))
}

fn rejection(outcome: &ValidationOutcome) -> String {
    let reason = outcome
        .reason
        .clone()
        .unwrap_or_else(|| format!("not valid (HTTP {})", outcome.http_status));
    match &outcome.status {
        Some(status) => format!("{reason} [status: {status}]"),
        None => reason,
    }
}

fn percent(fraction: f64) -> String {
    format!("{:.0}%", fraction * 100.0)
}
