//! Gate configuration, read once from the process environment.
//!
//! Nothing below this module touches the environment; the gate and its
//! collaborators receive a [`GateConfig`] by reference.

use std::collections::HashMap;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, CommandFactory, FromArgMatches, Parser};
use decern_gate_client_api::{normalize_confidence, JudgeCredentials, ServiceEndpoint};
use secrecy::SecretString;

use crate::{Result, RevisionPair};

/// Service base URL.
pub const BASE_URL_VAR: &str = "DECERN_BASE_URL";
/// Bearer token for the decision service.
pub const TOKEN_VAR: &str = "DECERN_CI_TOKEN";
/// Validation call timeout in milliseconds.
pub const TIMEOUT_VAR: &str = "DECERN_GATE_TIMEOUT_MS";
/// Extra high-impact globs, comma or newline separated.
pub const EXTRA_PATTERNS_VAR: &str = "DECERN_GATE_EXTRA_PATTERNS";
/// Ask the service to require a linked PR.
pub const REQUIRE_LINKED_PR_VAR: &str = "DECERN_GATE_REQUIRE_LINKED_PR";
/// Enable the judge step.
pub const JUDGE_ENABLED_VAR: &str = "DECERN_GATE_JUDGE_ENABLED";
/// Judge call timeout in milliseconds.
pub const JUDGE_TIMEOUT_VAR: &str = "DECERN_GATE_JUDGE_TIMEOUT_MS";
/// Minimum judge confidence, as a fraction or a percentage.
pub const JUDGE_MIN_CONFIDENCE_VAR: &str = "DECERN_GATE_JUDGE_MIN_CONFIDENCE";
/// Judge model provider base URL.
pub const JUDGE_LLM_BASE_URL_VAR: &str = "DECERN_JUDGE_LLM_BASE_URL";
/// Judge model provider API key.
pub const JUDGE_LLM_API_KEY_VAR: &str = "DECERN_JUDGE_LLM_API_KEY";
/// Judge model name.
pub const JUDGE_LLM_MODEL_VAR: &str = "DECERN_JUDGE_LLM_MODEL";
/// Explicit base revision.
pub const BASE_SHA_VAR: &str = "CI_BASE_SHA";
/// Explicit head revision.
pub const HEAD_SHA_VAR: &str = "CI_HEAD_SHA";
/// Pull request title.
pub const PR_TITLE_VAR: &str = "CI_PR_TITLE";
/// Pull request body.
pub const PR_BODY_VAR: &str = "CI_PR_BODY";
/// Commit message.
pub const COMMIT_MESSAGE_VAR: &str = "CI_COMMIT_MESSAGE";
/// Repository to inspect.
pub const REPO_PATH_VAR: &str = "DECERN_GATE_REPO_PATH";
/// Tracing filter directive.
pub const LOG_VAR: &str = "DECERN_GATE_LOG";

const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_JUDGE_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_LOG_FILTER: &str = "warn";

/// Connection settings for the decision service.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Service base URL.
    pub base_url: Option<String>,
    /// Bearer token.
    pub token: Option<SecretString>,
    /// Validation call timeout.
    pub timeout: Duration,
}

/// Judge step settings.
#[derive(Debug, Clone)]
pub struct JudgeSettings {
    /// Whether the judge step runs after a successful validation.
    pub enabled: bool,
    /// Judge call timeout.
    pub timeout: Duration,
    /// Minimum accepted confidence in `0.0..=1.0`.
    pub min_confidence: Option<f64>,
    /// Model provider base URL.
    pub llm_base_url: Option<String>,
    /// Model provider API key.
    pub llm_api_key: Option<SecretString>,
    /// Model name.
    pub llm_model: Option<String>,
}

/// Free text searched for decision references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceText {
    /// Pull request title.
    pub pr_title: Option<String>,
    /// Pull request body.
    pub pr_body: Option<String>,
    /// Commit message; when absent the caller may fill in the HEAD message.
    pub commit_message: Option<String>,
}

impl ReferenceText {
    /// All present sources joined by newlines, title first.
    #[must_use]
    pub fn joined(&self) -> String {
        [&self.pr_title, &self.pr_body, &self.commit_message]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Variables that must be set before a step can run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingSettings(pub Vec<&'static str>);

/// Require an approved decision reference for high-impact changes.
///
/// Every flag can also be set through the environment variable listed next
/// to it.
#[derive(Debug, Parser)]
#[command(name = "decern-gate", version)]
struct GateArgs {
    /// Decision service base URL.
    #[arg(long, env = BASE_URL_VAR)]
    base_url: Option<String>,

    /// Bearer token for the decision service.
    #[arg(long, env = TOKEN_VAR, hide_env_values = true)]
    token: Option<String>,

    /// Validation call timeout in milliseconds.
    #[arg(
        long,
        env = TIMEOUT_VAR,
        default_value_t = DEFAULT_TIMEOUT_MS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout_ms: u64,

    /// Extra high-impact globs.
    #[arg(long = "extra-pattern", env = EXTRA_PATTERNS_VAR, value_delimiter = ',')]
    extra_patterns: Vec<String>,

    /// Ask the service to require a PR linked to the decision.
    #[arg(
        long,
        env = REQUIRE_LINKED_PR_VAR,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    require_linked_pr: bool,

    /// Run the judge step after a successful validation.
    #[arg(
        long = "judge",
        env = JUDGE_ENABLED_VAR,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    judge_enabled: bool,

    /// Judge call timeout in milliseconds.
    #[arg(
        long,
        env = JUDGE_TIMEOUT_VAR,
        default_value_t = DEFAULT_JUDGE_TIMEOUT_MS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    judge_timeout_ms: u64,

    /// Minimum judge confidence, 0-1 or 0-100.
    #[arg(long, env = JUDGE_MIN_CONFIDENCE_VAR, value_parser = parse_confidence)]
    judge_min_confidence: Option<f64>,

    /// Judge model provider base URL.
    #[arg(long, env = JUDGE_LLM_BASE_URL_VAR)]
    judge_llm_base_url: Option<String>,

    /// Judge model provider API key.
    #[arg(long, env = JUDGE_LLM_API_KEY_VAR, hide_env_values = true)]
    judge_llm_api_key: Option<String>,

    /// Judge model name.
    #[arg(long, env = JUDGE_LLM_MODEL_VAR)]
    judge_llm_model: Option<String>,

    /// Base revision; used only together with `--head-sha`.
    #[arg(long, env = BASE_SHA_VAR)]
    base_sha: Option<String>,

    /// Head revision; used only together with `--base-sha`.
    #[arg(long, env = HEAD_SHA_VAR)]
    head_sha: Option<String>,

    /// Pull request title.
    #[arg(long, env = PR_TITLE_VAR)]
    pr_title: Option<String>,

    /// Pull request body.
    #[arg(long, env = PR_BODY_VAR)]
    pr_body: Option<String>,

    /// Commit message; defaults to the HEAD commit message.
    #[arg(long, env = COMMIT_MESSAGE_VAR)]
    commit_message: Option<String>,

    /// Repository to inspect.
    #[arg(long = "repo", env = REPO_PATH_VAR, default_value = ".")]
    repo_path: Utf8PathBuf,

    /// Tracing filter directive.
    #[arg(long = "log", env = LOG_VAR, default_value = DEFAULT_LOG_FILTER)]
    log_filter: String,
}

/// Complete gate configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Decision service connection.
    pub service: ServiceSettings,
    /// Operator-supplied high-impact globs.
    pub extra_patterns: Vec<String>,
    /// Send `requireLinkedPR=true` with validations.
    pub require_linked_pr: bool,
    /// Judge step.
    pub judge: JudgeSettings,
    /// Explicit revision pair, set only when both overrides are present.
    pub revisions: Option<RevisionPair>,
    /// Text searched for references.
    pub text: ReferenceText,
    /// Repository to inspect.
    pub repo_path: Utf8PathBuf,
    /// Tracing filter directive.
    pub log_filter: String,
}

impl GateConfig {
    /// Read the configuration from the command line and the process
    /// environment. Flags take precedence over variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Arguments`](crate::Error::Arguments) for malformed
    /// values, and for `--help`/`--version` requests.
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_args(GateArgs::try_parse()?))
    }

    /// Build the configuration from arbitrary variable/value pairs, ignoring
    /// the process environment.
    ///
    /// Blank values are treated as unset and unknown names are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Arguments`](crate::Error::Arguments) for malformed
    /// values.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let command = GateArgs::command();
        let flags: HashMap<String, String> = command
            .get_arguments()
            .filter_map(|arg| {
                let env = arg.get_env()?.to_str()?;
                Some((env.to_owned(), arg.get_long()?.to_owned()))
            })
            .collect();

        let mut argv = vec![command.get_name().to_owned()];
        for (key, value) in vars {
            let (key, value) = (key.into(), value.into());
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            if let Some(long) = flags.get(&key) {
                argv.push(format!("--{long}={value}"));
            }
        }

        let matches = command
            .mut_args(|arg| arg.env(None::<&'static str>))
            .try_get_matches_from(argv)?;
        Ok(Self::from_args(GateArgs::from_arg_matches(&matches)?))
    }

    fn from_args(args: GateArgs) -> Self {
        let revisions = match (non_blank(args.base_sha), non_blank(args.head_sha)) {
            (Some(base), Some(head)) => Some(RevisionPair::new(base, head)),
            _ => None,
        };

        Self {
            service: ServiceSettings {
                base_url: non_blank(args.base_url),
                token: non_blank(args.token).map(SecretString::from),
                timeout: Duration::from_millis(args.timeout_ms),
            },
            extra_patterns: args
                .extra_patterns
                .iter()
                .flat_map(|value| value.lines())
                .map(str::trim)
                .filter(|pattern| !pattern.is_empty())
                .map(str::to_owned)
                .collect(),
            require_linked_pr: args.require_linked_pr,
            judge: JudgeSettings {
                enabled: args.judge_enabled,
                timeout: Duration::from_millis(args.judge_timeout_ms),
                min_confidence: args.judge_min_confidence,
                llm_base_url: non_blank(args.judge_llm_base_url),
                llm_api_key: non_blank(args.judge_llm_api_key).map(SecretString::from),
                llm_model: non_blank(args.judge_llm_model),
            },
            revisions,
            text: ReferenceText {
                pr_title: non_blank(args.pr_title),
                pr_body: non_blank(args.pr_body),
                commit_message: non_blank(args.commit_message),
            },
            repo_path: args.repo_path,
            log_filter: args.log_filter,
        }
    }

    /// Endpoint for validation calls.
    ///
    /// # Errors
    ///
    /// Lists the service variables that are not set.
    pub fn validation_endpoint(&self) -> std::result::Result<ServiceEndpoint, MissingSettings> {
        self.endpoint(self.service.timeout)
    }

    /// Endpoint for the judge call, which uses its own timeout.
    ///
    /// # Errors
    ///
    /// Lists the service variables that are not set.
    pub fn judge_endpoint(&self) -> std::result::Result<ServiceEndpoint, MissingSettings> {
        self.endpoint(self.judge.timeout)
    }

    /// Model credentials for the judge.
    ///
    /// # Errors
    ///
    /// Lists the judge model variables that are not set.
    pub fn judge_credentials(&self) -> std::result::Result<JudgeCredentials, MissingSettings> {
        let judge = &self.judge;
        match (&judge.llm_base_url, &judge.llm_api_key, &judge.llm_model) {
            (Some(base_url), Some(api_key), Some(model)) => Ok(JudgeCredentials {
                base_url: base_url.clone(),
                api_key: api_key.clone(),
                model: model.clone(),
            }),
            (base_url, api_key, model) => Err(MissingSettings(
                [
                    (base_url.is_none(), JUDGE_LLM_BASE_URL_VAR),
                    (api_key.is_none(), JUDGE_LLM_API_KEY_VAR),
                    (model.is_none(), JUDGE_LLM_MODEL_VAR),
                ]
                .into_iter()
                .filter_map(|(missing, name)| missing.then_some(name))
                .collect(),
            )),
        }
    }

    fn endpoint(&self, timeout: Duration) -> std::result::Result<ServiceEndpoint, MissingSettings> {
        match (&self.service.base_url, &self.service.token) {
            (Some(base_url), Some(token)) => Ok(ServiceEndpoint {
                base_url: base_url.clone(),
                token: token.clone(),
                timeout,
            }),
            (base_url, token) => Err(MissingSettings(
                [(base_url.is_none(), BASE_URL_VAR), (token.is_none(), TOKEN_VAR)]
                    .into_iter()
                    .filter_map(|(missing, name)| missing.then_some(name))
                    .collect(),
            )),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_confidence(raw: &str) -> std::result::Result<f64, String> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("expected a number: {err}"))?;
    normalize_confidence(value)
        .filter(|_| value <= 100.0)
        .ok_or_else(|| "expected 0-1 or 0-100".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use secrecy::ExposeSecret;

    fn config(vars: &[(&str, &str)]) -> GateConfig {
        GateConfig::from_vars(vars.iter().copied()).expect("config")
    }

    #[test]
    fn arguments_are_consistent() {
        GateArgs::command().debug_assert();
    }

    #[test]
    fn defaults_apply_to_empty_environment() {
        let config = config(&[]);
        assert_eq!(config.service.timeout, Duration::from_millis(5_000));
        assert_eq!(config.judge.timeout, Duration::from_millis(60_000));
        assert!(!config.judge.enabled);
        assert!(!config.require_linked_pr);
        assert!(config.extra_patterns.is_empty());
        assert!(config.revisions.is_none());
        assert_eq!(config.repo_path, Utf8PathBuf::from("."));
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn unknown_variables_are_ignored() {
        let config = config(&[("PATH", "/usr/bin"), (BASE_URL_VAR, "https://decern.test")]);
        assert_eq!(
            config.service.base_url.as_deref(),
            Some("https://decern.test")
        );
    }

    #[test]
    fn missing_service_variables_are_listed() {
        let missing = config(&[(BASE_URL_VAR, "  ")])
            .validation_endpoint()
            .expect_err("missing");
        assert_eq!(missing, MissingSettings(vec![BASE_URL_VAR, TOKEN_VAR]));

        let missing = config(&[(BASE_URL_VAR, "https://decern.test")])
            .validation_endpoint()
            .expect_err("missing");
        assert_eq!(missing, MissingSettings(vec![TOKEN_VAR]));
    }

    #[test]
    fn endpoints_carry_their_own_timeouts() {
        let config = config(&[
            (BASE_URL_VAR, "https://decern.test"),
            (TOKEN_VAR, "tok"),
            (TIMEOUT_VAR, "1500"),
            (JUDGE_TIMEOUT_VAR, "9000"),
        ]);
        let validation = config.validation_endpoint().expect("endpoint");
        assert_eq!(validation.timeout, Duration::from_millis(1_500));
        assert_eq!(validation.token.expose_secret(), "tok");
        let judge = config.judge_endpoint().expect("endpoint");
        assert_eq!(judge.timeout, Duration::from_millis(9_000));
    }

    #[test]
    fn judge_credentials_report_missing_parts() {
        let missing = config(&[(JUDGE_LLM_MODEL_VAR, "m")])
            .judge_credentials()
            .expect_err("missing");
        assert_eq!(
            missing,
            MissingSettings(vec![JUDGE_LLM_BASE_URL_VAR, JUDGE_LLM_API_KEY_VAR])
        );
    }

    #[test]
    fn flags_and_lists_are_parsed() {
        let config = config(&[
            (JUDGE_ENABLED_VAR, "TRUE"),
            (REQUIRE_LINKED_PR_VAR, "1"),
            (EXTRA_PATTERNS_VAR, "schemas/**, infra/*.yaml\nconfig/prod.env"),
        ]);
        assert!(config.judge.enabled);
        assert!(config.require_linked_pr);
        assert_eq!(
            config.extra_patterns,
            vec!["schemas/**", "infra/*.yaml", "config/prod.env"]
        );
    }

    #[test]
    fn toggles_accept_boolish_words() {
        for truthy in ["yes", "on", "true", "1"] {
            assert!(config(&[(JUDGE_ENABLED_VAR, truthy)]).judge.enabled, "{truthy}");
        }
        for falsy in ["no", "off", "false", "0"] {
            assert!(!config(&[(JUDGE_ENABLED_VAR, falsy)]).judge.enabled, "{falsy}");
        }
        assert!(GateConfig::from_vars([(JUDGE_ENABLED_VAR, "maybe")]).is_err());
    }

    #[test]
    fn confidence_threshold_accepts_percentages() {
        assert_eq!(
            config(&[(JUDGE_MIN_CONFIDENCE_VAR, "75")]).judge.min_confidence,
            Some(0.75)
        );
        assert_eq!(
            config(&[(JUDGE_MIN_CONFIDENCE_VAR, "0.6")]).judge.min_confidence,
            Some(0.6)
        );
        assert!(GateConfig::from_vars([(JUDGE_MIN_CONFIDENCE_VAR, "150")]).is_err());
        assert!(GateConfig::from_vars([(JUDGE_MIN_CONFIDENCE_VAR, "high")]).is_err());
    }

    #[test]
    fn invalid_timeouts_name_the_flag() {
        let err = GateConfig::from_vars([(TIMEOUT_VAR, "soon")]).expect_err("invalid");
        assert!(matches!(err, Error::Arguments(_)));
        assert!(err.to_string().contains("--timeout-ms"));
        assert!(GateConfig::from_vars([(TIMEOUT_VAR, "0")]).is_err());
    }

    #[test]
    fn revision_overrides_need_both_values() {
        assert!(config(&[(BASE_SHA_VAR, "abc")]).revisions.is_none());
        assert_eq!(
            config(&[(BASE_SHA_VAR, "abc"), (HEAD_SHA_VAR, "def")]).revisions,
            Some(RevisionPair::new("abc", "def"))
        );
    }

    #[test]
    fn reference_text_keeps_multiline_bodies() {
        let config = config(&[
            (PR_TITLE_VAR, "Add table"),
            (PR_BODY_VAR, "Adds users.\n\nRefs decern:abc, ADR-2"),
            (COMMIT_MESSAGE_VAR, "decern:def"),
        ]);
        assert_eq!(
            config.text.joined(),
            "Add table\nAdds users.\n\nRefs decern:abc, ADR-2\ndecern:def"
        );
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = config(&[(TOKEN_VAR, "tok-secret"), (JUDGE_LLM_API_KEY_VAR, "sk-secret")]);
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("tok-secret"));
        assert!(!rendered.contains("sk-secret"));
    }
}
