//! Which changed paths make a change high-impact.

use std::fmt;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::{Error, Result};

/// Family a high-impact pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// Database schema migrations.
    Migration,
    /// Container, orchestration and infrastructure-as-code manifests.
    Infrastructure,
    /// Dependency manifests and lock files.
    Dependencies,
    /// CI pipeline definitions.
    Ci,
    /// API contracts.
    ApiSchema,
    /// Supplied by the operator.
    Custom,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Migration => "migration",
            Self::Infrastructure => "infrastructure",
            Self::Dependencies => "dependencies",
            Self::Ci => "ci",
            Self::ApiSchema => "api schema",
            Self::Custom => "custom",
        })
    }
}

/// Built-in high-impact globs.
pub const DEFAULT_HIGH_IMPACT_PATTERNS: &[(PatternKind, &str)] = &[
    (PatternKind::Migration, "**/migrations/**"),
    (PatternKind::Migration, "**/migration/**"),
    (PatternKind::Migration, "**/db/migrate/**"),
    (PatternKind::Migration, "**/alembic/versions/**"),
    (PatternKind::Migration, "**/schema.prisma"),
    (PatternKind::Infrastructure, "**/Dockerfile"),
    (PatternKind::Infrastructure, "**/Dockerfile.*"),
    (PatternKind::Infrastructure, "**/docker-compose*.{yml,yaml}"),
    (PatternKind::Infrastructure, "**/*.tf"),
    (PatternKind::Infrastructure, "**/*.tfvars"),
    (PatternKind::Infrastructure, "**/terraform/**"),
    (PatternKind::Infrastructure, "**/k8s/**"),
    (PatternKind::Infrastructure, "**/kubernetes/**"),
    (PatternKind::Infrastructure, "**/helm/**"),
    (PatternKind::Infrastructure, "**/Chart.yaml"),
    (PatternKind::Dependencies, "**/package.json"),
    (PatternKind::Dependencies, "**/package-lock.json"),
    (PatternKind::Dependencies, "**/yarn.lock"),
    (PatternKind::Dependencies, "**/pnpm-lock.yaml"),
    (PatternKind::Dependencies, "**/Cargo.toml"),
    (PatternKind::Dependencies, "**/Cargo.lock"),
    (PatternKind::Dependencies, "**/go.mod"),
    (PatternKind::Dependencies, "**/go.sum"),
    (PatternKind::Dependencies, "**/requirements*.txt"),
    (PatternKind::Dependencies, "**/pyproject.toml"),
    (PatternKind::Dependencies, "**/poetry.lock"),
    (PatternKind::Dependencies, "**/Pipfile"),
    (PatternKind::Dependencies, "**/Pipfile.lock"),
    (PatternKind::Dependencies, "**/Gemfile"),
    (PatternKind::Dependencies, "**/Gemfile.lock"),
    (PatternKind::Dependencies, "**/pom.xml"),
    (PatternKind::Dependencies, "**/build.gradle"),
    (PatternKind::Dependencies, "**/build.gradle.kts"),
    (PatternKind::Ci, ".github/workflows/**"),
    (PatternKind::Ci, ".gitlab-ci.yml"),
    (PatternKind::Ci, ".circleci/**"),
    (PatternKind::Ci, ".buildkite/**"),
    (PatternKind::Ci, "azure-pipelines.yml"),
    (PatternKind::Ci, "Jenkinsfile"),
    (PatternKind::ApiSchema, "**/openapi*.{json,yml,yaml}"),
    (PatternKind::ApiSchema, "**/swagger*.{json,yml,yaml}"),
    (PatternKind::ApiSchema, "**/*.proto"),
    (PatternKind::ApiSchema, "**/*.graphql"),
];

/// A changed path and the pattern that flagged it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyMatch {
    /// Changed path.
    pub path: String,
    /// First pattern that matched it.
    pub pattern: String,
    /// Family of that pattern.
    pub kind: PatternKind,
}

/// Result of evaluating the policy over a change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyDecision {
    /// Whether a decision reference is required.
    pub required: bool,
    /// Matching paths in changed-file order.
    pub matches: Vec<PolicyMatch>,
}

/// Compiled high-impact patterns.
#[derive(Debug, Clone)]
pub struct HighImpactPolicy {
    patterns: Vec<(PatternKind, String)>,
    set: GlobSet,
}

impl HighImpactPolicy {
    /// Compile the built-in patterns plus operator extras.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] for an extra pattern that is not a
    /// valid glob.
    pub fn new<S: AsRef<str>>(extra: &[S]) -> Result<Self> {
        let patterns = DEFAULT_HIGH_IMPACT_PATTERNS
            .iter()
            .map(|(kind, pattern)| (*kind, (*pattern).to_owned()))
            .chain(
                extra
                    .iter()
                    .map(|pattern| (PatternKind::Custom, pattern.as_ref().to_owned())),
            )
            .collect::<Vec<_>>();

        let mut builder = GlobSetBuilder::new();
        for (_, pattern) in &patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|source| Error::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|source| Error::InvalidPattern {
            pattern: patterns
                .iter()
                .map(|(_, pattern)| pattern.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            source,
        })?;

        Ok(Self { patterns, set })
    }

    /// Compile only the built-in patterns.
    ///
    /// # Errors
    ///
    /// Propagates glob compilation failures.
    pub fn builtin() -> Result<Self> {
        Self::new::<&str>(&[])
    }

    /// Evaluate the changed paths.
    #[must_use]
    pub fn evaluate<S: AsRef<str>>(&self, changed: &[S]) -> PolicyDecision {
        let matches: Vec<PolicyMatch> = changed
            .iter()
            .filter_map(|path| {
                let path = path.as_ref();
                let index = self.set.matches(path).into_iter().min()?;
                let (kind, pattern) = &self.patterns[index];
                Some(PolicyMatch {
                    path: path.to_owned(),
                    pattern: pattern.clone(),
                    kind: *kind,
                })
            })
            .collect();

        PolicyDecision {
            required: !matches.is_empty(),
            matches,
        }
    }
}

/// Evaluate `changed` against the built-in patterns only.
///
/// # Errors
///
/// Propagates glob compilation failures.
pub fn is_decision_required<S: AsRef<str>>(changed: &[S]) -> Result<PolicyDecision> {
    Ok(HighImpactPolicy::builtin()?.evaluate(changed))
}
