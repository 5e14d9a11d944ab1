use serde::{Deserialize, Serialize};

const ADR_PREFIX: &str = "ADR-";

/// A decision reference found in PR or commit text.
///
/// The variant is fixed when the reference is extracted so downstream code
/// never re-inspects the string to decide how to query the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Reference {
    /// Architecture decision record code such as `ADR-001`.
    Adr(String),
    /// Opaque decision identifier issued by the decision service.
    Decision(String),
}

impl Reference {
    /// Classify a raw identifier, normalizing ADR codes to upper case.
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        if is_adr_code(raw) {
            Self::Adr(raw.to_ascii_uppercase())
        } else {
            Self::Decision(raw.to_owned())
        }
    }

    /// The identifier as it is sent to the service.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Adr(value) | Self::Decision(value) => value,
        }
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matches `ADR-<digits>`, ignoring case.
#[must_use]
pub fn is_adr_code(raw: &str) -> bool {
    let Some(prefix) = raw.get(..ADR_PREFIX.len()) else {
        return false;
    };
    let digits = &raw[ADR_PREFIX.len()..];
    prefix.eq_ignore_ascii_case(ADR_PREFIX)
        && !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_adr_codes() {
        assert_eq!(Reference::classify("ADR-001"), Reference::Adr("ADR-001".into()));
        assert_eq!(Reference::classify("adr-12"), Reference::Adr("ADR-12".into()));
    }

    #[test]
    fn everything_else_is_a_decision_id() {
        assert_eq!(
            Reference::classify("abc_123"),
            Reference::Decision("abc_123".into())
        );
        for raw in ["ADR-", "ADR-1a", "AD"] {
            assert_eq!(Reference::classify(raw), Reference::Decision(raw.into()));
        }
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_string(&Reference::Adr("ADR-7".into())).expect("serialize");
        assert_eq!(json, r#"{"kind":"adr","value":"ADR-7"}"#);
    }
}
