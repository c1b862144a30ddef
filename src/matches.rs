use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub issue_type: Option<String>,
    #[serde(default)]
    pub category: Option<Category>,
}

/// The finding's surroundings; `offset`/`length` are local to `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MatchContext {
    pub text: String,
    pub offset: usize,
    #[serde(default)]
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub value: String,
}

/// One finding. `offset` and `length` are UTF-16 units into the flat text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub message: String,
    #[serde(default)]
    pub short_message: String,
    pub offset: usize,
    pub length: usize,
    #[serde(default)]
    pub replacements: Vec<Replacement>,
    #[serde(default)]
    pub context: MatchContext,
    pub rule: Rule,
}

impl Match {
    pub fn position(&self) -> (usize, usize) {
        (self.offset, self.length)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Language {
    pub name: String,
    pub code: String,
}

impl Language {
    /// `en-US` -> `en`.
    pub fn short_code(&self) -> &str {
        self.code.split(['-', '_']).next().unwrap_or_default()
    }
}

/// Body of a successful check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub matches: Vec<Match>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_service_response() {
        let body = r#"{
            "software": {"name": "LanguageTool"},
            "language": {"name": "English (US)", "code": "en-US"},
            "matches": [{
                "message": "Possible spelling mistake found.",
                "shortMessage": "Spelling mistake",
                "replacements": [{"value": "This"}, {"value": "Thus"}],
                "offset": 0,
                "length": 3,
                "context": {"text": "Ths is a tset.", "offset": 0, "length": 3},
                "rule": {
                    "id": "MORFOLOGIK_RULE_EN_US",
                    "description": "Possible spelling mistake",
                    "issueType": "misspelling",
                    "category": {"id": "TYPOS", "name": "Possible Typo"}
                }
            }]
        }"#;
        let response: CheckResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.language.short_code(), "en");
        let m = &response.matches[0];
        assert_eq!(m.position(), (0, 3));
        assert_eq!(m.replacements[0].value, "This");
        assert_eq!(m.rule.issue_type.as_deref(), Some("misspelling"));
    }
}
