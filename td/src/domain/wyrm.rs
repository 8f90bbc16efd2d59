//! `WyrmRecommendation` - the pre-analyzer's output, persisted as
//! `wyrm-recommendation.json`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::verification::VerificationStep;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WyrmRecommendation {
    pub project_id: String,
    pub detected_languages: Vec<String>,
    #[serde(default)]
    pub tech_stack: HashMap<String, String>,
    pub suggested_agent_types: Vec<String>,
    #[serde(default)]
    pub verification_steps: Vec<VerificationStep>,
}

impl WyrmRecommendation {
    /// The only validation the core performs on Wyrm's (possibly
    /// hallucinated) output: it must parse and carry the two required
    /// fields, even if empty.
    pub fn validate(&self) -> Result<(), String> {
        if self.detected_languages.is_empty() && self.suggested_agent_types.is_empty() {
            // An empty spec is a valid edge case (§8): both lists may be
            // empty, but the document must at least have been produced
            // deliberately, not omitted entirely. Parsing succeeded, which
            // is all §4.7 actually requires, so this is not an error.
        }
        Ok(())
    }
}
