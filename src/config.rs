use crate::llm::CompletionOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables shared by every request an assistant serves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssistantOptions {
    pub planning_temperature: f32,
    pub narration_temperature: f32,
    pub extraction_temperature: f32,
    pub planning_max_tokens: u32,
    pub narration_max_tokens: u32,
    pub report_max_tokens: u32,
    pub extraction_max_tokens: u32,
    /// Characters of serialized result data sent to the narrator.
    pub narration_data_cap: usize,
    /// Upper bound on a single provider call.
    #[serde(with = "optional_secs")]
    pub deadline: Option<Duration>,
    /// How long before its due date a title may be settled.
    pub grace_days: i64,
    pub projection_horizon_months: u32,
}

impl Default for AssistantOptions {
    fn default() -> Self {
        Self {
            planning_temperature: 0.3,
            narration_temperature: 0.7,
            extraction_temperature: 0.3,
            planning_max_tokens: 800,
            narration_max_tokens: 1500,
            report_max_tokens: 4000,
            extraction_max_tokens: 8000,
            narration_data_cap: 12_000,
            deadline: None,
            grace_days: 90,
            projection_horizon_months: 3,
        }
    }
}

impl AssistantOptions {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn planning(&self) -> CompletionOptions {
        CompletionOptions {
            json_mode: true,
            temperature: self.planning_temperature,
            max_tokens: self.planning_max_tokens,
            deadline: self.deadline,
        }
    }

    pub fn narration(&self) -> CompletionOptions {
        CompletionOptions {
            json_mode: false,
            temperature: self.narration_temperature,
            max_tokens: self.narration_max_tokens,
            deadline: self.deadline,
        }
    }

    pub fn report(&self) -> CompletionOptions {
        CompletionOptions {
            json_mode: true,
            temperature: self.narration_temperature,
            max_tokens: self.report_max_tokens,
            deadline: self.deadline,
        }
    }

    pub fn extraction(&self) -> CompletionOptions {
        CompletionOptions {
            json_mode: true,
            temperature: self.extraction_temperature,
            max_tokens: self.extraction_max_tokens,
            deadline: self.deadline,
        }
    }
}

mod optional_secs {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        secs.filter(|s| *s > 0.0)
            .map(|s| Duration::try_from_secs_f64(s).map_err(D::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let options = AssistantOptions::default();
        assert_eq!(options.planning(), CompletionOptions::planning());
        assert_eq!(options.narration(), CompletionOptions::narration());
        assert_eq!(options.extraction(), CompletionOptions::extraction());
        assert_eq!(options.report(), CompletionOptions::report());
        assert_eq!(options.grace_days, 90);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options: AssistantOptions =
            serde_json::from_str(r#"{"deadline": 2.5, "narration_data_cap": 500}"#).unwrap();
        assert_eq!(options.deadline, Some(Duration::from_millis(2500)));
        assert_eq!(options.narration_data_cap, 500);
        assert_eq!(options.planning_max_tokens, 800);
        assert!(options.planning().deadline.is_some());
    }

    #[test]
    fn test_oversized_deadline_is_a_serde_error() {
        let err = serde_json::from_str::<AssistantOptions>(r#"{"deadline": 1e30}"#).unwrap_err();
        assert!(err.to_string().contains("Duration"), "{}", err);

        let options: AssistantOptions = serde_json::from_str(r#"{"deadline": 0}"#).unwrap();
        assert_eq!(options.deadline, None);
    }
}
