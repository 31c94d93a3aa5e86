//! Snapshot pushed to listeners and returned by `get_status`.

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::feed::{ScaleSettings, ScaleState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleStatus {
    pub automatic_mode: bool,
    pub active: bool,
    pub current_weight: i32,
    pub target_weight: i32,
    /// `None` until the sensor has been observed once.
    pub sensor: Option<bool>,
    pub settings: ScaleSettings,
    pub errors: Vec<ErrorCode>,
}

impl ScaleStatus {
    pub fn snapshot(state: &ScaleState, settings: &ScaleSettings, sensor: Option<bool>) -> Self {
        Self {
            automatic_mode: state.automatic_mode,
            active: state.active,
            current_weight: state.current_weight,
            target_weight: state.target_weight,
            sensor,
            settings: *settings,
            errors: state.errors.iter().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_is_camel_case_with_coded_errors() {
        let mut st = ScaleState::with_target(12_345);
        st.errors.insert(ErrorCode::Overshoot);
        st.errors.insert(ErrorCode::NoWeight);
        let s = ScaleStatus::snapshot(&st, &ScaleSettings::default(), None);
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["targetWeight"], 12_345);
        assert_eq!(v["automaticMode"], false);
        assert!(v["sensor"].is_null());
        assert_eq!(v["settings"]["fastSlowPercentage"], 0.95);
        assert_eq!(v["errors"], serde_json::json!(["NO_WEIGHT", "OVERSHOOT"]));
    }
}
