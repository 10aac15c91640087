//! Voice prompt catalogue.

use serde::Serialize;
use std::collections::HashMap;

use crate::classify::Action;

pub const SYSTEM_START: &str = "system_start";
pub const CALIBRATION_START: &str = "calibration_start";
pub const CALIBRATION_SUCCESS: &str = "calibration_success";

/// A spoken advisory or acknowledgement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub key: String,
    pub text: String,
}

/// Prompt key used to acknowledge a confirmed action.
pub fn action_key(action: Action) -> String {
    format!("action:{}", action.name())
}

/// Prompt texts by key, with built-in English defaults.
#[derive(Clone, Debug)]
pub struct Messages {
    texts: HashMap<String, String>,
}

impl Messages {
    pub fn new() -> Self {
        let mut texts: HashMap<String, String> = [
            (SYSTEM_START, "Pose detection started"),
            (
                CALIBRATION_START,
                "Please stand in a neutral pose for calibration",
            ),
            (CALIBRATION_SUCCESS, "Calibration complete"),
            (
                "body_incomplete",
                "Make sure your whole body is in view, including head, arms and legs",
            ),
            (
                "distance_too_close",
                "You are too close to the camera, please step back",
            ),
            (
                "distance_too_far",
                "You are too far from the camera, please step closer",
            ),
            (
                "unstable_pose",
                "Please stand straight and keep still",
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        for action in Action::ALL {
            texts.insert(action_key(action), Self::action_text(action).to_string());
        }
        Self { texts }
    }

    fn action_text(action: Action) -> &'static str {
        match action {
            Action::LeftHandRaised => "Left hand raised",
            Action::RightHandRaised => "Right hand raised",
            Action::BothHandsRaised => "Both hands raised",
            Action::LeftFootRaised => "Left foot raised",
            Action::RightFootRaised => "Right foot raised",
            Action::HeadTurnedLeft => "Head turned left",
            Action::HeadTurnedRight => "Head turned right",
        }
    }

    /// Replaces or adds texts; unknown keys are kept as-is.
    pub fn with_overrides<I, K, V>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, text) in overrides {
            self.texts.insert(key.into(), text.into());
        }
        self
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.texts.get(key).map(String::as_str)
    }

    /// Builds a prompt, falling back to the key itself when no text is known.
    pub fn prompt(&self, key: &str) -> Prompt {
        let text = match self.text(key) {
            Some(text) => text.to_string(),
            None => {
                log::debug!("no prompt text for '{}'", key);
                key.to_string()
            }
        };
        Prompt {
            key: key.to_string(),
            text,
        }
    }
}

impl Default for Messages {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_action_and_issue_has_text() {
        let messages = Messages::default();
        for action in Action::ALL {
            assert!(messages.text(&action_key(action)).is_some());
        }
        for key in [
            "body_incomplete",
            "distance_too_close",
            "distance_too_far",
            "unstable_pose",
            CALIBRATION_SUCCESS,
        ] {
            assert!(messages.text(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn overrides_replace_defaults() {
        let messages = Messages::default().with_overrides([(CALIBRATION_SUCCESS, "成功校正")]);
        assert_eq!(messages.prompt(CALIBRATION_SUCCESS).text, "成功校正");
        assert_eq!(messages.prompt("nope").text, "nope");
        assert_eq!(action_key(Action::HeadTurnedLeft), "action:head_turned_left");
    }
}
