use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::SchemeError;

/// The preference operations reachable through an `easydict://` URL.
///
/// The string forms are part of the URL format and must not change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKey {
    #[serde(rename = "writeKeyValue")]
    WriteKeyValue,
    #[serde(rename = "readValueOfKey")]
    ReadValueOfKey,
    #[serde(rename = "saveUserDefaultsDataToDownloadFolder")]
    SaveUserDefaultsDataToDownloadFolder,
    #[serde(rename = "resetUserDefaultsData")]
    ResetUserDefaultsData,
}

impl ActionKey {
    pub const ALL: [ActionKey; 4] = [
        ActionKey::WriteKeyValue,
        ActionKey::ReadValueOfKey,
        ActionKey::SaveUserDefaultsDataToDownloadFolder,
        ActionKey::ResetUserDefaultsData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKey::WriteKeyValue => "writeKeyValue",
            ActionKey::ReadValueOfKey => "readValueOfKey",
            ActionKey::SaveUserDefaultsDataToDownloadFolder => "saveUserDefaultsDataToDownloadFolder",
            ActionKey::ResetUserDefaultsData => "resetUserDefaultsData",
        }
    }

    /// Whether the action modifies the preference store. Callers use this to
    /// ask for confirmation before running it.
    pub fn is_write(&self) -> bool {
        matches!(self, ActionKey::WriteKeyValue | ActionKey::ResetUserDefaultsData)
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKey {
    type Err = SchemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| SchemeError::UnknownAction(s.to_string()))
    }
}

/// `is_write` for raw text; unknown keys are not write actions.
pub fn is_write_action_key(action_key: &str) -> bool {
    action_key.parse::<ActionKey>().is_ok_and(|key| key.is_write())
}
