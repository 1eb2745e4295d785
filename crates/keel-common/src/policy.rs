//! Label-driven update policies
//!
//! A deployment opts in to automated updates through its labels. The policy
//! label decides whether (and how aggressively) it is updated at all, the
//! trigger label decides which signal drives the update, and an optional
//! schedule label overrides how often poll triggers check the registry.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{POLICY_LABEL_KEY, POLL_SCHEDULE_LABEL_KEY, TRIGGER_LABEL_KEY};

/// Update policy derived from a deployment's policy label
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    /// No policy label, or one we don't recognise: opted out
    #[default]
    None,
    /// Update on any new version
    All,
    /// Update on major, minor and patch bumps
    Major,
    /// Update on minor and patch bumps
    Minor,
    /// Update on patch bumps only
    Patch,
    /// Update even when the tag doesn't change
    Force,
}

impl PolicyKind {
    /// Label value for this policy
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::None => "none",
            PolicyKind::All => "all",
            PolicyKind::Major => "major",
            PolicyKind::Minor => "minor",
            PolicyKind::Patch => "patch",
            PolicyKind::Force => "force",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "all" => PolicyKind::All,
            "major" => PolicyKind::Major,
            "minor" => PolicyKind::Minor,
            "patch" => PolicyKind::Patch,
            "force" => PolicyKind::Force,
            _ => PolicyKind::None,
        })
    }
}

/// Which signal drives updates for a deployment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    /// Webhooks or event-bus messages, handled elsewhere
    #[default]
    Default,
    /// Periodic registry polling
    Poll,
}

impl TriggerKind {
    /// Label value for this trigger
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Default => "default",
            TriggerKind::Poll => "poll",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s.trim().eq_ignore_ascii_case("poll") {
            TriggerKind::Poll
        } else {
            TriggerKind::Default
        })
    }
}

/// Label keys consulted when classifying a deployment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelKeys {
    /// Key holding the update policy
    pub policy: String,
    /// Key holding the trigger type
    pub trigger: String,
    /// Key holding the per-deployment poll schedule override
    pub poll_schedule: String,
}

impl Default for LabelKeys {
    fn default() -> Self {
        Self {
            policy: POLICY_LABEL_KEY.to_string(),
            trigger: TRIGGER_LABEL_KEY.to_string(),
            poll_schedule: POLL_SCHEDULE_LABEL_KEY.to_string(),
        }
    }
}

/// Classify the update policy of a label set
pub fn classify_policy(labels: &BTreeMap<String, String>, keys: &LabelKeys) -> PolicyKind {
    labels
        .get(&keys.policy)
        .and_then(|value| value.parse::<PolicyKind>().ok())
        .unwrap_or_default()
}

/// Classify the trigger type of a label set
pub fn classify_trigger(labels: &BTreeMap<String, String>, keys: &LabelKeys) -> TriggerKind {
    labels
        .get(&keys.trigger)
        .and_then(|value| value.parse::<TriggerKind>().ok())
        .unwrap_or_default()
}

/// Look up the poll schedule override
///
/// A present-but-empty label is returned as `Some("")` so that it is
/// validated (and rejected) instead of falling back to the default.
pub fn poll_schedule<'a>(
    labels: &'a BTreeMap<String, String>,
    keys: &LabelKeys,
) -> Option<&'a str> {
    labels.get(&keys.poll_schedule).map(String::as_str)
}
