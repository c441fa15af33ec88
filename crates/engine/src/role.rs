//! Role-to-capability table.
//!
//! Every action maps to the set of roles allowed to perform it. The table is
//! built once (defaults, optionally overridden per action from configuration)
//! and queried through [`RoleGate::allows`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use assetflow_model::RejectionStage;

use crate::error::WorkflowError;

/// Resolved identity of whoever issues a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub actor: String,
    pub role: String,
}

impl Caller {
    pub fn new(actor: &str, role: &str) -> Self {
        Caller {
            actor: actor.to_string(),
            role: role.to_string(),
        }
    }
}

/// A capability that can be granted to roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Verify,
    Authorize,
    Resubmit,
    GenerateQr,
    PrintTag,
    ApplyTag,
    VerifyTag,
    ViewStats,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::Create,
        Action::Verify,
        Action::Authorize,
        Action::Resubmit,
        Action::GenerateQr,
        Action::PrintTag,
        Action::ApplyTag,
        Action::VerifyTag,
        Action::ViewStats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Verify => "verify",
            Action::Authorize => "authorize",
            Action::Resubmit => "resubmit",
            Action::GenerateQr => "generate_qr",
            Action::PrintTag => "print_tag",
            Action::ApplyTag => "apply_tag",
            Action::VerifyTag => "verify_tag",
            Action::ViewStats => "view_stats",
        }
    }

    /// Rejecting is a decision of whoever owns the gate being rejected at.
    pub fn for_rejection(stage: RejectionStage) -> Action {
        match stage {
            RejectionStage::Verification => Action::Verify,
            RejectionStage::Authorization => Action::Authorize,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| WorkflowError::Validation(format!("unknown action '{s}'")))
    }
}

const MAKERS: &[&str] = &["Warehouseman", "InventoryClerk", "ProjectManager", "Admin"];
const VERIFIERS: &[&str] = &["InventoryClerk", "ProjectManager", "Admin"];
const AUTHORIZERS: &[&str] = &["AssetDirector", "FinanceDirector", "Admin"];
const TAGGERS: &[&str] = &["Warehouseman", "InventoryClerk", "Admin"];
const EVERYONE: &[&str] = &[
    "Warehouseman",
    "InventoryClerk",
    "ProjectManager",
    "AssetDirector",
    "FinanceDirector",
    "Admin",
];

/// Immutable capability table: action → roles allowed to perform it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGate {
    table: BTreeMap<Action, BTreeSet<String>>,
}

impl Default for RoleGate {
    fn default() -> Self {
        let roles = |names: &[&str]| names.iter().map(|r| r.to_string()).collect();
        let table = Action::ALL
            .into_iter()
            .map(|action| {
                let allowed = match action {
                    Action::Create | Action::Resubmit | Action::GenerateQr => roles(MAKERS),
                    Action::Verify | Action::VerifyTag => roles(VERIFIERS),
                    Action::Authorize => roles(AUTHORIZERS),
                    Action::PrintTag | Action::ApplyTag => roles(TAGGERS),
                    Action::ViewStats => roles(EVERYONE),
                };
                (action, allowed)
            })
            .collect();
        RoleGate { table }
    }
}

impl RoleGate {
    /// A gate that denies everything until roles are granted.
    pub fn empty() -> Self {
        RoleGate {
            table: BTreeMap::new(),
        }
    }

    /// Replace the roles allowed to perform `action`.
    pub fn with_roles<I, R>(mut self, action: Action, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.table
            .insert(action, roles.into_iter().map(Into::into).collect());
        self
    }

    /// Apply per-action overrides, e.g. from a `[capabilities]` config table.
    pub fn with_overrides(self, overrides: &BTreeMap<Action, Vec<String>>) -> Self {
        overrides
            .iter()
            .fold(self, |gate, (action, roles)| {
                gate.with_roles(*action, roles.iter().cloned())
            })
    }

    pub fn allows(&self, action: Action, role: &str) -> bool {
        self.table
            .get(&action)
            .is_some_and(|roles| roles.contains(role))
    }

    pub fn check(&self, action: Action, role: &str) -> Result<(), WorkflowError> {
        if self.allows(action, role) {
            Ok(())
        } else {
            Err(WorkflowError::Permission {
                action,
                role: role.to_string(),
            })
        }
    }

    pub fn roles_for(&self, action: Action) -> impl Iterator<Item = &str> {
        self.table
            .get(&action)
            .into_iter()
            .flat_map(|roles| roles.iter().map(String::as_str))
    }
}
