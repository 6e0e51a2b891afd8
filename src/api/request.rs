use serde::{Deserialize, Serialize};

use crate::domain::{ActionStatus, CaseId, CaseStatus, CustomerNo, WhitelistType};
use crate::error::{FraudError, FraudResult};

/// Body of `POST /v1/actions/request`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateActionRequest {
    pub customer_no: String,
    #[serde(default)]
    pub case_id: Option<CaseId>,
    /// `BLOCK_CREDIT` or `UNBLOCK_CREDIT`
    pub action_type: String,
    pub maker: String,
    pub reason: String,
}

/// Body of the admin request-block / request-unblock shortcuts.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminActionRequest {
    pub maker: String,
    pub reason: String,
}

/// Body of approve and reject.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub checker: String,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListActionsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub customer_no: Option<String>,
}

impl ListActionsQuery {
    pub fn status(&self) -> FraudResult<Option<ActionStatus>> {
        self.status
            .as_deref()
            .map(|s| {
                ActionStatus::from_str(s)
                    .ok_or_else(|| FraudError::InvalidArgument(format!("unknown request status: {s}")))
            })
            .transpose()
    }

    pub fn customer_no(&self) -> Option<CustomerNo> {
        self.customer_no
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .map(CustomerNo::new)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WhitelistQuery {
    #[serde(default, rename = "type")]
    pub entry_type: Option<String>,
}

impl WhitelistQuery {
    pub fn entry_type(&self) -> FraudResult<Option<WhitelistType>> {
        self.entry_type
            .as_deref()
            .map(|t| {
                WhitelistType::from_str(t)
                    .ok_or_else(|| FraudError::InvalidArgument(format!("unknown whitelist type: {t}")))
            })
            .transpose()
    }
}

#[derive(Debug, Deserialize)]
pub struct ActorQuery {
    pub actor: String,
}

/// Body of `POST /v1/cases/:id/status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CaseStatusRequest {
    pub status: String,
    pub actor: String,
}

impl CaseStatusRequest {
    pub fn status(&self) -> FraudResult<CaseStatus> {
        CaseStatus::from_str(&self.status).ok_or_else(|| {
            FraudError::InvalidArgument(format!("unknown case status: {}", self.status))
        })
    }
}

/// Body of `POST /v1/cases/:id/notes`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CaseNoteRequest {
    pub actor: String,
    pub note: String,
}
