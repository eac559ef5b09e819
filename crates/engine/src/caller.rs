//! The authenticated caller on whose behalf an operation runs.
//!
//! Authentication happens outside the engine; the engine only checks the
//! role and scopes every store access to the caller's tenant.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EngineError;

/// Role within a tenant, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Viewer,
    DataScientist,
    MlEngineer,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Viewer => write!(f, "VIEWER"),
            Self::DataScientist => write!(f, "DATA_SCIENTIST"),
            Self::MlEngineer => write!(f, "ML_ENGINEER"),
            Self::Admin => write!(f, "ADMIN"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "VIEWER"         => Ok(Self::Viewer),
            "DATA_SCIENTIST" => Ok(Self::DataScientist),
            "ML_ENGINEER"    => Ok(Self::MlEngineer),
            "ADMIN"          => Ok(Self::Admin),
            other            => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub role: Role,
}

impl Caller {
    pub fn new(tenant_id: Uuid, user_id: Option<Uuid>, role: Role) -> Self {
        Self { tenant_id, user_id, role }
    }

    /// A tenant-scoped caller for internal services (workers, schedulers).
    pub fn system(tenant_id: Uuid) -> Self {
        Self::new(tenant_id, None, Role::Admin)
    }

    /// Fail with [`EngineError::Forbidden`] unless the caller holds at least
    /// `required`.
    pub fn require(&self, required: Role) -> Result<(), EngineError> {
        if self.role >= required {
            Ok(())
        } else {
            Err(EngineError::Forbidden { required })
        }
    }
}
