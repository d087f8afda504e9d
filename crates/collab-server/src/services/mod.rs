//! Business logic sitting atop the coordinator, the write-behind worker
//! and the socket registries.

mod item;
mod list;
mod permission;

pub use item::ItemService;
pub use list::ListService;
pub use permission::PermissionService;

use collab_engine::EngineError;
use collab_store::StoreError;
use thiserror::Error;

/// Handler-facing error taxonomy. The dispatcher maps each variant onto
/// exactly one client error event.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Payload failed decoding or validation; reported as `error`.
    #[error("{0}")]
    Schema(String),

    /// Caller lacks the role the operation needs; reported as
    /// `permission_error`.
    #[error("{0}")]
    PermissionDenied(String),

    /// Target list/item does not exist; reported as `action_error`.
    #[error("{0}")]
    NotFound(String),

    /// Request is well-formed but not allowed (self-share and similar);
    /// reported as `action_error`.
    #[error("{0}")]
    Invalid(String),

    /// Infrastructure failure; reported as `error` and logged server-side.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::ListNotFound(id) => Self::NotFound(format!("List {id} not found")),
            EngineError::ItemNotFound(id) => Self::NotFound(format!("Item {id} not found")),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
