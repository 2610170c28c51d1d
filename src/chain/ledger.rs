use std::fmt;

use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

/// Move 调用参数。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum MoveArg {
    Object(String),
    U64(u64),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MoveCall {
    pub target: String,
    pub arguments: Vec<MoveArg>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TxResponse {
    #[serde(default)]
    pub digest: Option<String>,
}

/// 交易产生的对象变更；只关心新建对象。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ObjectChange {
    #[serde(rename_all = "camelCase")]
    Created {
        object_id: String,
        object_type: String,
    },
    #[serde(rename_all = "camelCase")]
    Mutated {
        object_id: String,
        object_type: String,
    },
    #[serde(other)]
    Other,
}

impl ObjectChange {
    /// 新建且类型包含标记（如 `BossNFT`）的对象 ID。
    pub fn created_with_marker(&self, marker: &str) -> Option<&str> {
        match self {
            ObjectChange::Created {
                object_id,
                object_type,
            } if object_type.contains(marker) => Some(object_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum LedgerError {
    Rejected { reason: String },
    Network { reason: String },
    ObjectNotFound { object_id: String },
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Rejected { reason } => write!(f, "transaction rejected: {reason}"),
            LedgerError::Network { reason } => write!(f, "ledger unreachable: {reason}"),
            LedgerError::ObjectNotFound { object_id } => write!(f, "object {object_id} not found"),
        }
    }
}

impl std::error::Error for LedgerError {}

/// 链上账本：签名执行交易、查询对象变更与对象内容。
pub trait Ledger {
    fn sign_and_execute(&self, call: MoveCall) -> LocalBoxFuture<'_, Result<TxResponse, LedgerError>>;

    fn object_changes(&self, digest: &str) -> LocalBoxFuture<'_, Result<Vec<ObjectChange>, LedgerError>>;

    /// 返回对象的 `content` 字段（`dataType` / `type` / `fields`）。
    fn object_content(&self, object_id: &str) -> LocalBoxFuture<'_, Result<serde_json::Value, LedgerError>>;
}
