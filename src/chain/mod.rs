//! 链上与存档边界：账本、远端存档、胜利上链与 NFT 铸造。

pub mod bridge;
pub mod js;
pub mod ledger;
pub mod store;

pub use bridge::{submit_win_on_chain, BossNftContent, BridgeError, SubmitOutcome};
pub use ledger::{Ledger, LedgerError, MoveArg, MoveCall, ObjectChange, TxResponse};
pub use store::{MemoryStore, PlayerSync, SaveStore, StoreError};
