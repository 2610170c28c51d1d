use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use futures::future::{self, FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};

use crate::game::rules::RunEngine;
use crate::game::state::{BossNft, Card, PlayerRecord, PlayerStats};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum StoreError {
    Backend { reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Backend { reason } => write!(f, "save store error: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// 远端存档，按钱包地址保存玩家数据、卡牌与 NFT。
pub trait SaveStore {
    /// 未知地址会先建立默认记录再返回。
    fn load_player_data(&self, address: &str) -> LocalBoxFuture<'_, Result<PlayerRecord, StoreError>>;

    fn save_player_stats(&self, address: &str, stats: PlayerStats) -> LocalBoxFuture<'_, Result<(), StoreError>>;

    fn save_card(&self, address: &str, card: &Card) -> LocalBoxFuture<'_, Result<(), StoreError>>;

    fn delete_card(&self, address: &str, card_id: &str) -> LocalBoxFuture<'_, Result<(), StoreError>>;

    fn save_nft(&self, address: &str, nft: &BossNft) -> LocalBoxFuture<'_, Result<(), StoreError>>;

    fn delete_nft(&self, address: &str, nft_id: &str) -> LocalBoxFuture<'_, Result<(), StoreError>>;
}

/// 内存存档，离线模式与测试使用。
#[derive(Debug)]
pub struct MemoryStore {
    default_coins: u32,
    records: RefCell<HashMap<String, PlayerRecord>>,
}

impl MemoryStore {
    pub fn new(default_coins: u32) -> Self {
        Self {
            default_coins,
            records: RefCell::new(HashMap::new()),
        }
    }

    pub fn record(&self, address: &str) -> Option<PlayerRecord> {
        self.records.borrow().get(address).cloned()
    }

    fn with_record<T>(&self, address: &str, update: impl FnOnce(&mut PlayerRecord) -> T) -> T {
        let mut records = self.records.borrow_mut();
        let record = records
            .entry(address.to_string())
            .or_insert_with(|| PlayerRecord::fresh(self.default_coins));
        update(record)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(100)
    }
}

impl SaveStore for MemoryStore {
    fn load_player_data(&self, address: &str) -> LocalBoxFuture<'_, Result<PlayerRecord, StoreError>> {
        let record = self.with_record(address, |record| record.clone());
        future::ready(Ok(record)).boxed_local()
    }

    fn save_player_stats(&self, address: &str, stats: PlayerStats) -> LocalBoxFuture<'_, Result<(), StoreError>> {
        self.with_record(address, |record| {
            record.coins = stats.coins;
            record.total_runs = stats.total_runs;
            record.best_score = stats.best_score;
            record.max_stage = stats.max_stage;
        });
        future::ready(Ok(())).boxed_local()
    }

    fn save_card(&self, address: &str, card: &Card) -> LocalBoxFuture<'_, Result<(), StoreError>> {
        self.with_record(address, |record| record.deck.push(card.clone()));
        future::ready(Ok(())).boxed_local()
    }

    fn delete_card(&self, address: &str, card_id: &str) -> LocalBoxFuture<'_, Result<(), StoreError>> {
        self.with_record(address, |record| record.deck.retain(|card| card.id != card_id));
        future::ready(Ok(())).boxed_local()
    }

    fn save_nft(&self, address: &str, nft: &BossNft) -> LocalBoxFuture<'_, Result<(), StoreError>> {
        self.with_record(address, |record| record.boss_nfts.push(nft.clone()));
        future::ready(Ok(())).boxed_local()
    }

    fn delete_nft(&self, address: &str, nft_id: &str) -> LocalBoxFuture<'_, Result<(), StoreError>> {
        self.with_record(address, |record| record.boss_nfts.retain(|nft| nft.id != nft_id));
        future::ready(Ok(())).boxed_local()
    }
}

/// 存档失败只记日志，内存状态仍是准。
pub async fn log_store_failure<F>(operation: &str, pending: F) -> bool
where
    F: Future<Output = Result<(), StoreError>>,
{
    match pending.await {
        Ok(()) => true,
        Err(error) => {
            log::warn!("{operation} failed: {error}");
            false
        }
    }
}

/// 绑定钱包地址的存档同步；没有地址时所有操作都跳过。
pub struct PlayerSync<'s, S: SaveStore + ?Sized> {
    store: &'s S,
    address: Option<String>,
}

impl<'s, S: SaveStore + ?Sized> PlayerSync<'s, S> {
    pub fn new(store: &'s S, address: Option<String>) -> Self {
        Self { store, address }
    }

    /// 拉取存档；失败或没有地址时记日志并返回 `None`。
    pub async fn fetch_record(&self) -> Option<PlayerRecord> {
        let address = self.address.as_deref()?;
        match self.store.load_player_data(address).await {
            Ok(record) => Some(record),
            Err(error) => {
                log::warn!("loading player {address} failed: {error}");
                None
            }
        }
    }

    /// 拉取存档写入引擎；新发放的新手牌同步回存档。
    pub async fn load_into(&self, engine: &mut RunEngine) -> bool {
        let Some(record) = self.fetch_record().await else {
            return false;
        };
        let granted = engine.load_player(record);
        self.save_cards(&granted).await;
        true
    }

    pub async fn save_cards(&self, cards: &[Card]) {
        for card in cards {
            self.save_card(card).await;
        }
    }

    pub async fn save_stats(&self, stats: PlayerStats) -> bool {
        match self.address.as_deref() {
            Some(address) => {
                log_store_failure("saving player stats", self.store.save_player_stats(address, stats)).await
            }
            None => false,
        }
    }

    pub async fn save_card(&self, card: &Card) -> bool {
        match self.address.as_deref() {
            Some(address) => log_store_failure("saving card", self.store.save_card(address, card)).await,
            None => false,
        }
    }

    pub async fn delete_card(&self, card_id: &str) -> bool {
        match self.address.as_deref() {
            Some(address) => {
                log_store_failure("deleting card", self.store.delete_card(address, card_id)).await
            }
            None => false,
        }
    }

    pub async fn save_nft(&self, nft: &BossNft) -> bool {
        match self.address.as_deref() {
            Some(address) => log_store_failure("saving NFT", self.store.save_nft(address, nft)).await,
            None => false,
        }
    }

    pub async fn delete_nft(&self, nft_id: &str) -> bool {
        match self.address.as_deref() {
            Some(address) => log_store_failure("deleting NFT", self.store.delete_nft(address, nft_id)).await,
            None => false,
        }
    }
}
