//! 冒险之外的卡牌来源与牌组管理：开箱、挖矿、金币礼包、牌组统计。

use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::rules::RunEngine;
use super::state::{Card, CardType};
use crate::utils::make_id;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MiningOption {
    pub label: &'static str,
    pub duration_secs: u32,
    pub cost: u32,
    pub odds: &'static str,
}

pub const MINING_OPTIONS: [MiningOption; 3] = [
    MiningOption {
        label: "Quick Mine",
        duration_secs: 10,
        cost: 20,
        odds: "Low chance of rare",
    },
    MiningOption {
        label: "Standard Mine",
        duration_secs: 30,
        cost: 50,
        odds: "Medium chance of rare",
    },
    MiningOption {
        label: "Deep Mine",
        duration_secs: 60,
        cost: 100,
        odds: "High chance of rare",
    },
];

/// 链上购买金币的礼包，价格单位为 SUI。
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoinPackage {
    pub label: &'static str,
    pub sui: f64,
    pub coins: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus: Option<&'static str>,
}

pub const COIN_PACKAGES: [CoinPackage; 3] = [
    CoinPackage {
        label: "Starter Pack",
        sui: 0.01,
        coins: 100,
        bonus: None,
    },
    CoinPackage {
        label: "Value Pack",
        sui: 0.05,
        coins: 600,
        bonus: Some("+20%"),
    },
    CoinPackage {
        label: "Pro Pack",
        sui: 0.1,
        coins: 1500,
        bonus: Some("+50%"),
    },
];

const MIST_PER_SUI: f64 = 1_000_000_000.0;

impl CoinPackage {
    pub fn price_in_mist(&self) -> u64 {
        (self.sui * MIST_PER_SUI).floor() as u64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum WorkshopError {
    UnknownMiningOption { index: usize },
    UnknownPackage { index: usize },
    InsufficientCoins { required: u32, available: u32 },
    UnknownSlot { slot_id: String },
    SlotNotReady { slot_id: String, remaining_secs: u32 },
}

impl fmt::Display for WorkshopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkshopError::UnknownMiningOption { index } => {
                write!(f, "no mining option at index {index}")
            }
            WorkshopError::UnknownPackage { index } => write!(f, "no coin package at index {index}"),
            WorkshopError::InsufficientCoins {
                required,
                available,
            } => write!(f, "not enough coins: need {required}, have {available}"),
            WorkshopError::UnknownSlot { slot_id } => write!(f, "unknown mining slot {slot_id}"),
            WorkshopError::SlotNotReady {
                slot_id,
                remaining_secs,
            } => write!(f, "mining slot {slot_id} needs {remaining_secs}s more"),
        }
    }
}

impl std::error::Error for WorkshopError {}

/// 外部支付确认后按礼包加币。
pub fn credit_package(engine: &mut RunEngine, index: usize) -> Result<u32, WorkshopError> {
    let package = COIN_PACKAGES
        .get(index)
        .ok_or(WorkshopError::UnknownPackage { index })?;
    engine.add_coins(package.coins);
    log::info!("credited {} coins from {}", package.coins, package.label);
    Ok(package.coins)
}

/// 免费开箱：展示若干张新卡，玩家挑一张放入牌组。
#[derive(Debug, Default, Clone)]
pub struct Lootbox {
    offer: Vec<Card>,
}

impl Lootbox {
    pub fn offer(&self) -> &[Card] {
        &self.offer
    }

    pub fn open(&mut self, engine: &mut RunEngine, count: usize) -> &[Card] {
        self.offer = engine.generator_mut().generate_lootbox_cards(count);
        &self.offer
    }

    /// 选中的卡进入牌组，其余作废；ID 不在当前展示中时不做任何事。
    pub fn choose(&mut self, engine: &mut RunEngine, card_id: &str) -> Option<Card> {
        let idx = self.offer.iter().position(|card| card.id == card_id)?;
        let card = self.offer.swap_remove(idx);
        self.offer.clear();
        engine.add_card_to_deck(card.clone());
        Some(card)
    }

    pub fn discard(&mut self) {
        self.offer.clear();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MiningSlot {
    pub id: String,
    pub start_time: u64,
    pub duration_secs: u32,
    pub cost: u32,
    #[serde(default)]
    pub card: Option<Card>,
}

impl MiningSlot {
    pub fn is_complete(&self) -> bool {
        self.card.is_some()
    }

    pub fn ends_at(&self) -> u64 {
        self.start_time + self.duration_secs as u64 * 1000
    }

    /// 进度百分比 0..=100。
    pub fn progress(&self, now: u64) -> u8 {
        if self.is_complete() || self.duration_secs == 0 {
            return 100;
        }
        let elapsed = now.saturating_sub(self.start_time);
        let total = self.duration_secs as u64 * 1000;
        (elapsed.min(total) * 100 / total) as u8
    }

    pub fn remaining_secs(&self, now: u64) -> u32 {
        if self.is_complete() {
            return 0;
        }
        let remaining_ms = self.ends_at().saturating_sub(now);
        remaining_ms.div_ceil(1000) as u32
    }
}

#[derive(Debug, Default, Clone)]
pub struct MiningStation {
    slots: Vec<MiningSlot>,
}

impl MiningStation {
    pub fn slots(&self) -> &[MiningSlot] {
        &self.slots
    }

    pub fn start(
        &mut self,
        engine: &mut RunEngine,
        option_index: usize,
        now: u64,
    ) -> Result<MiningSlot, WorkshopError> {
        let option = MINING_OPTIONS
            .get(option_index)
            .ok_or(WorkshopError::UnknownMiningOption {
                index: option_index,
            })?;
        if !engine.spend_coins(option.cost) {
            return Err(WorkshopError::InsufficientCoins {
                required: option.cost,
                available: engine.player().coins,
            });
        }

        let slot = MiningSlot {
            id: make_id("mining", engine.generator_mut().rng_mut()),
            start_time: now,
            duration_secs: option.duration_secs,
            cost: option.cost,
            card: None,
        };
        log::debug!("{} started in slot {}", option.label, slot.id);
        self.slots.push(slot.clone());
        Ok(slot)
    }

    /// 到时的矿位各产出一张卡，返回本次完成的数量。
    pub fn poll(&mut self, engine: &mut RunEngine, now: u64) -> usize {
        let mut completed = 0;
        for slot in self.slots.iter_mut() {
            if !slot.is_complete() && now >= slot.ends_at() {
                slot.card = Some(engine.generator_mut().generate_card());
                completed += 1;
            }
        }
        completed
    }

    pub fn claim(&mut self, engine: &mut RunEngine, slot_id: &str, now: u64) -> Result<Card, WorkshopError> {
        let idx = self
            .slots
            .iter()
            .position(|slot| slot.id == slot_id)
            .ok_or_else(|| WorkshopError::UnknownSlot {
                slot_id: slot_id.to_string(),
            })?;
        let Some(card) = self.slots[idx].card.clone() else {
            return Err(WorkshopError::SlotNotReady {
                slot_id: slot_id.to_string(),
                remaining_secs: self.slots[idx].remaining_secs(now),
            });
        };
        self.slots.remove(idx);
        engine.add_card_to_deck(card.clone());
        Ok(card)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeckStats {
    pub total: usize,
    pub attack: usize,
    pub skill: usize,
    pub curse: usize,
    pub relic: usize,
    pub avg_atk: u32,
}

impl DeckStats {
    pub fn of(deck: &[Card]) -> Self {
        let count = |kind: CardType| deck.iter().filter(|card| card.card_type == kind).count();
        let avg_atk = if deck.is_empty() {
            0
        } else {
            let sum: u64 = deck.iter().map(|card| card.atk as u64).sum();
            (sum as f64 / deck.len() as f64).round() as u32
        };
        Self {
            total: deck.len(),
            attack: count(CardType::Attack),
            skill: count(CardType::Skill),
            curse: count(CardType::Curse),
            relic: count(CardType::Relic),
            avg_atk,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeckSort {
    Rarity,
    Atk,
    Hp,
    Cost,
    Name,
}

impl FromStr for DeckSort {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rarity" => Ok(DeckSort::Rarity),
            "atk" | "attack" => Ok(DeckSort::Atk),
            "hp" | "health" => Ok(DeckSort::Hp),
            "cost" => Ok(DeckSort::Cost),
            "name" => Ok(DeckSort::Name),
            _ => Err(()),
        }
    }
}

/// 牌组视图：可按类型过滤，稀有度/攻击/生命降序，费用/名称升序。
pub fn deck_view(deck: &[Card], filter: Option<CardType>, sort: DeckSort) -> Vec<Card> {
    let mut cards: Vec<Card> = deck
        .iter()
        .filter(|card| filter.map_or(true, |kind| card.card_type == kind))
        .cloned()
        .collect();
    match sort {
        DeckSort::Rarity => cards.sort_by_key(|card| Reverse(card.rarity)),
        DeckSort::Atk => cards.sort_by_key(|card| Reverse(card.atk)),
        DeckSort::Hp => cards.sort_by_key(|card| Reverse(card.hp)),
        DeckSort::Cost => cards.sort_by_key(|card| card.cost),
        DeckSort::Name => cards.sort_by(|a, b| a.name.cmp(&b.name)),
    }
    cards
}
