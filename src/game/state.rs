use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// 卡牌标识，形如 `card-<毫秒>-<随机串>`。
pub type CardId = String;
/// Boss NFT 标识；链上铸造时为对象 ID。
pub type NftId = String;

/// 每次出战需要选择的卡牌数量。
pub const HAND_SIZE: usize = 3;
/// 一次冒险的最高关卡。
pub const MAX_STAGE: u8 = 8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Legendary,
    Secret,
}

impl Rarity {
    pub const ALL: [Rarity; 5] = [
        Rarity::Common,
        Rarity::Uncommon,
        Rarity::Rare,
        Rarity::Legendary,
        Rarity::Secret,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::Legendary => "legendary",
            Rarity::Secret => "secret",
        }
    }
}

impl Default for Rarity {
    fn default() -> Self {
        Rarity::Common
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Attack,
    Skill,
    Curse,
    Relic,
}

impl Default for CardType {
    fn default() -> Self {
        CardType::Attack
    }
}

impl FromStr for CardType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "attack" => Ok(CardType::Attack),
            "skill" => Ok(CardType::Skill),
            "curse" => Ok(CardType::Curse),
            "relic" => Ok(CardType::Relic),
            _ => Err(()),
        }
    }
}

/// 卡牌数据，生成后不可变。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub card_type: CardType,
    #[serde(default)]
    pub rarity: Rarity,
    pub atk: u32,
    pub hp: u32,
    pub def: u32,
    pub crit_rate: u8,
    pub cost: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Card {
    pub fn is_curse(&self) -> bool {
        self.card_type == CardType::Curse
    }
}

/// 关卡 Boss，只有战斗结算会降低其生命值。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Boss {
    pub id: String,
    pub name: String,
    pub hp: u32,
    pub max_hp: u32,
    pub atk: u32,
    pub def: u32,
    #[serde(default)]
    pub rarity: Rarity,
    pub stage: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Boss {
    pub fn is_defeated(&self) -> bool {
        self.hp == 0
    }

    pub fn apply_damage(&mut self, amount: u32) {
        self.hp = self.hp.saturating_sub(amount);
    }
}

/// 击败 Boss 后获得的纪念品。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BossNft {
    pub id: NftId,
    pub boss: Boss,
    pub minted_at: u64,
    pub run_score: u64,
    pub stage_defeated: u8,
}

/// 玩家档案：金币、牌组、历史最佳与 NFT 收藏。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    #[serde(default)]
    pub address: Option<String>,
    pub coins: u32,
    #[serde(default)]
    pub deck: Vec<Card>,
    #[serde(default)]
    pub total_runs: u32,
    #[serde(default)]
    pub best_score: u64,
    #[serde(default)]
    pub max_stage: u8,
    #[serde(rename = "bossNFTs", default)]
    pub boss_nfts: Vec<BossNft>,
}

impl Player {
    pub fn new(address: Option<String>, coins: u32) -> Self {
        Self {
            address,
            coins,
            deck: Vec::new(),
            total_runs: 0,
            best_score: 0,
            max_stage: 0,
            boss_nfts: Vec::new(),
        }
    }

    pub fn find_card(&self, card_id: &str) -> Option<&Card> {
        self.deck.iter().find(|card| card.id == card_id)
    }

    pub fn remove_card(&mut self, card_id: &str) -> Option<Card> {
        let idx = self.deck.iter().position(|card| card.id == card_id)?;
        Some(self.deck.remove(idx))
    }

    pub fn remove_nft(&mut self, nft_id: &str) -> Option<BossNft> {
        let idx = self.boss_nfts.iter().position(|nft| nft.id == nft_id)?;
        Some(self.boss_nfts.remove(idx))
    }

    /// 扣除金币；余额不足时不做任何修改。
    pub fn debit(&mut self, amount: u32) -> bool {
        match self.coins.checked_sub(amount) {
            Some(rest) => {
                self.coins = rest;
                true
            }
            None => false,
        }
    }

    pub fn credit(&mut self, amount: u32) {
        self.coins = self.coins.saturating_add(amount);
    }

    pub fn raise_best_score(&mut self, score: u64) {
        self.best_score = self.best_score.max(score);
    }

    pub fn raise_max_stage(&mut self, stage: u8) {
        self.max_stage = self.max_stage.max(stage);
    }
}

/// 存档中的玩家记录，按钱包地址保存。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub coins: u32,
    #[serde(default)]
    pub total_runs: u32,
    #[serde(default)]
    pub best_score: u64,
    #[serde(default)]
    pub max_stage: u8,
    #[serde(default)]
    pub deck: Vec<Card>,
    #[serde(rename = "bossNFTs", default)]
    pub boss_nfts: Vec<BossNft>,
}

impl PlayerRecord {
    /// 新地址的默认记录。
    pub fn fresh(coins: u32) -> Self {
        Self {
            coins,
            total_runs: 0,
            best_score: 0,
            max_stage: 0,
            deck: Vec::new(),
            boss_nfts: Vec::new(),
        }
    }
}

/// `savePlayerStats` 写回的数值部分。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub coins: u32,
    pub total_runs: u32,
    pub best_score: u64,
    pub max_stage: u8,
}

impl Player {
    pub fn stats(&self) -> PlayerStats {
        PlayerStats {
            coins: self.coins,
            total_runs: self.total_runs,
            best_score: self.best_score,
            max_stage: self.max_stage,
        }
    }

    pub fn to_record(&self) -> PlayerRecord {
        PlayerRecord {
            coins: self.coins,
            total_runs: self.total_runs,
            best_score: self.best_score,
            max_stage: self.max_stage,
            deck: self.deck.clone(),
            boss_nfts: self.boss_nfts.clone(),
        }
    }
}

/// 状态机阶段；开箱与挖矿属于界面本地流程，不在此列。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Menu,
    Battle,
    Victory,
    Defeat,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Menu
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Attack,
    Crit,
    Damage,
    Block,
    Victory,
    Defeat,
}

/// 战斗日志条目。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BattleLogEntry {
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u32>,
}

impl BattleLogEntry {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: u32) -> Self {
        self.value = Some(value);
        self
    }

    pub fn boss_arrival(stage: u8, boss: &Boss) -> Self {
        Self::new(
            LogKind::Attack,
            format!("Stage {stage}: {} appears!", boss.name),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    BossPhaseMismatch { phase: Phase, has_boss: bool },
    StageOutOfRange { stage: u8 },
    TooManySelected { count: usize },
    DuplicateSelection { card_id: CardId },
    BossHpAboveMax { hp: u32, max_hp: u32 },
}

/// 一次冒险的整体状态，每次状态转换整体替换。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub phase: Phase,
    pub current_stage: u8,
    #[serde(default)]
    pub current_boss: Option<Boss>,
    #[serde(default)]
    pub selected_cards: Vec<Card>,
    #[serde(default)]
    pub battle_log: Vec<BattleLogEntry>,
    #[serde(default)]
    pub run_score: u64,
}

impl GameState {
    /// 菜单中的初始状态。
    pub fn menu() -> Self {
        Self {
            phase: Phase::Menu,
            current_stage: 0,
            current_boss: None,
            selected_cards: Vec::new(),
            battle_log: Vec::new(),
            run_score: 0,
        }
    }

    /// 进入某一关的战斗；选牌清空，日志从 Boss 登场开始。
    pub fn battle(stage: u8, boss: Boss, run_score: u64) -> Self {
        let arrival = BattleLogEntry::boss_arrival(stage, &boss);
        Self {
            phase: Phase::Battle,
            current_stage: stage,
            current_boss: Some(boss),
            selected_cards: Vec::new(),
            battle_log: vec![arrival],
            run_score,
        }
    }

    pub fn is_selected(&self, card_id: &str) -> bool {
        self.selected_cards.iter().any(|card| card.id == card_id)
    }

    pub fn selection_complete(&self) -> bool {
        self.selected_cards.len() == HAND_SIZE
    }

    pub fn record(&mut self, entries: impl IntoIterator<Item = BattleLogEntry>) {
        self.battle_log.extend(entries);
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        let needs_boss = self.phase != Phase::Menu;
        if needs_boss != self.current_boss.is_some() {
            return Err(IntegrityError::BossPhaseMismatch {
                phase: self.phase,
                has_boss: self.current_boss.is_some(),
            });
        }

        let stage_ok = match self.phase {
            Phase::Menu => self.current_stage <= MAX_STAGE,
            _ => (1..=MAX_STAGE).contains(&self.current_stage),
        };
        if !stage_ok {
            return Err(IntegrityError::StageOutOfRange {
                stage: self.current_stage,
            });
        }

        if self.selected_cards.len() > HAND_SIZE {
            return Err(IntegrityError::TooManySelected {
                count: self.selected_cards.len(),
            });
        }

        let mut seen = HashSet::new();
        for card in &self.selected_cards {
            if !seen.insert(card.id.as_str()) {
                return Err(IntegrityError::DuplicateSelection {
                    card_id: card.id.clone(),
                });
            }
        }

        if let Some(boss) = &self.current_boss {
            if boss.hp > boss.max_hp {
                return Err(IntegrityError::BossHpAboveMax {
                    hp: boss.hp,
                    max_hp: boss.max_hp,
                });
            }
        }

        Ok(())
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::menu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_type_parses_case_insensitively() {
        assert_eq!(CardType::from_str("Relic"), Ok(CardType::Relic));
        assert_eq!(CardType::from_str("CURSE"), Ok(CardType::Curse));
        assert!(CardType::from_str("all").is_err());
    }

    fn sample_boss() -> Boss {
        Boss {
            id: "boss-1".into(),
            name: "Shadow Fragment".into(),
            hp: 80,
            max_hp: 80,
            atk: 15,
            def: 5,
            rarity: Rarity::Common,
            stage: 1,
            image: None,
            description: None,
        }
    }

    #[test]
    fn debit_fails_closed_when_short() {
        let mut player = Player::new(Some("0xabc".into()), 5);
        assert!(!player.debit(6));
        assert_eq!(player.coins, 5);
        assert!(player.debit(5));
        assert_eq!(player.coins, 0);
    }

    #[test]
    fn high_water_marks_never_drop() {
        let mut player = Player::new(None, 0);
        player.raise_best_score(300);
        player.raise_best_score(100);
        player.raise_max_stage(4);
        player.raise_max_stage(2);
        assert_eq!(player.best_score, 300);
        assert_eq!(player.max_stage, 4);
    }

    #[test]
    fn menu_state_passes_integrity() {
        assert!(GameState::menu().integrity_check().is_ok());
    }

    #[test]
    fn battle_state_without_boss_is_rejected() {
        let mut state = GameState::battle(1, sample_boss(), 0);
        state.current_boss = None;
        assert_eq!(
            state.integrity_check(),
            Err(IntegrityError::BossPhaseMismatch {
                phase: Phase::Battle,
                has_boss: false
            })
        );
    }

    #[test]
    fn battle_state_opens_with_arrival_entry() {
        let state = GameState::battle(1, sample_boss(), 0);
        assert_eq!(state.battle_log.len(), 1);
        assert_eq!(state.battle_log[0].message, "Stage 1: Shadow Fragment appears!");
        assert!(state.integrity_check().is_ok());
    }

    #[test]
    fn json_uses_front_end_field_names() {
        let player = Player::new(Some("0xabc".into()), 100);
        let json = serde_json::to_value(&player).expect("player should serialize");
        assert_eq!(json["coins"], 100);
        assert!(json.get("bossNFTs").is_some());
        assert!(json.get("totalRuns").is_some());

        let entry = BattleLogEntry::new(LogKind::Crit, "Echo Blade CRITICAL HIT!").with_value(14);
        let json = serde_json::to_value(&entry).expect("entry should serialize");
        assert_eq!(json["type"], "crit");
        assert_eq!(json["value"], 14);
    }
}
