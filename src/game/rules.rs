use std::fmt;

use serde::{Deserialize, Serialize};

use super::{
    battle::resolve_battle,
    content::{ensure_template_coverage, ContentGenerator},
    state::{
        BattleLogEntry, Boss, BossNft, Card, GameState, IntegrityError, NftId, Phase, Player,
        PlayerRecord, HAND_SIZE,
    },
};
use crate::config::GameConfig;
use crate::utils::{make_id, now_millis};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RuleError {
    InvalidPhase {
        expected: Vec<Phase>,
        actual: Phase,
    },
    InsufficientCoins {
        required: u32,
        available: u32,
    },
    SelectionIncomplete {
        selected: usize,
        required: usize,
    },
    NoActiveBoss,
    IntegrityViolation {
        error: IntegrityError,
    },
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::InvalidPhase { expected, actual } => {
                write!(f, "expected phase {expected:?}, found {actual:?}")
            }
            RuleError::InsufficientCoins {
                required,
                available,
            } => write!(f, "not enough coins: need {required}, have {available}"),
            RuleError::SelectionIncomplete { selected, required } => {
                write!(f, "select exactly {required} cards (currently {selected})")
            }
            RuleError::NoActiveBoss => write!(f, "no boss in play"),
            RuleError::IntegrityViolation { error } => {
                write!(f, "game state integrity violated: {error:?}")
            }
        }
    }
}

impl std::error::Error for RuleError {}

/// `execute_battle` 的返回值。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BattleOutcome {
    pub victory: bool,
    pub boss: Boss,
    pub log: Vec<BattleLogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_nft: Option<BossNft>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StageAdvance {
    #[serde(rename_all = "camelCase")]
    NextBoss {
        stage: u8,
        boss: Boss,
        reward_card: Card,
    },
    #[serde(rename_all = "camelCase")]
    RunComplete { run_score: u64, best_score: u64 },
}

/// 提交链上胜利所需的参数快照。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WinSubmission {
    pub stage: u8,
    pub level: u64,
    pub gold: u64,
    pub seed: u64,
    pub last_updated: u64,
    pub run_score: u64,
    /// 提交时本地待领取 NFT 的 ID，链上结果回来时据此对账。
    #[serde(default, rename = "pendingNFTId")]
    pub pending_nft_id: Option<NftId>,
}

/// 提供给前端的完整快照。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub player: Player,
    pub state: GameState,
    #[serde(rename = "pendingNFT")]
    pub pending_nft: Option<BossNft>,
}

/// 冒险状态机：唯一持有玩家档案与当前对局状态。
pub struct RunEngine {
    config: GameConfig,
    generator: ContentGenerator,
    player: Player,
    state: GameState,
    pending_nft: Option<BossNft>,
    seed: u64,
}

impl RunEngine {
    pub fn new(config: GameConfig) -> Self {
        Self::with_generator(config, ContentGenerator::new(), 0)
    }

    pub fn with_seed(config: GameConfig, seed: u64) -> Self {
        Self::with_generator(config, ContentGenerator::with_seed(seed), seed)
    }

    fn with_generator(config: GameConfig, generator: ContentGenerator, seed: u64) -> Self {
        if let Err(error) = ensure_template_coverage() {
            panic!("content templates are incomplete: {error}");
        }
        let player = Player::new(None, config.starting_coins);
        Self {
            config,
            generator,
            player,
            state: GameState::menu(),
            pending_nft: None,
            seed,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn pending_nft(&self) -> Option<&BossNft> {
        self.pending_nft.as_ref()
    }

    pub fn generator_mut(&mut self) -> &mut ContentGenerator {
        &mut self.generator
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            player: self.player.clone(),
            state: self.state.clone(),
            pending_nft: self.pending_nft.clone(),
        }
    }

    fn ensure_phase(state: &GameState, allowed: &[Phase]) -> Result<(), RuleError> {
        if !allowed.contains(&state.phase) {
            return Err(RuleError::InvalidPhase {
                expected: allowed.to_vec(),
                actual: state.phase,
            });
        }
        Ok(())
    }

    fn ensure_integrity(state: &GameState) -> Result<(), RuleError> {
        state
            .integrity_check()
            .map_err(|error| RuleError::IntegrityViolation { error })
    }

    fn commit(&mut self, player: Player, state: GameState) {
        self.player = player;
        self.state = state;
    }

    /// 待领取 NFT 并入收藏；必须发生在阶段重置之前。
    fn claim_into(&mut self, player: &mut Player) -> Option<BossNft> {
        let nft = self.pending_nft.take()?;
        log::info!("claimed boss NFT {} (stage {})", nft.id, nft.stage_defeated);
        player.boss_nfts.push(nft.clone());
        Some(nft)
    }

    fn grant_starter_deck(&mut self, player: &mut Player) -> Vec<Card> {
        if player.address.is_none() || !player.deck.is_empty() {
            return Vec::new();
        }
        let deck = self.generator.generate_starter_deck();
        log::info!("granted starter deck of {} cards", deck.len());
        player.deck = deck.clone();
        deck
    }

    /// 切换钱包地址；牌组为空时发放新手牌组，返回新发放的卡牌。
    pub fn connect_wallet(&mut self, address: Option<String>) -> Vec<Card> {
        let mut player = self.player.clone();
        player.address = address;
        let granted = self.grant_starter_deck(&mut player);
        self.player = player;
        granted
    }

    /// 用存档覆盖内存中的玩家数据。
    pub fn load_player(&mut self, record: PlayerRecord) -> Vec<Card> {
        let mut player = self.player.clone();
        player.coins = record.coins;
        player.total_runs = record.total_runs;
        player.best_score = record.best_score;
        player.max_stage = record.max_stage;
        player.boss_nfts = record.boss_nfts;
        if !record.deck.is_empty() {
            player.deck = record.deck;
        }
        let granted = self.grant_starter_deck(&mut player);
        self.player = player;
        granted
    }

    pub fn start_run(&mut self) -> Result<(), RuleError> {
        Self::ensure_phase(&self.state, &[Phase::Menu])?;

        let cost = self.config.run_entry_cost;
        let mut player = self.player.clone();
        if !player.debit(cost) {
            return Err(RuleError::InsufficientCoins {
                required: cost,
                available: player.coins,
            });
        }

        if player.deck.is_empty() {
            player.deck = self.generator.generate_starter_deck();
        }
        player.total_runs += 1;

        let boss = self.generator.generate_boss(1);
        log::info!("run #{} started against {}", player.total_runs, boss.name);
        let state = GameState::battle(1, boss, 0);
        self.commit(player, state);
        Ok(())
    }

    /// 选牌；已满三张、重复或不在牌组中时不做任何事。
    pub fn select_card(&mut self, card_id: &str) -> bool {
        if self.state.phase != Phase::Battle
            || self.state.selected_cards.len() >= HAND_SIZE
            || self.state.is_selected(card_id)
        {
            return false;
        }
        let Some(card) = self.player.find_card(card_id).cloned() else {
            return false;
        };

        let mut state = self.state.clone();
        state.selected_cards.push(card);
        self.state = state;
        true
    }

    pub fn deselect_card(&mut self, card_id: &str) -> bool {
        if !self.state.is_selected(card_id) {
            return false;
        }
        let mut state = self.state.clone();
        state.selected_cards.retain(|card| card.id != card_id);
        self.state = state;
        true
    }

    pub fn execute_battle(&mut self) -> Result<BattleOutcome, RuleError> {
        Self::ensure_integrity(&self.state)?;
        Self::ensure_phase(&self.state, &[Phase::Battle])?;
        if !self.state.selection_complete() {
            return Err(RuleError::SelectionIncomplete {
                selected: self.state.selected_cards.len(),
                required: HAND_SIZE,
            });
        }
        let boss = self
            .state
            .current_boss
            .as_ref()
            .ok_or(RuleError::NoActiveBoss)?;

        let stage = self.state.current_stage;
        let resolution = resolve_battle(
            &self.state.selected_cards,
            boss,
            stage,
            &self.config.rewards,
            self.generator.rng_mut(),
        );

        let mut player = self.player.clone();
        let mut state = self.state.clone();
        state.current_boss = Some(resolution.boss.clone());
        state.record(resolution.log.iter().cloned());

        let mut pending_nft = None;
        if resolution.victory {
            let reward = resolution.reward.unwrap_or_default();
            let stage_score = self.config.score_per_stage * stage as u64;
            player.credit(reward);
            player.raise_max_stage(stage);

            // 上一枚未领取的 NFT 不能被覆盖
            self.claim_into(&mut player);
            let nft = BossNft {
                id: make_id("nft", self.generator.rng_mut()),
                boss: resolution.boss.clone(),
                minted_at: now_millis(),
                run_score: state.run_score + stage_score,
                stage_defeated: stage,
            };
            state.run_score += stage_score;
            state.phase = Phase::Victory;
            pending_nft = Some(nft);
            log::info!("stage {stage} cleared, +{reward} coins");
        } else {
            player.raise_best_score(state.run_score);
            state.phase = Phase::Defeat;
            log::info!(
                "defeated at stage {stage}, boss left with {} hp",
                resolution.boss.hp
            );
        }

        self.commit(player, state);
        if pending_nft.is_some() {
            self.pending_nft = pending_nft.clone();
        }

        Ok(BattleOutcome {
            victory: resolution.victory,
            boss: resolution.boss,
            log: resolution.log,
            reward: resolution.reward,
            pending_nft,
        })
    }

    pub fn next_stage(&mut self) -> Result<StageAdvance, RuleError> {
        Self::ensure_integrity(&self.state)?;
        Self::ensure_phase(&self.state, &[Phase::Victory])?;

        let mut player = self.player.clone();
        self.claim_into(&mut player);

        let mut state = self.state.clone();
        let stage = state.current_stage + 1;
        if stage > self.config.max_stage {
            state.run_score += self.config.completion_bonus;
            player.raise_best_score(state.run_score);
            state.phase = Phase::Menu;
            state.current_stage = 0;
            state.current_boss = None;
            state.selected_cards.clear();
            let advance = StageAdvance::RunComplete {
                run_score: state.run_score,
                best_score: player.best_score,
            };
            log::info!("run complete with score {}", state.run_score);
            self.commit(player, state);
            return Ok(advance);
        }

        let reward_card = self.generator.generate_card();
        player.deck.push(reward_card.clone());

        let boss = self.generator.generate_boss(stage);
        state.phase = Phase::Battle;
        state.current_stage = stage;
        state.selected_cards.clear();
        state.record([BattleLogEntry::boss_arrival(stage, &boss)]);
        state.current_boss = Some(boss.clone());
        log::debug!("advancing to stage {stage} against {}", boss.name);

        self.commit(player, state);
        Ok(StageAdvance::NextBoss {
            stage,
            boss,
            reward_card,
        })
    }

    pub fn return_to_menu(&mut self) -> Result<(), RuleError> {
        Self::ensure_phase(&self.state, &[Phase::Victory, Phase::Defeat])?;
        let mut player = self.player.clone();
        self.claim_into(&mut player);
        self.commit(player, GameState::menu());
        Ok(())
    }

    pub fn claim_nft(&mut self) -> Option<BossNft> {
        let mut player = self.player.clone();
        let claimed = self.claim_into(&mut player);
        self.player = player;
        claimed
    }

    /// 唯一的扣币入口；余额不足返回 false 且不修改任何状态。
    pub fn spend_coins(&mut self, amount: u32) -> bool {
        let mut player = self.player.clone();
        if !player.debit(amount) {
            log::debug!("spend of {amount} refused, balance {}", player.coins);
            return false;
        }
        self.player = player;
        true
    }

    pub fn add_coins(&mut self, amount: u32) {
        let mut player = self.player.clone();
        player.credit(amount);
        self.player = player;
    }

    pub fn add_card_to_deck(&mut self, card: Card) {
        let mut player = self.player.clone();
        player.deck.push(card);
        self.player = player;
    }

    pub fn remove_card_from_deck(&mut self, card_id: &str) -> Option<Card> {
        let mut player = self.player.clone();
        let removed = player.remove_card(card_id)?;
        self.player = player;
        if self.state.is_selected(card_id) {
            self.deselect_card(card_id);
        }
        Some(removed)
    }

    pub fn remove_nft(&mut self, nft_id: &str) -> Option<BossNft> {
        let mut player = self.player.clone();
        let removed = player.remove_nft(nft_id)?;
        self.player = player;
        Some(removed)
    }

    /// 当前局外（关卡为 0）时没有可提交的胜利。
    pub fn win_submission(&self) -> Option<WinSubmission> {
        if self.state.current_stage == 0 {
            return None;
        }
        Some(WinSubmission {
            stage: self.state.current_stage,
            level: self.player.max_stage as u64,
            gold: self.player.coins as u64,
            seed: self.seed,
            last_updated: now_millis(),
            run_score: self.state.run_score,
            pending_nft_id: self.pending_nft.as_ref().map(|nft| nft.id.clone()),
        })
    }

    /// 链上铸造结果写回。只替换提交时对应的那枚本地 NFT：
    /// 仍待领取则取代之；已领入收藏则原地换成链上版本；
    /// 之后产生的待领取 NFT 不受影响。
    pub fn record_minted_nft(&mut self, submission: &WinSubmission, nft: BossNft) {
        let local_id = submission.pending_nft_id.as_deref();
        let mut player = self.player.clone();

        let still_pending = match (local_id, self.pending_nft.as_ref()) {
            (Some(local_id), Some(pending)) => pending.id == local_id,
            _ => false,
        };
        let claimed = local_id.and_then(|local_id| {
            player
                .boss_nfts
                .iter()
                .position(|owned| owned.id == local_id)
        });

        if let Some(idx) = claimed {
            player.boss_nfts[idx] = nft;
        } else if player.boss_nfts.iter().any(|owned| owned.id == nft.id) {
            log::debug!("minted NFT {} already recorded", nft.id);
        } else {
            player.boss_nfts.push(nft);
        }

        self.player = player;
        if still_pending {
            self.pending_nft = None;
        }
    }
}
