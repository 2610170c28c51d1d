use serde::{Deserialize, Serialize};

use crate::game::battle::RewardTable;
use crate::game::state::MAX_STAGE;

/// 游戏数值配置，前端可以传入 JSON 覆盖部分字段。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    pub starting_coins: u32,
    pub run_entry_cost: u32,
    pub max_stage: u8,
    pub completion_bonus: u64,
    pub score_per_stage: u64,
    pub rewards: RewardTable,
}

impl GameConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: GameConfig = serde_json::from_str(json)?;
        Ok(config.clamped())
    }

    /// 关卡上限不能超过模板数量。
    pub fn clamped(mut self) -> Self {
        self.max_stage = self.max_stage.clamp(1, MAX_STAGE);
        self
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            starting_coins: 100,
            run_entry_cost: 10,
            max_stage: MAX_STAGE,
            completion_bonus: 1000,
            score_per_stage: 100,
            rewards: RewardTable::default(),
        }
    }
}

/// 链上提交配置。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    pub package_id: String,
    pub nft_type_marker: String,
    pub timeout_ms: u32,
}

impl BridgeConfig {
    pub fn win_stage_target(&self) -> String {
        format!("{}::player::win_stage", self.package_id)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            package_id: "0x9b4f72b690a7829e2febb7ffb00e2f588a25351f13da14bf7a78c21a9be0c48e"
                .to_string(),
            nft_type_marker: "BossNFT".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// 前端一次性传入的会话配置：`{ "game": {...}, "bridge": {...} }`。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    pub game: GameConfig,
    pub bridge: BridgeConfig,
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut config: SessionConfig = serde_json::from_str(json)?;
        config.game = config.game.clamped();
        Ok(config)
    }
}
