//! 游戏核心逻辑模块（内容生成、战斗结算、冒险状态机等）。

pub mod battle;
pub mod content;
pub mod rules;
pub mod state;
pub mod workshop;

pub use battle::{resolve_battle, BattleResolution, RewardTable};
pub use content::{ContentError, ContentGenerator};
pub use rules::{
    BattleOutcome,
    RuleError,
    RunEngine,
    RunSnapshot,
    StageAdvance,
    WinSubmission,
};
pub use state::{
    BattleLogEntry,
    Boss,
    BossNft,
    Card,
    CardId,
    CardType,
    GameState,
    IntegrityError,
    LogKind,
    Phase,
    Player,
    PlayerRecord,
    PlayerStats,
    Rarity,
};
pub use workshop::{DeckSort, DeckStats, Lootbox, MiningStation, WorkshopError};
