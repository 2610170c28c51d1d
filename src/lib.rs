pub mod chain;
pub mod config;
pub mod game;
pub mod utils;

use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

use chain::bridge::{apply_outcome, mint_win, persist_outcome, BridgeError};
use chain::js::{JsLedger, JsSaveStore};
use chain::store::PlayerSync;
use game::content::DEFAULT_LOOTBOX_SIZE;
use game::workshop::{credit_package, deck_view, MiningSlot, COIN_PACKAGES, MINING_OPTIONS};
use utils::{now_millis, BrowserDelay};

pub use chain::{
    BossNftContent, Ledger, LedgerError, MemoryStore, MoveArg, MoveCall, ObjectChange, SaveStore,
    StoreError, SubmitOutcome, TxResponse,
};
pub use config::{BridgeConfig, GameConfig, SessionConfig};
pub use game::{
    resolve_battle, BattleLogEntry, BattleOutcome, BattleResolution, Boss, BossNft, Card, CardId,
    CardType, ContentError, ContentGenerator, DeckSort, DeckStats, GameState, IntegrityError,
    Lootbox, MiningStation, Phase, Player, PlayerRecord, PlayerStats, Rarity, RewardTable,
    RuleError, RunEngine, RunSnapshot, StageAdvance, WinSubmission, WorkshopError,
};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
    init_logging();
}

fn to_js_error<E: Serialize>(error: E) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(serde_to_js_error)
}

fn generator_for(seed: Option<u32>) -> ContentGenerator {
    match seed {
        Some(seed) => ContentGenerator::with_seed(seed as u64),
        None => ContentGenerator::new(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MiningSlotView<'a> {
    #[serde(flatten)]
    slot: &'a MiningSlot,
    progress: u8,
    remaining_secs: u32,
}

/// 前端持有的一局游戏会话。
#[wasm_bindgen]
pub struct GameSession {
    engine: Rc<RefCell<RunEngine>>,
    bridge: BridgeConfig,
    lootbox: Lootbox,
    mining: MiningStation,
}

#[wasm_bindgen]
impl GameSession {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>, seed: Option<u32>) -> Result<GameSession, JsValue> {
        let config = match config_json {
            Some(json) => SessionConfig::from_json(&json).map_err(serde_to_js_error)?,
            None => SessionConfig::default(),
        };
        let engine = match seed {
            Some(seed) => RunEngine::with_seed(config.game, seed as u64),
            None => RunEngine::new(config.game),
        };
        Ok(GameSession {
            engine: Rc::new(RefCell::new(engine)),
            bridge: config.bridge,
            lootbox: Lootbox::default(),
            mining: MiningStation::default(),
        })
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        to_json(self.engine.borrow().state())
    }

    pub fn player_json(&self) -> Result<String, JsValue> {
        to_json(self.engine.borrow().player())
    }

    pub fn snapshot_json(&self) -> Result<String, JsValue> {
        to_json(&self.engine.borrow().snapshot())
    }

    /// 返回新发放的新手卡牌。
    pub fn connect_wallet(&mut self, address: Option<String>) -> Result<String, JsValue> {
        let granted = self.engine.borrow_mut().connect_wallet(address);
        to_json(&granted)
    }

    pub fn start_run(&mut self) -> Result<(), JsValue> {
        self.engine.borrow_mut().start_run().map_err(to_js_error)
    }

    pub fn select_card(&mut self, card_id: &str) -> bool {
        self.engine.borrow_mut().select_card(card_id)
    }

    pub fn deselect_card(&mut self, card_id: &str) -> bool {
        self.engine.borrow_mut().deselect_card(card_id)
    }

    pub fn execute_battle_json(&mut self) -> Result<String, JsValue> {
        let outcome = self.engine.borrow_mut().execute_battle().map_err(to_js_error)?;
        to_json(&outcome)
    }

    pub fn next_stage_json(&mut self) -> Result<String, JsValue> {
        let advance = self.engine.borrow_mut().next_stage().map_err(to_js_error)?;
        to_json(&advance)
    }

    pub fn return_to_menu(&mut self) -> Result<(), JsValue> {
        self.engine.borrow_mut().return_to_menu().map_err(to_js_error)
    }

    pub fn claim_nft_json(&mut self) -> Result<String, JsValue> {
        let claimed = self.engine.borrow_mut().claim_nft();
        to_json(&claimed)
    }

    pub fn spend_coins(&mut self, amount: u32) -> bool {
        self.engine.borrow_mut().spend_coins(amount)
    }

    pub fn add_coins(&mut self, amount: u32) {
        self.engine.borrow_mut().add_coins(amount);
    }

    /// 外部支付确认后调用，返回入账金币数。
    pub fn buy_coins(&mut self, package_index: usize) -> Result<u32, JsValue> {
        credit_package(&mut self.engine.borrow_mut(), package_index).map_err(to_js_error)
    }

    pub fn add_card_json(&mut self, card_json: &str) -> Result<(), JsValue> {
        let card: Card = serde_json::from_str(card_json).map_err(serde_to_js_error)?;
        self.engine.borrow_mut().add_card_to_deck(card);
        Ok(())
    }

    pub fn remove_card(&mut self, card_id: &str) -> bool {
        self.engine.borrow_mut().remove_card_from_deck(card_id).is_some()
    }

    pub fn remove_nft(&mut self, nft_id: &str) -> bool {
        self.engine.borrow_mut().remove_nft(nft_id).is_some()
    }

    pub fn open_lootbox_json(&mut self, count: Option<usize>) -> Result<String, JsValue> {
        let count = count.unwrap_or(DEFAULT_LOOTBOX_SIZE);
        let mut engine = self.engine.borrow_mut();
        to_json(self.lootbox.open(&mut engine, count))
    }

    pub fn choose_lootbox_card(&mut self, card_id: &str) -> Result<String, JsValue> {
        let chosen = self.lootbox.choose(&mut self.engine.borrow_mut(), card_id);
        to_json(&chosen)
    }

    pub fn start_mining(&mut self, option_index: usize) -> Result<String, JsValue> {
        let slot = self
            .mining
            .start(&mut self.engine.borrow_mut(), option_index, now_millis())
            .map_err(to_js_error)?;
        to_json(&slot)
    }

    pub fn claim_mining(&mut self, slot_id: &str) -> Result<String, JsValue> {
        let card = self
            .mining
            .claim(&mut self.engine.borrow_mut(), slot_id, now_millis())
            .map_err(to_js_error)?;
        to_json(&card)
    }

    /// 先结算到时的矿位，再返回带进度的矿位列表。
    pub fn mining_json(&mut self) -> Result<String, JsValue> {
        let now = now_millis();
        self.mining.poll(&mut self.engine.borrow_mut(), now);
        let views: Vec<MiningSlotView> = self
            .mining
            .slots()
            .iter()
            .map(|slot| MiningSlotView {
                slot,
                progress: slot.progress(now),
                remaining_secs: slot.remaining_secs(now),
            })
            .collect();
        to_json(&views)
    }

    pub fn deck_stats_json(&self) -> Result<String, JsValue> {
        to_json(&DeckStats::of(&self.engine.borrow().player().deck))
    }

    pub fn deck_view_json(&self, filter: Option<String>, sort: Option<String>) -> Result<String, JsValue> {
        let filter = filter
            .as_deref()
            .and_then(|value| CardType::from_str(value).ok());
        let sort = sort
            .as_deref()
            .and_then(|value| DeckSort::from_str(value).ok())
            .unwrap_or(DeckSort::Rarity);
        to_json(&deck_view(&self.engine.borrow().player().deck, filter, sort))
    }

    /// 从远端存档拉取玩家数据；存档失败只记日志，Promise 解析为 `false`。
    pub fn load_player(&self, store: JsValue) -> Promise {
        let engine = Rc::clone(&self.engine);
        future_to_promise(async move {
            let store = JsSaveStore::new(store);
            let address = engine.borrow().player().address.clone();
            let sync = PlayerSync::new(&store, address);
            let Some(record) = sync.fetch_record().await else {
                return Ok(JsValue::FALSE);
            };
            let granted = engine.borrow_mut().load_player(record);
            sync.save_cards(&granted).await;
            Ok(JsValue::TRUE)
        })
    }

    /// 放弃当前开箱展示的卡牌。
    pub fn discard_lootbox(&mut self) {
        self.lootbox.discard();
    }

    pub fn save_stats(&self, store: JsValue) -> Promise {
        let engine = Rc::clone(&self.engine);
        future_to_promise(async move {
            let store = JsSaveStore::new(store);
            let (address, stats) = {
                let engine = engine.borrow();
                (engine.player().address.clone(), engine.player().stats())
            };
            let saved = PlayerSync::new(&store, address).save_stats(stats).await;
            Ok(JsValue::from_bool(saved))
        })
    }

    /// 提交当前关卡胜利并等待 BossNFT 铸造；超时返回 `pendingConfirmation`。
    pub fn submit_win_on_chain(&self, wallet: JsValue, store: JsValue, player_object_id: String) -> Promise {
        let engine = Rc::clone(&self.engine);
        let config = self.bridge.clone();
        future_to_promise(async move {
            let ledger = JsLedger::new(wallet);
            let store = JsSaveStore::new(store);
            let (submission, address) = {
                let engine = engine.borrow();
                (engine.win_submission(), engine.player().address.clone())
            };
            let submission = submission.ok_or_else(|| to_js_error(BridgeError::NoWinToSubmit))?;

            let outcome = mint_win(&ledger, &BrowserDelay, &config, &player_object_id, &submission)
                .await
                .map_err(to_js_error)?;
            persist_outcome(&store, address.as_deref(), &outcome).await;
            apply_outcome(&mut engine.borrow_mut(), &submission, &outcome);

            let json = to_json(&outcome)?;
            Ok(JsValue::from_str(&json))
        })
    }
}

#[wasm_bindgen(js_name = "generateBoss")]
pub fn generate_boss(stage: u8, seed: Option<u32>) -> Result<JsValue, JsValue> {
    to_value(&generator_for(seed).generate_boss(stage)).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "generateCard")]
pub fn generate_card(seed: Option<u32>) -> Result<JsValue, JsValue> {
    to_value(&generator_for(seed).generate_card()).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "generateStarterDeck")]
pub fn generate_starter_deck(seed: Option<u32>) -> Result<JsValue, JsValue> {
    to_value(&generator_for(seed).generate_starter_deck()).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "generateLootboxCards")]
pub fn generate_lootbox_cards(count: Option<usize>, seed: Option<u32>) -> Result<JsValue, JsValue> {
    let count = count.unwrap_or(DEFAULT_LOOTBOX_SIZE);
    to_value(&generator_for(seed).generate_lootbox_cards(count)).map_err(JsValue::from)
}

/// 无状态结算：传入三张卡与 Boss，返回结算结果，不修改任何会话。
#[wasm_bindgen(js_name = "resolveBattle")]
pub fn resolve_battle_js(cards: JsValue, boss: JsValue, stage: u8, seed: Option<u32>) -> Result<JsValue, JsValue> {
    let cards: Vec<Card> = from_value(cards).map_err(JsValue::from)?;
    let boss: Boss = from_value(boss).map_err(JsValue::from)?;
    let mut rng = match seed {
        Some(seed) => SmallRng::seed_from_u64(seed as u64),
        None => SmallRng::from_entropy(),
    };
    let resolution = resolve_battle(&cards, &boss, stage, &RewardTable::default(), &mut rng);
    to_value(&resolution).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
    Ok(())
}

#[wasm_bindgen(js_name = "miningOptions")]
pub fn mining_options() -> Result<JsValue, JsValue> {
    to_value(&MINING_OPTIONS).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "coinPackages")]
pub fn coin_packages() -> Result<JsValue, JsValue> {
    to_value(&COIN_PACKAGES).map_err(JsValue::from)
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}

#[cfg(feature = "browser_log")]
fn init_logging() {
    if console_log::init_with_level(log::Level::Debug).is_err() {
        web_sys::console::warn_1(&"logger already initialised".into());
    }
}

#[cfg(not(feature = "browser_log"))]
fn init_logging() {}
