use std::fmt;

use futures::future::{self, Either, FutureExt};
use serde::{Deserialize, Deserializer, Serialize};

use super::ledger::{Ledger, LedgerError, MoveArg, MoveCall};
use super::store::{log_store_failure, SaveStore};
use crate::config::BridgeConfig;
use crate::game::content::{boss_max_hp, boss_template};
use crate::game::rules::{RunEngine, WinSubmission};
use crate::game::state::{Boss, BossNft, Rarity, MAX_STAGE};
use crate::utils::{now_millis, Delay};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum BridgeError {
    NoWinToSubmit,
    Ledger { error: LedgerError },
    MissingDigest,
    Decode { object_id: String, reason: String },
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::NoWinToSubmit => write!(f, "no stage in progress to submit"),
            BridgeError::Ledger { error } => write!(f, "{error}"),
            BridgeError::MissingDigest => write!(f, "transaction returned no digest"),
            BridgeError::Decode { object_id, reason } => {
                write!(f, "cannot decode NFT object {object_id}: {reason}")
            }
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Ledger { error } => Some(error),
            _ => None,
        }
    }
}

impl From<LedgerError> for BridgeError {
    fn from(error: LedgerError) -> Self {
        BridgeError::Ledger { error }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SubmitOutcome {
    /// 交易已确认；`nft` 为空表示交易没有铸造新对象。
    #[serde(rename_all = "camelCase")]
    Recorded { digest: String, nft: Option<BossNft> },
    /// 超时：交易可能仍在确认中，本地状态未改动。
    #[serde(rename_all = "camelCase")]
    PendingConfirmation { elapsed_ms: u64 },
}

/// 链上 u64 在 JSON 里可能是字符串。
fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// BossNFT 的 Move 字段，按合约版本区分。
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum BossNftContent {
    V2 {
        name: String,
        #[serde(alias = "imageUrl")]
        image_url: String,
        #[serde(deserialize_with = "lenient_u64", alias = "stageDefeated")]
        stage_defeated: u64,
        #[serde(deserialize_with = "lenient_u64", alias = "runScore")]
        run_score: u64,
    },
    V1 {
        #[serde(alias = "boss_name")]
        name: String,
        #[serde(alias = "imageUrl", alias = "image", alias = "url")]
        image_url: String,
        #[serde(
            deserialize_with = "lenient_u64",
            alias = "level",
            alias = "stage_defeated",
            alias = "stageDefeated"
        )]
        stage: u64,
    },
}

impl BossNftContent {
    pub fn stage(&self) -> u64 {
        match self {
            BossNftContent::V2 { stage_defeated, .. } => *stage_defeated,
            BossNftContent::V1 { stage, .. } => *stage,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MoveObjectContent {
    #[serde(rename = "dataType")]
    data_type: String,
    #[serde(rename = "type")]
    object_type: String,
    fields: BossNftContent,
}

/// 把账本返回的对象内容解码为 `BossNft`；结构不符时报错而不是猜测字段。
pub fn decode_boss_nft(
    object_id: &str,
    content: serde_json::Value,
    marker: &str,
    fallback_run_score: u64,
) -> Result<BossNft, BridgeError> {
    let decode_error = |reason: String| BridgeError::Decode {
        object_id: object_id.to_string(),
        reason,
    };

    let object: MoveObjectContent =
        serde_json::from_value(content).map_err(|error| decode_error(error.to_string()))?;
    if object.data_type != "moveObject" {
        return Err(decode_error(format!("unexpected data type {}", object.data_type)));
    }
    if !object.object_type.contains(marker) {
        return Err(decode_error(format!("unexpected object type {}", object.object_type)));
    }

    let stage = object.fields.stage();
    let stage = u8::try_from(stage)
        .ok()
        .filter(|stage| (1..=MAX_STAGE).contains(stage))
        .ok_or_else(|| decode_error(format!("stage {stage} out of range")))?;
    let template = boss_template(stage);

    let (name, image_url, run_score) = match object.fields {
        BossNftContent::V2 {
            name,
            image_url,
            run_score,
            ..
        } => (name, image_url, run_score),
        BossNftContent::V1 { name, image_url, .. } => (name, image_url, fallback_run_score),
    };

    let boss = Boss {
        id: format!("boss-{stage}"),
        name,
        hp: 0,
        max_hp: boss_max_hp(stage),
        atk: template.map(|t| t.atk).unwrap_or_default(),
        def: template.map(|t| t.def).unwrap_or_default(),
        rarity: template.map(|t| t.rarity).unwrap_or(Rarity::Common),
        stage,
        image: Some(image_url),
        description: template.map(|t| t.description.to_string()),
    };

    Ok(BossNft {
        id: object_id.to_string(),
        boss,
        minted_at: now_millis(),
        run_score,
        stage_defeated: stage,
    })
}

pub fn win_stage_call(config: &BridgeConfig, player_object_id: &str, submission: &WinSubmission) -> MoveCall {
    MoveCall {
        target: config.win_stage_target(),
        arguments: vec![
            MoveArg::Object(player_object_id.to_string()),
            MoveArg::U64(submission.stage as u64),
            MoveArg::U64(submission.level),
            MoveArg::U64(submission.gold),
            MoveArg::U64(submission.seed),
            MoveArg::U64(submission.last_updated),
        ],
    }
}

async fn exchange<L: Ledger + ?Sized>(
    ledger: &L,
    config: &BridgeConfig,
    player_object_id: &str,
    submission: &WinSubmission,
) -> Result<SubmitOutcome, BridgeError> {
    let call = win_stage_call(config, player_object_id, submission);
    let response = ledger.sign_and_execute(call).await?;
    let digest = response.digest.ok_or(BridgeError::MissingDigest)?;
    log::info!("win_stage for stage {} executed: {digest}", submission.stage);

    let changes = ledger.object_changes(&digest).await?;
    let Some(object_id) = changes
        .iter()
        .find_map(|change| change.created_with_marker(&config.nft_type_marker))
        .map(str::to_string)
    else {
        log::warn!("transaction {digest} created no {}", config.nft_type_marker);
        return Ok(SubmitOutcome::Recorded { digest, nft: None });
    };

    let content = ledger.object_content(&object_id).await?;
    let nft = decode_boss_nft(
        &object_id,
        content,
        &config.nft_type_marker,
        submission.run_score,
    )?;
    Ok(SubmitOutcome::Recorded {
        digest,
        nft: Some(nft),
    })
}

/// 提交胜利并等待铸造结果，整个交互受 `timeout_ms` 限制（0 表示不限）。
pub async fn mint_win<L, D>(
    ledger: &L,
    delay: &D,
    config: &BridgeConfig,
    player_object_id: &str,
    submission: &WinSubmission,
) -> Result<SubmitOutcome, BridgeError>
where
    L: Ledger + ?Sized,
    D: Delay + ?Sized,
{
    let started = now_millis();
    let work = exchange(ledger, config, player_object_id, submission).boxed_local();
    if config.timeout_ms == 0 {
        return work.await;
    }

    match future::select(work, delay.sleep(config.timeout_ms)).await {
        Either::Left((result, _)) => result,
        Either::Right(((), _)) => {
            let elapsed_ms = now_millis().saturating_sub(started);
            log::warn!("win_stage still unconfirmed after {elapsed_ms} ms");
            Ok(SubmitOutcome::PendingConfirmation { elapsed_ms })
        }
    }
}

/// 持久化铸造出的 NFT；存档失败只记日志。
pub async fn persist_outcome<S: SaveStore + ?Sized>(
    store: &S,
    address: Option<&str>,
    outcome: &SubmitOutcome,
) {
    if let (Some(address), SubmitOutcome::Recorded { nft: Some(nft), .. }) = (address, outcome) {
        log_store_failure("saving minted NFT", store.save_nft(address, nft)).await;
    }
}

/// 写回引擎；按提交时的快照对账，不会覆盖之后产生的待领取 NFT。
pub fn apply_outcome(engine: &mut RunEngine, submission: &WinSubmission, outcome: &SubmitOutcome) {
    if let SubmitOutcome::Recorded { nft: Some(nft), .. } = outcome {
        engine.record_minted_nft(submission, nft.clone());
    }
}

/// 完整流程：快照、上链、存档、写回引擎。
pub async fn submit_win_on_chain<L, S, D>(
    engine: &mut RunEngine,
    ledger: &L,
    store: &S,
    delay: &D,
    config: &BridgeConfig,
    player_object_id: &str,
) -> Result<SubmitOutcome, BridgeError>
where
    L: Ledger + ?Sized,
    S: SaveStore + ?Sized,
    D: Delay + ?Sized,
{
    let submission = engine.win_submission().ok_or(BridgeError::NoWinToSubmit)?;
    let outcome = mint_win(ledger, delay, config, player_object_id, &submission).await?;
    let address = engine.player().address.clone();
    persist_outcome(store, address.as_deref(), &outcome).await;
    apply_outcome(engine, &submission, &outcome);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ledger::{ObjectChange, TxResponse};
    use crate::chain::store::MemoryStore;
    use crate::config::GameConfig;
    use crate::game::state::{Card, CardType};
    use futures::executor::block_on;
    use futures::future::LocalBoxFuture;
    use serde_json::json;
    use std::cell::RefCell;

    struct ScriptedLedger {
        response: Result<TxResponse, LedgerError>,
        changes: Vec<ObjectChange>,
        content: serde_json::Value,
        calls: RefCell<Vec<MoveCall>>,
        hang: bool,
    }

    impl ScriptedLedger {
        fn minting(content: serde_json::Value) -> Self {
            Self {
                response: Ok(TxResponse {
                    digest: Some("0xdigest".into()),
                }),
                changes: vec![
                    ObjectChange::Mutated {
                        object_id: "0xplayer".into(),
                        object_type: "0x9::player::PlayerState".into(),
                    },
                    ObjectChange::Created {
                        object_id: "0xnft".into(),
                        object_type: "0x9::boss::BossNFT".into(),
                    },
                ],
                content,
                calls: RefCell::new(Vec::new()),
                hang: false,
            }
        }
    }

    impl Ledger for ScriptedLedger {
        fn sign_and_execute(&self, call: MoveCall) -> LocalBoxFuture<'_, Result<TxResponse, LedgerError>> {
            self.calls.borrow_mut().push(call);
            if self.hang {
                return future::pending().boxed_local();
            }
            future::ready(self.response.clone()).boxed_local()
        }

        fn object_changes(&self, _digest: &str) -> LocalBoxFuture<'_, Result<Vec<ObjectChange>, LedgerError>> {
            future::ready(Ok(self.changes.clone())).boxed_local()
        }

        fn object_content(&self, _object_id: &str) -> LocalBoxFuture<'_, Result<serde_json::Value, LedgerError>> {
            future::ready(Ok(self.content.clone())).boxed_local()
        }
    }

    struct NeverDelay;

    impl Delay for NeverDelay {
        fn sleep(&self, _millis: u32) -> LocalBoxFuture<'static, ()> {
            future::pending().boxed_local()
        }
    }

    struct ImmediateDelay;

    impl Delay for ImmediateDelay {
        fn sleep(&self, _millis: u32) -> LocalBoxFuture<'static, ()> {
            future::ready(()).boxed_local()
        }
    }

    fn v1_content(stage: serde_json::Value) -> serde_json::Value {
        json!({
            "dataType": "moveObject",
            "type": "0x9::boss::BossNFT",
            "fields": {
                "id": { "id": "0xnft" },
                "name": "Shadow Fragment",
                "image_url": "assets/boss-shadow.png",
                "stage": stage
            }
        })
    }

    fn victorious_engine() -> RunEngine {
        let mut engine = RunEngine::with_seed(GameConfig::default(), 11);
        engine.connect_wallet(Some("0xabc".into()));
        engine.start_run().expect("run should start");
        for id in ["a", "b", "c"] {
            engine.add_card_to_deck(Card {
                id: id.into(),
                name: id.into(),
                card_type: CardType::Attack,
                rarity: Rarity::Rare,
                atk: 500,
                hp: 10,
                def: 0,
                crit_rate: 0,
                cost: 1,
                description: String::new(),
                image: None,
            });
            assert!(engine.select_card(id));
        }
        assert!(engine.execute_battle().expect("battle").victory);
        engine
    }

    #[test]
    fn minted_nft_is_persisted_and_recorded() {
        let mut engine = victorious_engine();
        let ledger = ScriptedLedger::minting(v1_content(json!("1")));
        let store = MemoryStore::default();
        let config = BridgeConfig::default();

        let outcome = block_on(submit_win_on_chain(
            &mut engine,
            &ledger,
            &store,
            &NeverDelay,
            &config,
            "0xplayer",
        ))
        .expect("submission succeeds");

        let SubmitOutcome::Recorded { digest, nft } = outcome else {
            panic!("expected recorded outcome");
        };
        assert_eq!(digest, "0xdigest");
        let nft = nft.expect("NFT decoded");
        assert_eq!(nft.id, "0xnft");
        assert_eq!(nft.stage_defeated, 1);
        assert_eq!(nft.boss.max_hp, 80);
        assert_eq!(nft.run_score, 100, "V1 falls back to run score");

        assert!(engine.pending_nft().is_none());
        assert_eq!(engine.player().boss_nfts, vec![nft.clone()]);
        assert_eq!(store.record("0xabc").expect("record").boss_nfts, vec![nft]);

        let calls = ledger.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].target.ends_with("::player::win_stage"));
        assert_eq!(calls[0].arguments[0], MoveArg::Object("0xplayer".into()));
        assert_eq!(calls[0].arguments[1], MoveArg::U64(1));
        assert_eq!(calls[0].arguments[3], MoveArg::U64(120));
    }

    #[test]
    fn stale_outcome_keeps_newer_pending_nft() {
        let mut engine = victorious_engine();
        let submission = engine.win_submission().expect("stage 1 submission");

        engine.next_stage().expect("advance");
        for id in ["a", "b", "c"] {
            assert!(engine.select_card(id));
        }
        assert!(engine.execute_battle().expect("battle").victory);
        let newer = engine.pending_nft().cloned().expect("stage 2 pending");

        let nft = decode_boss_nft("0xnft", v1_content(json!(1)), "BossNFT", 100).expect("decodes");
        let outcome = SubmitOutcome::Recorded {
            digest: "0xdigest".into(),
            nft: Some(nft),
        };
        apply_outcome(&mut engine, &submission, &outcome);

        let stages: Vec<u8> = engine
            .player()
            .boss_nfts
            .iter()
            .map(|nft| nft.stage_defeated)
            .collect();
        assert_eq!(stages, vec![1]);
        assert_eq!(engine.player().boss_nfts[0].id, "0xnft");
        assert_eq!(engine.pending_nft(), Some(&newer));
    }

    #[test]
    fn missing_digest_is_an_error() {
        let mut engine = victorious_engine();
        let mut ledger = ScriptedLedger::minting(v1_content(json!(1)));
        ledger.response = Ok(TxResponse { digest: None });

        let result = block_on(submit_win_on_chain(
            &mut engine,
            &ledger,
            &MemoryStore::default(),
            &NeverDelay,
            &BridgeConfig::default(),
            "0xplayer",
        ));
        assert_eq!(result, Err(BridgeError::MissingDigest));
        assert!(engine.pending_nft().is_some(), "local state untouched");
    }

    #[test]
    fn ledger_errors_propagate() {
        let mut engine = victorious_engine();
        let mut ledger = ScriptedLedger::minting(v1_content(json!(1)));
        let rejected = LedgerError::Rejected {
            reason: "user declined".into(),
        };
        ledger.response = Err(rejected.clone());

        let result = block_on(submit_win_on_chain(
            &mut engine,
            &ledger,
            &MemoryStore::default(),
            &NeverDelay,
            &BridgeConfig::default(),
            "0xplayer",
        ));
        assert_eq!(result, Err(BridgeError::Ledger { error: rejected }));
    }

    #[test]
    fn undecodable_content_fails_loudly() {
        let mut engine = victorious_engine();
        let ledger = ScriptedLedger::minting(json!({
            "dataType": "moveObject",
            "type": "0x9::boss::BossNFT",
            "fields": { "title": "???" }
        }));

        let result = block_on(submit_win_on_chain(
            &mut engine,
            &ledger,
            &MemoryStore::default(),
            &NeverDelay,
            &BridgeConfig::default(),
            "0xplayer",
        ));
        assert!(matches!(
            result,
            Err(BridgeError::Decode { ref object_id, .. }) if object_id == "0xnft"
        ));
        assert!(engine.player().boss_nfts.is_empty());
    }

    #[test]
    fn transaction_without_nft_is_recorded_empty() {
        let mut engine = victorious_engine();
        let mut ledger = ScriptedLedger::minting(json!(null));
        ledger.changes.truncate(1);

        let outcome = block_on(submit_win_on_chain(
            &mut engine,
            &ledger,
            &MemoryStore::default(),
            &NeverDelay,
            &BridgeConfig::default(),
            "0xplayer",
        ));
        assert_eq!(
            outcome,
            Ok(SubmitOutcome::Recorded {
                digest: "0xdigest".into(),
                nft: None
            })
        );
        assert!(engine.pending_nft().is_some());
    }

    #[test]
    fn slow_ledger_yields_pending_confirmation() {
        let mut engine = victorious_engine();
        let mut ledger = ScriptedLedger::minting(v1_content(json!(1)));
        ledger.hang = true;
        let before = engine.snapshot();

        let outcome = block_on(submit_win_on_chain(
            &mut engine,
            &ledger,
            &MemoryStore::default(),
            &ImmediateDelay,
            &BridgeConfig::default(),
            "0xplayer",
        ))
        .expect("timeout is not an error");

        assert!(matches!(outcome, SubmitOutcome::PendingConfirmation { .. }));
        assert_eq!(engine.snapshot(), before);
    }

    #[test]
    fn nothing_to_submit_from_menu() {
        let mut engine = RunEngine::with_seed(GameConfig::default(), 1);
        let ledger = ScriptedLedger::minting(v1_content(json!(1)));
        let result = block_on(submit_win_on_chain(
            &mut engine,
            &ledger,
            &MemoryStore::default(),
            &NeverDelay,
            &BridgeConfig::default(),
            "0xplayer",
        ));
        assert_eq!(result, Err(BridgeError::NoWinToSubmit));
        assert!(ledger.calls.borrow().is_empty());
    }

    #[test]
    fn decoder_reads_v2_and_legacy_aliases() {
        let v2 = json!({
            "dataType": "moveObject",
            "type": "0x9::boss::BossNFT",
            "fields": {
                "name": "Eternal Void",
                "imageUrl": "assets/boss-void.png",
                "stage_defeated": "8",
                "run_score": "4600"
            }
        });
        let nft = decode_boss_nft("0x1", v2, "BossNFT", 0).expect("v2 decodes");
        assert_eq!(nft.stage_defeated, 8);
        assert_eq!(nft.run_score, 4600);
        assert_eq!(nft.boss.rarity, Rarity::Secret);

        let legacy = json!({
            "dataType": "moveObject",
            "type": "0x9::boss::BossNFT",
            "fields": { "boss_name": "Old One", "url": "x.png", "level": 2 }
        });
        let nft = decode_boss_nft("0x2", legacy, "BossNFT", 250).expect("legacy decodes");
        assert_eq!(nft.boss.name, "Old One");
        assert_eq!(nft.stage_defeated, 2);
        assert_eq!(nft.run_score, 250);
    }

    #[test]
    fn decoder_accepts_stage_defeated_without_run_score() {
        let content = json!({
            "dataType": "moveObject",
            "type": "0x9::boss::BossNFT",
            "fields": {
                "name": "Void Sentinel",
                "image_url": "assets/boss-void-sentinel.png",
                "stage_defeated": "3"
            }
        });
        let nft = decode_boss_nft("0x3", content, "BossNFT", 300).expect("decodes as v1");
        assert_eq!(nft.stage_defeated, 3);
        assert_eq!(nft.run_score, 300);
    }

    #[test]
    fn decoder_rejects_wrong_type_and_stage() {
        let wrong_type = json!({
            "dataType": "moveObject",
            "type": "0x9::coin::Coin",
            "fields": { "name": "x", "image_url": "y", "stage": 1 }
        });
        assert!(decode_boss_nft("0x1", wrong_type, "BossNFT", 0).is_err());

        let bad_stage = v1_content(json!(12));
        assert!(matches!(
            decode_boss_nft("0x1", bad_stage, "BossNFT", 0),
            Err(BridgeError::Decode { .. })
        ));
    }
}
