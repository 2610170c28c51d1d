//! 由前端对象实现的账本与存档（钱包适配器、Supabase 客户端等）。

use futures::future::{FutureExt, LocalBoxFuture};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::js_sys::{Array, Function, Promise, Reflect};

use super::ledger::{Ledger, LedgerError, MoveCall, ObjectChange, TxResponse};
use super::store::{SaveStore, StoreError};
use crate::game::state::{BossNft, Card, PlayerRecord, PlayerStats};

fn describe(error: JsValue) -> String {
    error.as_string().unwrap_or_else(|| format!("{error:?}"))
}

/// 调用 `target[method](...args)`，返回值统一按 Promise 等待。
async fn invoke(target: &JsValue, method: &str, args: Vec<JsValue>) -> Result<JsValue, String> {
    let function: Function = Reflect::get(target, &JsValue::from_str(method))
        .map_err(describe)?
        .dyn_into()
        .map_err(|_| format!("{method} is not a function"))?;
    let args: Array = args.into_iter().collect();
    let returned = function.apply(target, &args).map_err(describe)?;
    JsFuture::from(Promise::resolve(&returned))
        .await
        .map_err(describe)
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, String> {
    to_value(value).map_err(|error| error.to_string())
}

fn decode<T: DeserializeOwned>(value: JsValue) -> Result<T, String> {
    from_value(value).map_err(|error| error.to_string())
}

/// 钱包对象需提供 `signAndExecute(call)`、`objectChanges(digest)`、`objectContent(id)`。
pub struct JsLedger {
    wallet: JsValue,
}

impl JsLedger {
    pub fn new(wallet: JsValue) -> Self {
        Self { wallet }
    }
}

impl Ledger for JsLedger {
    fn sign_and_execute(&self, call: MoveCall) -> LocalBoxFuture<'_, Result<TxResponse, LedgerError>> {
        async move {
            let rejected = |reason| LedgerError::Rejected { reason };
            let call = encode(&call).map_err(rejected)?;
            let response = invoke(&self.wallet, "signAndExecute", vec![call])
                .await
                .map_err(rejected)?;
            decode(response).map_err(rejected)
        }
        .boxed_local()
    }

    fn object_changes(&self, digest: &str) -> LocalBoxFuture<'_, Result<Vec<ObjectChange>, LedgerError>> {
        let digest = JsValue::from_str(digest);
        async move {
            let network = |reason| LedgerError::Network { reason };
            let changes = invoke(&self.wallet, "objectChanges", vec![digest])
                .await
                .map_err(network)?;
            decode(changes).map_err(network)
        }
        .boxed_local()
    }

    fn object_content(&self, object_id: &str) -> LocalBoxFuture<'_, Result<serde_json::Value, LedgerError>> {
        let id = object_id.to_string();
        async move {
            let content = invoke(&self.wallet, "objectContent", vec![JsValue::from_str(&id)])
                .await
                .map_err(|reason| LedgerError::Network { reason })?;
            if content.is_null() || content.is_undefined() {
                return Err(LedgerError::ObjectNotFound { object_id: id });
            }
            decode(content).map_err(|reason| LedgerError::Network { reason })
        }
        .boxed_local()
    }
}

/// 存档对象需提供 `loadPlayerData`、`savePlayerStats`、`saveCard`、`deleteCard`、`saveNFT`、`deleteNFT`。
pub struct JsSaveStore {
    client: JsValue,
}

impl JsSaveStore {
    pub fn new(client: JsValue) -> Self {
        Self { client }
    }

    fn call_unit(&self, method: &'static str, args: Result<Vec<JsValue>, String>) -> LocalBoxFuture<'_, Result<(), StoreError>> {
        async move {
            let args = args.map_err(|reason| StoreError::Backend { reason })?;
            invoke(&self.client, method, args)
                .await
                .map(|_| ())
                .map_err(|reason| StoreError::Backend { reason })
        }
        .boxed_local()
    }
}

impl SaveStore for JsSaveStore {
    fn load_player_data(&self, address: &str) -> LocalBoxFuture<'_, Result<PlayerRecord, StoreError>> {
        let address = JsValue::from_str(address);
        async move {
            let backend = |reason| StoreError::Backend { reason };
            let record = invoke(&self.client, "loadPlayerData", vec![address])
                .await
                .map_err(backend)?;
            if record.is_null() || record.is_undefined() {
                return Err(backend("no player record returned".to_string()));
            }
            decode(record).map_err(backend)
        }
        .boxed_local()
    }

    fn save_player_stats(&self, address: &str, stats: PlayerStats) -> LocalBoxFuture<'_, Result<(), StoreError>> {
        let args = encode(&stats).map(|stats| vec![JsValue::from_str(address), stats]);
        self.call_unit("savePlayerStats", args)
    }

    fn save_card(&self, address: &str, card: &Card) -> LocalBoxFuture<'_, Result<(), StoreError>> {
        let args = encode(card).map(|card| vec![JsValue::from_str(address), card]);
        self.call_unit("saveCard", args)
    }

    fn delete_card(&self, address: &str, card_id: &str) -> LocalBoxFuture<'_, Result<(), StoreError>> {
        let args = vec![JsValue::from_str(address), JsValue::from_str(card_id)];
        self.call_unit("deleteCard", Ok(args))
    }

    fn save_nft(&self, address: &str, nft: &BossNft) -> LocalBoxFuture<'_, Result<(), StoreError>> {
        let args = encode(nft).map(|nft| vec![JsValue::from_str(address), nft]);
        self.call_unit("saveNFT", args)
    }

    fn delete_nft(&self, address: &str, nft_id: &str) -> LocalBoxFuture<'_, Result<(), StoreError>> {
        let args = vec![JsValue::from_str(address), JsValue::from_str(nft_id)];
        self.call_unit("deleteNFT", Ok(args))
    }
}
