//! 通用工具：时间戳、实体 ID、异步延时。

use futures::future::{FutureExt, LocalBoxFuture};
use gloo_timers::future::TimeoutFuture;
use rand::Rng;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/// 当前 Unix 毫秒时间戳。
#[cfg(target_arch = "wasm32")]
pub fn now_millis() -> u64 {
    web_sys::js_sys::Date::now() as u64
}

/// 当前 Unix 毫秒时间戳。
#[cfg(not(target_arch = "wasm32"))]
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// 生成形如 `card-1712345678901-k3j9x0a2b` 的 ID。
pub fn make_id<R: Rng + ?Sized>(prefix: &str, rng: &mut R) -> String {
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{prefix}-{}-{suffix}", now_millis())
}

/// 可替换的异步延时，给链上调用加超时用。
pub trait Delay {
    fn sleep(&self, millis: u32) -> LocalBoxFuture<'static, ()>;
}

/// 浏览器事件循环上的延时。
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserDelay;

impl Delay for BrowserDelay {
    fn sleep(&self, millis: u32) -> LocalBoxFuture<'static, ()> {
        TimeoutFuture::new(millis).boxed_local()
    }
}
