use std::time::Duration;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use reqwest::Client;

/// rustls 不自帶加密後端，第一次建立 client 前安裝 ring
static CRYPTO_PROVIDER: Lazy<()> = Lazy::new(|| {
    // 已安裝過時回傳 Err，可忽略
    let _ = rustls::crypto::ring::default_provider().install_default();
});

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Installs the process-wide rustls crypto provider if none is installed yet.
pub fn ensure_crypto_provider() {
    Lazy::force(&CRYPTO_PROVIDER);
}

/// Builds a reqwest client whose requests give up after `timeout`.
///
/// Redirects are limited and no retries are performed; a request that fails
/// is reported to the caller as is.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ensure_crypto_provider();

    Client::builder()
        // ===== 壓縮 =====
        .brotli(true)
        .gzip(true)
        // ===== 超時設置 =====
        .connect_timeout(timeout)
        .timeout(timeout)
        // ===== TCP 優化 =====
        .tcp_nodelay(true)
        // ===== 重定向 =====
        .redirect(reqwest::redirect::Policy::limited(5))
        // ===== Headers =====
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| anyhow!("Failed to create reqwest client: {:?}", e))
}
