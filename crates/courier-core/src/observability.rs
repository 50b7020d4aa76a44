//! Observability - tracing subscriber の初期化
//!
//! `RUST_LOG` があればそれを、無ければ `LoggingConfig::filter` を使う。
//! 2 回目以降の呼び出しは何もしない。

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingConfig};

static INIT: OnceLock<()> = OnceLock::new();

fn build_env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber once.
pub fn init_tracing(cfg: &LoggingConfig) {
    INIT.get_or_init(|| {
        let env_filter = build_env_filter(&cfg.filter);
        let fmt_layer = match cfg.format {
            LogFormat::Text => tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .compact()
                .with_filter(env_filter)
                .boxed(),
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .json()
                .with_filter(env_filter)
                .boxed(),
        };

        // 既に別の subscriber が入っていてもエラーにはしない
        if tracing_subscriber::registry().with(fmt_layer).try_init().is_err() {
            tracing::debug!("global tracing subscriber already set, keeping it");
        }
    });
}
