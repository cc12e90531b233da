use std::future::Future;
use std::sync::Once;

use shardline_engine::SqlDialect;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a fmt subscriber once per test binary. `RUST_LOG` picks the
/// level; nothing is printed by default.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn run_shard_test<F, Fut>(dialect: SqlDialect, body: F)
where
    F: FnOnce(SqlDialect) -> Fut,
    Fut: Future<Output = ()>,
{
    init_tracing();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("failed to build tokio runtime");
    runtime.block_on(body(dialect));
}
