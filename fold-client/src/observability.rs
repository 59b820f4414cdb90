//! Log output for applications that have no subscriber of their own.

/// Install a `fmt` subscriber filtered by `RUST_LOG`, defaulting to
/// `fold_client=info,fold_auth=info`.
///
/// Does nothing if a global subscriber is already set.
#[cfg(feature = "tracing-basic")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fold_client=info,fold_auth=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
