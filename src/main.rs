use minecraft_relay::{
    auth::UnavailableAuthenticator, config::ProxyConfig, context::ProxyContext,
    events::NullEventSink, listener::Listener,
};
use std::sync::Arc;

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_owned());
    let config = ProxyConfig::load(&config_path)?;

    if config.online_mode {
        tracing::warn!(
            "online-mode is enabled but no session authenticator is wired in; \
             online logins will be refused"
        );
    }

    let ctx = ProxyContext::new(
        config,
        Arc::new(NullEventSink),
        Arc::new(UnavailableAuthenticator),
    )?;

    let listener = Listener::bind(ctx)?;

    tokio::select! {
        _ = listener.serve() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }
    listener.close();

    Ok(())
}
