//! Fieldhouse client - headless sync core runner
//!
//! Hydrates the chat cache over REST, opens the push connection after the
//! startup delay, and logs notifications until Ctrl-C.

use std::sync::Arc;

use fieldhouse_client::{
    logging, ws::NativeConnector, ApiClient, ChatStore, ClientConfig, ConnectionManager,
    EventRouter, NotificationStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = ClientConfig::from_env();
    let chats = Arc::new(ChatStore::new(config.month_key, config.history_merge));
    let notifications = Arc::new(NotificationStore::new());
    let router = Arc::new(EventRouter::new(chats.clone(), notifications.clone()));
    let manager = ConnectionManager::new(&config, Arc::new(NativeConnector), router.clone());

    let api = ApiClient::from_config(&config);
    if let Err(e) = api.hydrate(&chats).await {
        fieldhouse_client::log_warn!("hydration failed: {}", e);
    }

    manager.schedule_connect();

    let mut feed = notifications.subscribe();
    let mut errors = manager.last_error();
    let mut refresh = router.subscribe_refresh();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(()) = feed.changed() => {
                let unread = notifications.unread_count();
                fieldhouse_client::log_info!("{} unread notifications", unread);
            }
            Ok(()) = errors.changed() => {
                if let Some(err) = errors.borrow_and_update().clone() {
                    fieldhouse_client::log_error!("connection: {}", err);
                }
            }
            Ok(signal) = refresh.recv() => {
                fieldhouse_client::log_info!("calendar refresh requested: {}", signal.payload);
            }
        }
    }

    manager.teardown();
    Ok(())
}
