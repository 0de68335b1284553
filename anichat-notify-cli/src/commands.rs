use std::sync::Arc;

use anichat_notify::{
    AuthHandle, HttpNotificationStore, NotificationService, NotificationStore, RefreshOutcome,
    TokenFile, WebSocketTransport,
};
use anyhow::{Context, Result, bail};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::output::OutputManager;

pub struct CommandExecutor {
    config: AppConfig,
    output: OutputManager,
}

impl CommandExecutor {
    pub fn new(config: AppConfig, output: OutputManager) -> Self {
        Self { config, output }
    }

    /// `--token` wins over the token file.
    async fn auth(&self) -> Result<AuthHandle> {
        if let Some(token) = &self.config.token {
            return Ok(AuthHandle::with_token(token.clone()));
        }
        if let Some(path) = &self.config.token_file {
            let file = TokenFile::new(path);
            let token = file
                .load()
                .await
                .with_context(|| format!("Failed to read token file {}", path.display()))?;
            if let Some(token) = token {
                debug!(path = %path.display(), "Loaded token from file");
                return Ok(AuthHandle::with_token(token));
            }
        }
        bail!(
            "No auth token: pass --token, set ANICHAT_TOKEN or point --token-file at a saved token"
        )
    }

    fn store(&self, auth: &AuthHandle) -> Result<HttpNotificationStore> {
        HttpNotificationStore::new(&self.config.server_url, auth.clone(), &self.config.notify)
            .context("Failed to build notification store client")
    }

    fn service(&self, auth: AuthHandle) -> Result<NotificationService> {
        let store = self.store(&auth)?;
        let transport = WebSocketTransport::new(self.config.ws_url.clone())
            .with_close_timeout(self.config.notify.connect_timeout());
        NotificationService::new(
            self.config.notify.clone(),
            Arc::new(store),
            Arc::new(transport),
            auth,
        )
        .context("Failed to start notification service")
    }

    pub async fn watch(&self, as_json: bool) -> Result<()> {
        let auth = self.auth().await?;
        let service = self.service(auth)?;
        let mut events = service.subscribe();

        info!(
            server = %self.config.server_url,
            push = %self.config.ws_url,
            "Watching notifications"
        );
        service.start().await;

        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        warn!(error = %e, "Failed to listen for Ctrl-C");
                    }
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        if let Some(line) = self.output.format_event(&event, as_json) {
                            println!("{line}");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Terminal output fell behind, events skipped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        service.stop().await;
        Ok(())
    }

    pub async fn list(&self, unread_only: bool, as_json: bool) -> Result<()> {
        let auth = self.auth().await?;
        let store = self.store(&auth)?;
        let mut notifications = store
            .fetch_recent(self.config.notify.max_cache_size, true)
            .await
            .context("Failed to fetch notifications")?;
        if unread_only {
            notifications.retain(|n| n.is_unread());
        }

        println!("{}", self.output.format_notifications(&notifications, as_json)?);
        Ok(())
    }

    pub async fn mark_all_read(&self, as_json: bool) -> Result<()> {
        let auth = self.auth().await?;
        let service = self.service(auth)?;

        match service.refresh().await {
            RefreshOutcome::Refreshed(count) => debug!(count, "Loaded notifications"),
            outcome => bail!("Failed to load notifications ({outcome:?})"),
        }

        let summary = service.mark_all_as_read().await;
        println!("{}", self.output.format_summary(&summary, as_json)?);
        if summary.failed > 0 {
            bail!("{} notifications could not be marked read", summary.failed);
        }
        Ok(())
    }
}
