//! Request/response access to the server-side notification store.

use std::sync::OnceLock;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::{debug, trace};
use url::Url;

use crate::auth::AuthHandle;
use crate::config::NotifyConfig;
use crate::error::{NotifyError, Result};
use crate::model::{Notification, NotificationId};

/// Server-side notification store.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Fetch the user's most recent notifications, newest first.
    ///
    /// `fresh` asks the server to bypass its own caching.
    async fn fetch_recent(&self, limit: usize, fresh: bool) -> Result<Vec<Notification>>;

    /// Mark one notification read. Marking an already-read notification succeeds.
    async fn mark_read(&self, id: NotificationId) -> Result<()>;
}

/// Install the rustls crypto provider once per process.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// [`NotificationStore`] over the backend's REST API.
pub struct HttpNotificationStore {
    client: Client,
    base_url: Url,
    auth: AuthHandle,
}

impl HttpNotificationStore {
    pub fn new(base_url: &str, auth: AuthHandle, config: &NotifyConfig) -> Result<Self> {
        install_rustls_provider();
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Self::with_client(client, base_url, auth)
    }

    pub fn with_client(client: Client, base_url: &str, auth: AuthHandle) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| NotifyError::config(format!("invalid server URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(NotifyError::config(format!("server URL {base_url} cannot be a base")));
        }
        // Url::join drops the last segment unless the path ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            auth,
        })
    }

    pub(crate) fn list_url(&self, limit: usize, fresh: bool) -> Result<Url> {
        let mut url = self.join("api/notifications")?;
        if fresh {
            url.query_pairs_mut()
                .append_pair("fresh", "true")
                .append_pair("limit", &limit.to_string());
        } else {
            url.query_pairs_mut().append_pair("limit", &limit.to_string());
        }
        Ok(url)
    }

    pub(crate) fn mark_read_url(&self, id: NotificationId) -> Result<Url> {
        self.join(&format!("api/notifications/{id}/read"))
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| NotifyError::other(format!("failed to build URL for {path}: {e}")))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth.current() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(NotifyError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}

#[async_trait]
impl NotificationStore for HttpNotificationStore {
    async fn fetch_recent(&self, limit: usize, fresh: bool) -> Result<Vec<Notification>> {
        let url = self.list_url(limit, fresh)?;
        trace!(%url, "Fetching notifications");

        let response = self.authorize(self.client.get(url)).send().await?;
        let mut notifications: Vec<Notification> =
            Self::check_status(response)?.json().await?;
        notifications.truncate(limit);

        debug!(count = notifications.len(), "Fetched notifications");
        Ok(notifications)
    }

    async fn mark_read(&self, id: NotificationId) -> Result<()> {
        let url = self.mark_read_url(id)?;
        let response = self.authorize(self.client.patch(url)).send().await?;
        Self::check_status(response)?;
        trace!(notification_id = id, "Marked notification read");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(base: &str) -> HttpNotificationStore {
        install_rustls_provider();
        HttpNotificationStore::with_client(Client::new(), base, AuthHandle::anonymous()).unwrap()
    }

    #[test]
    fn test_list_url() {
        let store = store("http://localhost:5000");
        assert_eq!(
            store.list_url(50, true).unwrap().as_str(),
            "http://localhost:5000/api/notifications?fresh=true&limit=50"
        );
        assert_eq!(
            store.list_url(20, false).unwrap().as_str(),
            "http://localhost:5000/api/notifications?limit=20"
        );
    }

    #[test]
    fn test_base_path_is_preserved() {
        let store = store("https://chat.example.com/backend");
        assert_eq!(
            store.mark_read_url(42).unwrap().as_str(),
            "https://chat.example.com/backend/api/notifications/42/read"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        install_rustls_provider();
        let result =
            HttpNotificationStore::with_client(Client::new(), "not a url", AuthHandle::anonymous());
        assert!(matches!(result, Err(NotifyError::Configuration(_))));
    }
}
