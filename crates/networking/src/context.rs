//! Application context shared by every channel and consumer
//!
//! Holds what a page would otherwise keep in globals: the REST client, the
//! socket origin, and the cached signed-in user.

use crate::ApiClient;
use socialink_core::{config::to_ws_origin, ClientConfig, CurrentUser, Error, Result};
use std::sync::{PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct AppContext {
    api: ApiClient,
    ws_base_url: String,
    current_user: RwLock<Option<CurrentUser>>,
    /// Held while the identity endpoint is being asked
    identity_lookup: Mutex<()>,
}

impl AppContext {
    pub fn new(api: ApiClient) -> Self {
        let ws_base_url = to_ws_origin(api.base_url());
        Self {
            api,
            ws_base_url,
            current_user: RwLock::new(None),
            identity_lookup: Mutex::new(()),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let api = ApiClient::new(&config.base_url, config.token.as_deref())?;
        Ok(Self::new(api))
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// `ws://` or `wss://` origin the channels connect to
    pub fn ws_base_url(&self) -> &str {
        &self.ws_base_url
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.current_user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Id of the cached user, without touching the network
    pub fn cached_user_id(&self) -> Option<String> {
        self.current_user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|u| u.id.clone())
    }

    pub fn set_current_user(&self, user: CurrentUser) {
        *self
            .current_user
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(user);
    }

    pub fn clear_current_user(&self) {
        *self
            .current_user
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Current user id: cached value, else one call to the identity endpoint.
    ///
    /// Concurrent callers share a single lookup.
    pub async fn resolve_user_id(&self) -> Result<String> {
        if let Some(id) = self.cached_user_id() {
            return Ok(id);
        }

        let _lookup = self.identity_lookup.lock().await;
        if let Some(id) = self.cached_user_id() {
            return Ok(id);
        }

        debug!("No cached user, asking the identity endpoint");
        match self.api.current_user().await {
            Ok(user) => {
                let id = user.id.clone();
                self.set_current_user(user);
                Ok(id)
            }
            Err(e) => {
                warn!("Could not resolve current user: {}", e);
                Err(Error::Identity(e.to_string()))
            }
        }
    }
}
