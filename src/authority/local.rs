//! In-process adapter binding a client cache directly to a [`ViewAuthority`].
//!
//! Pushes still travel through the authority's notifier, so the client's
//! endpoint listener is exercised the same way as over the network.

use crate::authority::service::ViewAuthority;
use crate::domain::ports::{Authority, CallableAddress, View};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// Authority port served by a [`ViewAuthority`] in the same process
#[derive(Debug)]
pub struct InProcessAuthority {
    authority: Arc<ViewAuthority>,
    origin: RwLock<Option<CallableAddress>>,
}

impl InProcessAuthority {
    pub fn new(authority: Arc<ViewAuthority>) -> Self {
        Self {
            authority,
            origin: RwLock::new(None),
        }
    }

    pub fn authority(&self) -> &Arc<ViewAuthority> {
        &self.authority
    }
}

#[async_trait]
impl Authority for InProcessAuthority {
    async fn register(&self, address: &CallableAddress) -> Result<()> {
        self.authority.register(address.clone());
        *self.origin.write() = Some(address.clone());
        Ok(())
    }

    async fn fetch(&self) -> Result<View> {
        Ok(self.authority.fetch())
    }

    async fn put(&self, view: &View) -> Result<()> {
        let origin = self.origin.read().clone();
        self.authority.put(view.clone(), origin.as_ref()).await;
        Ok(())
    }

    fn endpoint(&self) -> &str {
        "in-process"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::notifier::{HttpNotifier, NotifierConfig};
    use crate::authority::service::ViewAuthorityConfig;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_then_fetch() {
        let notifier = Arc::new(HttpNotifier::new(NotifierConfig::default()).unwrap());
        let authority = ViewAuthority::new(ViewAuthorityConfig::default(), notifier);
        let port = InProcessAuthority::new(authority.clone());

        let address = CallableAddress::parse("http://127.0.0.1:7701").unwrap();
        port.register(&address).await.unwrap();

        let view: View = [("9", json!(1))].into_iter().collect();
        port.put(&view).await.unwrap();

        assert_eq!(port.fetch().await.unwrap(), view);
        assert_eq!(authority.clients().len(), 1);
        // the writer is its own origin and receives no push
        assert_eq!(authority.registry_stats().delivery_failures, 0);
    }
}
