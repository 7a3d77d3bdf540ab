use async_trait::async_trait;

use common::{BrokerAuth, Result, SessionTokens};

/// Session credentials handed in through the environment. The broker login
/// exchange happens outside this process; relogin just replays the same
/// tokens.
pub struct StaticAuth {
    tokens: SessionTokens,
}

impl StaticAuth {
    pub fn new(streaming_credential: String, session_credential: String) -> Self {
        Self {
            tokens: SessionTokens {
                streaming_credential,
                session_credential,
            },
        }
    }
}

#[async_trait]
impl BrokerAuth for StaticAuth {
    async fn login(&self) -> Result<SessionTokens> {
        Ok(self.tokens.clone())
    }

    async fn relogin(&self) -> Result<SessionTokens> {
        Ok(self.tokens.clone())
    }
}
