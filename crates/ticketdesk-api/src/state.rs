//! Shared state handed to every handler.

use ticketdesk_config::ConfigId;
use ticketdesk_core::{AppContext, BootstrapOptions, Collaborators};

use crate::http::errors::ApiError;
use crate::http::inbound::Inbound;

/// Collaborators and settings used to bootstrap a context per request.
#[derive(Clone)]
pub struct ApiState {
    config_id: ConfigId,
    collaborators: Collaborators,
    options: BootstrapOptions,
}

impl ApiState {
    /// State serving profile `config_id`.
    #[must_use]
    pub const fn new(
        config_id: ConfigId,
        collaborators: Collaborators,
        options: BootstrapOptions,
    ) -> Self {
        Self {
            config_id,
            collaborators,
            options,
        }
    }

    /// Profile served by this instance.
    #[must_use]
    pub const fn config_id(&self) -> ConfigId {
        self.config_id
    }

    pub(crate) async fn bootstrap(&self, inbound: &Inbound) -> Result<AppContext, ApiError> {
        let context = AppContext::start(
            self.config_id,
            &inbound.request,
            inbound.session_id.as_ref(),
            &self.collaborators,
            &self.options,
        )
        .await?;
        Ok(context)
    }
}
