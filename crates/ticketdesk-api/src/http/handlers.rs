//! Route handlers. Each one bootstraps its own request context.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, header::SET_COOKIE},
    response::IntoResponse,
};
use serde::Serialize;
use ticketdesk_core::{AppContext, Notices};
use tracing::{debug, warn};

use crate::http::errors::ApiError;
use crate::http::inbound::{Inbound, session_set_cookie};
use crate::state::ApiState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
}

#[derive(Serialize)]
pub(crate) struct CsrfDescriptor {
    pub(crate) name: String,
    pub(crate) token: String,
}

#[derive(Serialize)]
pub(crate) struct SessionResponse {
    pub(crate) config_id: u32,
    pub(crate) version: String,
    pub(crate) online: bool,
    pub(crate) upgrade_pending: bool,
    pub(crate) csrf: CsrfDescriptor,
    pub(crate) notices: Notices,
}

#[derive(Serialize)]
pub(crate) struct PurgeResponse {
    pub(crate) purged: bool,
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Start or resume the caller's session and hand out its anti-forgery token.
pub(crate) async fn session(
    State(state): State<Arc<ApiState>>,
    inbound: Inbound,
) -> Result<impl IntoResponse, ApiError> {
    let mut context = state.bootstrap(&inbound).await?;
    let token = context.csrf_token();
    if !context.is_system_online() {
        context
            .notices_mut()
            .set_warning("The help desk is currently offline");
    }
    context.add_extra_header("Cache-Control: no-store");

    let body = SessionResponse {
        config_id: context.config_id(),
        version: context.version().to_string(),
        online: context.is_system_online(),
        upgrade_pending: context.is_upgrade_pending(),
        csrf: CsrfDescriptor {
            name: context.csrf().name().to_string(),
            token,
        },
        notices: context.notices().clone(),
    };
    finish(&context, Json(body)).await
}

/// Delete audit entries past the retention window.
pub(crate) async fn purge_logs(
    State(state): State<Arc<ApiState>>,
    inbound: Inbound,
) -> Result<impl IntoResponse, ApiError> {
    let context = state.bootstrap(&inbound).await?;
    context.require_csrf(&inbound.request, None).await?;
    let purged = context.purge_logs().await;
    debug!(purged, "log purge requested");
    finish(&context, Json(PurgeResponse { purged })).await
}

async fn finish<T: IntoResponse>(
    context: &AppContext,
    body: T,
) -> Result<(HeaderMap, T), ApiError> {
    context.commit_session().await?;

    let mut headers = HeaderMap::new();
    let cookie = session_set_cookie(context.session().id());
    let cookie = HeaderValue::from_str(&cookie)
        .map_err(|err| ApiError::internal(format!("invalid session cookie: {err}")))?;
    headers.insert(SET_COOKIE, cookie);

    for line in context.extra_headers() {
        let Some((name, value)) = line.split_once(':') else {
            warn!(header = %line, "skipping malformed extra header");
            continue;
        };
        match (
            HeaderName::try_from(name.trim()),
            HeaderValue::from_str(value.trim()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(header = %line, "skipping malformed extra header"),
        }
    }
    Ok((headers, body))
}
