//! Adapter from axum requests to the core request surface.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::{
    Form,
    extract::{ConnectInfo, FromRequest, MatchedPath, Request},
    http::{HeaderMap, header::CONTENT_TYPE, header::COOKIE},
};
use ticketdesk_core::{RequestInfo, SessionId};

use crate::http::constants::{SESSION_COOKIE, UNKNOWN_PEER};
use crate::http::errors::ApiError;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Request snapshot handed to the core, plus the session cookie if present.
#[derive(Debug, Clone)]
pub(crate) struct Inbound {
    pub(crate) request: RequestInfo,
    pub(crate) session_id: Option<SessionId>,
}

impl<S> FromRequest<S> for Inbound
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let page = req.extensions().get::<MatchedPath>().map_or_else(
            || req.uri().path().to_string(),
            |matched| matched.as_str().to_string(),
        );
        let remote = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map_or_else(|| UNKNOWN_PEER.to_string(), |ConnectInfo(addr)| addr.ip().to_string());
        let session_id = session_cookie(req.headers());

        let mut request = RequestInfo::new(page, remote);
        for (name, value) in req.headers() {
            if let Ok(value) = value.to_str() {
                request = request.with_header(name.as_str(), value);
            }
        }

        if is_form(req.headers()) {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
            request = request.with_form(fields);
        }

        Ok(Self {
            request,
            session_id,
        })
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(FORM_CONTENT_TYPE))
}

pub(crate) fn session_cookie(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| SessionId::from(value))
}

pub(crate) fn session_set_cookie(id: &SessionId) -> String {
    format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax")
}
