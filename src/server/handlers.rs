use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::errors::{KeybeatError, KeybeatResult};
use crate::models::{
    is_online, iso8601, now_millis, present, text_field, truthy_field, AddLicenseResponse,
    HeartbeatRecord, HeartbeatResponse, LicenseRecord, ListHeartbeatsResponse, StatusResponse,
    VerifyResponse,
};
use crate::server::api_error::ApiError;
use crate::server::auth::is_authorized;
use crate::server::database::Database;
use crate::server::logging::{log_license_event, LicenseEvent};
use crate::server::repository::{Heartbeats, Licenses, Repository};
use crate::server::routes::Route;

/// Shared application state for handlers.
///
/// Holds no request data: everything a request sees comes from storage.
#[derive(Clone)]
pub struct AppState {
    pub repo: Repository,
    /// Admin shared secret. `None` disables the admin endpoints.
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(db: Arc<Database>, admin_token: Option<String>) -> Self {
        Self {
            repo: Repository::new(db),
            admin_token: admin_token.filter(|t| !t.is_empty()).map(Arc::from),
        }
    }
}

/// Everything a single operation may look at.
#[derive(Debug)]
pub struct RequestContext {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub body: Value,
}

impl RequestContext {
    /// Parse the body of write-capable methods.
    ///
    /// An empty payload is an empty object; anything else must be JSON.
    pub fn parse(
        method: Method,
        uri: &Uri,
        headers: HeaderMap,
        payload: &[u8],
    ) -> Result<Self, ApiError> {
        let body = if is_write_method(&method) && !payload.is_empty() {
            serde_json::from_slice(payload).map_err(|e| {
                debug!("Rejecting malformed JSON body: {e}");
                ApiError::invalid_json()
            })?
        } else {
            Value::Object(Map::new())
        };

        let query = Query::<HashMap<String, String>>::try_from_uri(uri)
            .map(|Query(q)| q)
            .unwrap_or_default();

        Ok(Self {
            method,
            headers,
            query,
            body,
        })
    }

    fn query_value(&self, name: &str) -> Option<&str> {
        present(self.query.get(name).map(String::as_str))
    }
}

fn is_write_method(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

/// Single entry point for every request.
///
/// Parses the body, loads both mappings (healing them if needed), then
/// dispatches on the path prefix.
pub async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    payload: Bytes,
) -> Response {
    match handle(&state, method, &uri, headers, &payload).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn handle(
    state: &AppState,
    method: Method,
    uri: &Uri,
    headers: HeaderMap,
    payload: &[u8],
) -> Result<Response, ApiError> {
    let ctx = RequestContext::parse(method, uri, headers, payload)?;

    let licenses = state.repo.load_licenses().await?;
    let heartbeats = state.repo.load_heartbeats().await?;

    let response = match Route::from_path(uri.path()) {
        Some(Route::Verify) => Json(verify(&ctx, &licenses)?).into_response(),
        Some(Route::Heartbeat) => {
            Json(heartbeat(&state.repo, &ctx, &licenses, heartbeats).await?).into_response()
        }
        Some(Route::Status) => Json(status(&ctx, &heartbeats, now_millis())?).into_response(),
        Some(Route::AddLicense) => {
            Json(add_license(state, &ctx, licenses).await?).into_response()
        }
        Some(Route::ListHeartbeats) => {
            Json(list_heartbeats(state, &ctx, heartbeats)?).into_response()
        }
        None => return Err(ApiError::not_found()),
    };

    Ok(response)
}

/// Is `key` an issued license? No side effects.
pub fn verify(ctx: &RequestContext, licenses: &Licenses) -> Result<VerifyResponse, ApiError> {
    let key = text_field(&ctx.body, "key")
        .or_else(|| ctx.query_value("key").map(str::to_string))
        .ok_or_else(ApiError::missing_key)?;

    let valid = licenses.contains_key(&key);
    let event = if valid {
        LicenseEvent::Verified
    } else {
        LicenseEvent::VerifyFailed
    };
    log_license_event(event, &key, None);

    Ok(VerifyResponse { ok: true, valid })
}

/// Record a heartbeat for `user` under a valid license key.
///
/// Overwrites any previous record for the user and persists the whole
/// heartbeat mapping.
pub async fn heartbeat(
    repo: &Repository,
    ctx: &RequestContext,
    licenses: &Licenses,
    mut heartbeats: Heartbeats,
) -> Result<HeartbeatResponse, ApiError> {
    let (Some(key), Some(user)) = (text_field(&ctx.body, "key"), text_field(&ctx.body, "user"))
    else {
        return Err(ApiError::missing_fields());
    };

    if !licenses.contains_key(&key) {
        log_license_event(LicenseEvent::HeartbeatRejected, &key, Some(user.as_str()));
        return Err(ApiError::invalid_key());
    }

    let now = now_millis();
    let record = HeartbeatRecord {
        key,
        last: now,
        meta: truthy_field(&ctx.body, "meta").cloned().unwrap_or(Value::Null),
    };
    heartbeats.insert(user.clone(), stored(&record)?);
    repo.save_heartbeats(&heartbeats).await?;

    log_license_event(LicenseEvent::Heartbeat, &record.key, Some(user.as_str()));

    Ok(HeartbeatResponse {
        ok: true,
        saved: true,
        timestamp: now,
    })
}

/// Report whether `user` is online, relative to `now_ms`. No side effects.
pub fn status(
    ctx: &RequestContext,
    heartbeats: &Heartbeats,
    now_ms: i64,
) -> Result<StatusResponse, ApiError> {
    let user = if ctx.method == Method::POST {
        text_field(&ctx.body, "user")
    } else {
        ctx.query_value("user").map(str::to_string)
    };
    let user = user.ok_or_else(ApiError::missing_user)?;

    let Some(entry) = heartbeats.get(&user) else {
        return Ok(StatusResponse::offline());
    };

    // An entry without a usable `last` is reported offline with its meta.
    let last = HeartbeatRecord::stored_last(entry);
    Ok(StatusResponse {
        ok: true,
        online: last.is_some_and(|last| is_online(last, now_ms)),
        last,
        human_last: last.map(iso8601),
        meta: Some(truthy_field(entry, "meta").cloned().unwrap_or(Value::Null)),
    })
}

fn stored<T: serde::Serialize>(record: &T) -> Result<Value, ApiError> {
    Ok(serde_json::to_value(record).map_err(KeybeatError::from)?)
}

fn require_admin(state: &AppState, ctx: &RequestContext, route: &str) -> Result<(), ApiError> {
    if is_authorized(&ctx.headers, &ctx.query, state.admin_token.as_deref()) {
        Ok(())
    } else {
        log_license_event(LicenseEvent::Unauthorized, route, None);
        Err(ApiError::unauthorized())
    }
}

/// Issue a license, overwriting any existing record under the same key.
pub async fn add_license(
    state: &AppState,
    ctx: &RequestContext,
    mut licenses: Licenses,
) -> Result<AddLicenseResponse, ApiError> {
    require_admin(state, ctx, Route::AddLicense.prefix())?;

    let (Some(key), Some(owner)) = (text_field(&ctx.body, "key"), text_field(&ctx.body, "owner"))
    else {
        return Err(ApiError::missing_fields());
    };

    let record = LicenseRecord {
        owner,
        created: now_millis(),
        expires: truthy_field(&ctx.body, "expires").cloned().unwrap_or(Value::Null),
        hwid: text_field(&ctx.body, "hwid").unwrap_or_default(),
    };
    licenses.insert(key.clone(), stored(&record)?);
    state.repo.save_licenses(&licenses).await?;

    log_license_event(LicenseEvent::Issued, &key, Some(record.owner.as_str()));

    Ok(AddLicenseResponse {
        ok: true,
        added: true,
        key,
        meta: record,
    })
}

/// Dump the whole heartbeat mapping.
pub fn list_heartbeats(
    state: &AppState,
    ctx: &RequestContext,
    heartbeats: Heartbeats,
) -> Result<ListHeartbeatsResponse, ApiError> {
    require_admin(state, ctx, Route::ListHeartbeats.prefix())?;
    info!("Listing {} heartbeat records", heartbeats.len());

    Ok(ListHeartbeatsResponse {
        ok: true,
        heartbeats,
    })
}

/// Load both mappings, healing them if needed. Used at startup so a fresh
/// store is materialized before the first request.
pub async fn bootstrap_storage(repo: &Repository) -> KeybeatResult<(usize, usize)> {
    let licenses = repo.load_licenses().await?;
    let heartbeats = repo.load_heartbeats().await?;
    Ok((licenses.len(), heartbeats.len()))
}
