use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::client::errors::{ClientError, ClientResult, ServerErrorResponse};
use crate::models::{
    AddLicenseResponse, HeartbeatResponse, ListHeartbeatsResponse, StatusResponse,
    VerifyResponse,
};

/// Header used to present the admin token.
const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// HTTP client for a keybeat server.
#[derive(Debug, Clone)]
pub struct KeybeatClient {
    http: Client,
    base_url: String,
}

impl KeybeatClient {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check whether `key` is an issued license.
    pub async fn verify(&self, key: &str) -> ClientResult<bool> {
        let req = self
            .http
            .post(self.url("/api/verify"))
            .json(&json!({ "key": key }));
        let resp: VerifyResponse = send(req).await?;
        Ok(resp.valid)
    }

    /// Report that `user` is alive under `key`. Returns the server timestamp.
    pub async fn heartbeat(
        &self,
        key: &str,
        user: &str,
        meta: Option<&Value>,
    ) -> ClientResult<i64> {
        let req = self
            .http
            .post(self.url("/api/heartbeat"))
            .json(&json!({ "key": key, "user": user, "meta": meta }));
        let resp: HeartbeatResponse = send(req).await?;
        Ok(resp.timestamp)
    }

    /// Fetch the online status of `user`.
    pub async fn status(&self, user: &str) -> ClientResult<StatusResponse> {
        let req = self
            .http
            .get(self.url("/api/status"))
            .query(&[("user", user)]);
        send(req).await
    }

    /// Issue a license (admin).
    pub async fn add_license(
        &self,
        token: &str,
        key: &str,
        owner: &str,
        expires: Option<i64>,
        hwid: Option<&str>,
    ) -> ClientResult<AddLicenseResponse> {
        let req = self
            .http
            .post(self.url("/api/admin/add_license"))
            .header(ADMIN_TOKEN_HEADER, token)
            .json(&json!({
                "key": key,
                "owner": owner,
                "expires": expires,
                "hwid": hwid,
            }));
        send(req).await
    }

    /// Fetch every heartbeat record (admin).
    pub async fn list_heartbeats(&self, token: &str) -> ClientResult<ListHeartbeatsResponse> {
        let req = self
            .http
            .get(self.url("/api/admin/list_heartbeats"))
            .header(ADMIN_TOKEN_HEADER, token);
        send(req).await
    }
}

/// Send a request and decode either the success shape or an `ok:false` body.
async fn send<T: DeserializeOwned>(req: RequestBuilder) -> ClientResult<T> {
    let resp = req.send().await?;
    let status = resp.status();
    let body = resp.text().await?;
    decode(status, &body)
}

fn decode<T: DeserializeOwned>(status: StatusCode, body: &str) -> ClientResult<T> {
    if let Ok(err) = serde_json::from_str::<ServerErrorResponse>(body) {
        if !err.ok {
            return Err(ClientError::Api(err.error));
        }
    }

    serde_json::from_str(body).map_err(|_| ClientError::UnexpectedResponse {
        status: status.as_u16(),
        body: body.to_string(),
    })
}
