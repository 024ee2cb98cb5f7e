//! Typed wrappers for the three auth endpoints. Used by the authenticated
//! client and by the gate, which both need to renew and identify.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use super::transport::{error_for_status, ApiRequest, ApiResponse, Transport};
use crate::config::{LOGIN_PATH, REFRESH_PATH, WHOAMI_PATH};
use crate::error::{AppError, AppResult};
use crate::identity::{CallerIdentity, Session};

#[derive(Debug, Deserialize)]
struct LoginData {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct RefreshData {
    #[serde(rename = "accessToken")]
    access_token: String,
}

pub struct BackendApi<T: Transport> {
    transport: Arc<T>,
}

impl<T: Transport> Clone for BackendApi<T> {
    fn clone(&self) -> Self { Self { transport: self.transport.clone() } }
}

impl<T: Transport> BackendApi<T> {
    pub fn new(transport: Arc<T>) -> Self { Self { transport } }

    pub fn transport(&self) -> &Arc<T> { &self.transport }

    /// Exchange email/password for a credential pair. A 401 here means wrong
    /// credentials, never an expired session.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<Session> {
        let req = ApiRequest::post(LOGIN_PATH, json!({ "email": email, "password": password }));
        let resp = self.transport.send(&req).await?;
        if resp.is_authorization_failure() {
            let message = resp.message().unwrap_or_else(|| "Invalid email or password".to_string());
            return Err(AppError::CredentialInvalid { code: "invalid_credentials".into(), message });
        }
        let resp = resp.into_result()?;
        let data: LoginData = decode_data(&resp, "login")?;
        Session::new(data.access_token, data.refresh_token)
            .ok_or_else(|| AppError::internal("malformed_response", "login returned an empty credential"))
    }

    /// Trade the renewal credential for a new access credential.
    pub async fn refresh(&self, renewal_credential: &str) -> AppResult<String> {
        let req = ApiRequest::post(REFRESH_PATH, json!({ "refreshToken": renewal_credential }));
        let resp = self.transport.send(&req).await?;
        if !resp.is_success() {
            return Err(error_for_status(&resp));
        }
        let data: RefreshData = decode_data(&resp, "refresh")?;
        if data.access_token.trim().is_empty() {
            return Err(AppError::internal("malformed_response", "refresh returned an empty credential"));
        }
        Ok(data.access_token)
    }

    /// Resolve who the access credential belongs to.
    pub async fn whoami(&self, access_credential: &str) -> AppResult<CallerIdentity> {
        let req = ApiRequest::get(WHOAMI_PATH).with_bearer(Some(access_credential.to_string()));
        let resp = self.transport.send(&req).await?.into_result()?;
        decode_data(&resp, "whoami")
    }
}

pub(crate) fn decode_data<D: serde::de::DeserializeOwned>(resp: &ApiResponse, what: &str) -> AppResult<D> {
    serde_json::from_value(resp.data().clone()).map_err(|e| AppError::Internal {
        code: "malformed_response".into(),
        message: format!("unexpected {} response: {}", what, e),
    })
}
