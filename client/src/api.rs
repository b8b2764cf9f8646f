use std::time::Duration;

use reqwest::{header::AUTHORIZATION, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use arrosage_common::{
    normalize_history,
    wire::{PATH_CHANGE_PASSWORD, PATH_EMAIL, PATH_HISTORY, PATH_LATEST, PATH_LOGIN},
    ClientError, HistoryPoint, HistoryQuery, HistoryResult,
};

use crate::store::TokenStore;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const MAIL_FORMAT_REJECTED: &str = "ne correspond pas au format attendu";
const OLD_PASSWORD_REJECTED: &str = "Ancien mot de passe incorrect";
const PASSWORD_TOO_WEAK: &str = "trop faible";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    id: &'a str,
    mdp: &'a str,
}

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    mail: &'a str,
}

#[derive(Debug, Serialize)]
struct ChangePasswordRequest<'a> {
    id: &'a str,
    #[serde(rename = "ancienMDP")]
    old_password: &'a str,
    #[serde(rename = "newMDP")]
    new_password: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ServerReply {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Request/response calls against the backend REST endpoints.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenStore,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, tokens: TokenStore) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Exchanges credentials for a bearer token and stores it.
    pub async fn login(&self, id: &str, password: &str) -> Result<String, ClientError> {
        if id.trim().is_empty() || password.is_empty() {
            return Err(ClientError::Validation(
                "identifier and password are required".to_string(),
            ));
        }

        let response = self
            .http
            .post(self.url(PATH_LOGIN))
            .timeout(REQUEST_TIMEOUT)
            .json(&LoginRequest { id, mdp: password })
            .send()
            .await
            .map_err(http_error)?;
        let status = response.status();
        let reply = read_reply(response).await;

        let token = reply.token.filter(|token| !token.is_empty());
        let Some(token) = token else {
            let message = reply
                .message
                .unwrap_or_else(|| "invalid credentials".to_string());
            warn!("login rejected for {id} (HTTP {status}): {message}");
            return Err(ClientError::Auth(message));
        };

        self.tokens.save(&token).await?;
        info!("login succeeded for {id}");
        Ok(token)
    }

    pub async fn register_email(&self, mail: &str) -> Result<String, ClientError> {
        if mail.trim().is_empty() {
            return Err(ClientError::Validation("email address is required".to_string()));
        }

        let request = self
            .authorized(self.http.post(self.url(PATH_EMAIL)))
            .await?
            .json(&EmailRequest { mail: mail.trim() });
        let response = request.send().await.map_err(http_error)?;
        let status = response.status();
        let message = read_reply(response).await.message.unwrap_or_default();

        if message.contains(MAIL_FORMAT_REJECTED) {
            return Err(ClientError::Validation(message));
        }
        check_status(status, &message)?;
        info!("email registration: {message}");
        Ok(message)
    }

    pub async fn change_password(
        &self,
        id: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<String, ClientError> {
        if new_password.is_empty() {
            return Err(ClientError::Validation(
                "new password is required".to_string(),
            ));
        }

        let request = self
            .authorized(self.http.post(self.url(PATH_CHANGE_PASSWORD)))
            .await?
            .json(&ChangePasswordRequest {
                id,
                old_password,
                new_password,
            });
        let response = request.send().await.map_err(http_error)?;
        let status = response.status();
        let message = read_reply(response).await.message.unwrap_or_default();

        if message.contains(OLD_PASSWORD_REJECTED) {
            return Err(ClientError::Auth(message));
        }
        if message.contains(PASSWORD_TOO_WEAK) {
            return Err(ClientError::Validation(message));
        }
        check_status(status, &message)?;
        info!("password changed for {id}");
        Ok(message)
    }

    /// Fetches history for a window, or the server's default window when
    /// `query` is `None`.
    ///
    /// Only an invalid query is an `Err`; transport and server failures come
    /// back as an empty result carrying the error message.
    pub async fn fetch_history(
        &self,
        query: Option<HistoryQuery>,
    ) -> Result<HistoryResult, ClientError> {
        if let Some(query) = &query {
            query.validate()?;
        }

        match self.try_fetch_history(query).await {
            Ok(points) => {
                debug!("history fetched: {} points", points.len());
                Ok(HistoryResult {
                    points,
                    error: None,
                })
            }
            Err(err) => {
                warn!("history fetch failed: {err}");
                Ok(HistoryResult::failed(err.to_string()))
            }
        }
    }

    /// Raw body of the latest-readings endpoint, in the same shape as a
    /// socket frame.
    pub async fn fetch_latest(&self) -> Result<String, ClientError> {
        let response = self
            .authorized(self.http.get(self.url(PATH_LATEST)))
            .await?
            .send()
            .await
            .map_err(http_error)?;
        let status = response.status();
        let body = response.text().await.map_err(http_error)?;
        check_status(status, &body)?;
        Ok(body)
    }

    async fn try_fetch_history(
        &self,
        query: Option<HistoryQuery>,
    ) -> Result<Vec<HistoryPoint>, ClientError> {
        let url = self.url(PATH_HISTORY);
        let request = match query {
            Some(query) => self.http.post(url).json(&query.body()),
            None => self.http.get(url),
        };
        let response = self
            .authorized(request)
            .await?
            .send()
            .await
            .map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            let message = read_reply(response).await.message.unwrap_or_default();
            return Err(status_error(status, &message));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| ClientError::Parse(err.to_string()))?;
        Ok(normalize_history(&body))
    }

    async fn authorized(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, ClientError> {
        let token = self
            .tokens
            .load()
            .await?
            .ok_or_else(|| ClientError::Auth("no token available".to_string()))?;
        Ok(request
            .timeout(REQUEST_TIMEOUT)
            .header(AUTHORIZATION, format!("Bearer {token}")))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

// The backend answers with a JSON object, a bare JSON string or plain text
// depending on the route.
async fn read_reply(response: Response) -> ServerReply {
    let Ok(body) = response.text().await else {
        return ServerReply::default();
    };
    match serde_json::from_str::<Value>(&body) {
        Ok(Value::String(message)) => ServerReply {
            token: None,
            message: Some(message),
        },
        Ok(value @ Value::Object(_)) => serde_json::from_value(value).unwrap_or_default(),
        _ => {
            let text = body.trim();
            ServerReply {
                token: None,
                message: (!text.is_empty()).then(|| text.to_string()),
            }
        }
    }
}

fn check_status(status: StatusCode, message: &str) -> Result<(), ClientError> {
    if status.is_success() {
        return Ok(());
    }
    Err(status_error(status, message))
}

fn status_error(status: StatusCode, message: &str) -> ClientError {
    let detail = if message.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {message}")
    };
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return ClientError::Auth(detail);
    }
    ClientError::Http(detail)
}

fn http_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        return ClientError::Timeout(err.to_string());
    }
    ClientError::Http(err.to_string())
}
