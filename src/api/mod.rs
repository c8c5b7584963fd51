use crate::config::Config;
use crate::models::{Categoria, CategoriasPayload, CatalogoAmbito, CatalogoPayload, EstadoPayload, Resultados};
use log::{info, warn};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

const TOKEN_TIMEOUT: Duration = Duration::from_secs(15);
const CATALOG_TIMEOUT: Duration = Duration::from_secs(20);
const RESULTS_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_TOKEN_ATTEMPTS: u32 = 4;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("upstream returned HTTP {status}")]
    Http { status: u16 },
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected payload shape on {endpoint}: {detail}")]
    DataShape { endpoint: String, detail: String },
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ApiError::Http {
                status: status.as_u16(),
            },
            None => ApiError::Network(e.to_string()),
        }
    }
}

/// Holds the bearer token for the upstream API. Created from RESULTADOS_TOKEN
/// when supplied, otherwise lazily via /createtoken with the configured
/// credentials. The client invalidates it after a 401 so the next get()
/// re-authenticates.
pub struct TokenManager {
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    cached: Option<String>,
}

impl TokenManager {
    fn new(config: &Config) -> Self {
        Self {
            base_url: config.base_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            cached: config.token.clone(),
        }
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub async fn get(&mut self, http: &Client) -> Result<String, ApiError> {
        if let Some(token) = &self.cached {
            return Ok(token.clone());
        }
        let token = self.create_token(http).await?;
        self.cached = Some(token.clone());
        Ok(token)
    }

    /// GET /createtoken with credentials in headers, retrying with backoff on
    /// 429/5xx and network failures. Other HTTP errors surface immediately.
    async fn create_token(&self, http: &Client) -> Result<String, ApiError> {
        let (username, password) = match (&self.username, &self.password) {
            (Some(u), Some(p)) => (u.as_str(), p.as_str()),
            _ => {
                return Err(ApiError::Auth(
                    "no credentials available to obtain a token".to_string(),
                ));
            }
        };
        let url = format!("{}/createtoken", self.base_url);
        let mut wait = Duration::from_secs(1);
        let mut last_err = None;
        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            match self.request_token(http, &url, username, password).await {
                Ok(token) => return Ok(token),
                Err(e) => {
                    let retryable = matches!(
                        e,
                        ApiError::Network(_)
                            | ApiError::Http {
                                status: 429 | 500 | 502 | 503 | 504
                            }
                    );
                    if !retryable {
                        return Err(e);
                    }
                    warn!("createtoken attempt {attempt} failed: {e}");
                    last_err = Some(e);
                    if attempt < MAX_TOKEN_ATTEMPTS {
                        tokio::time::sleep(wait).await;
                        wait = (wait * 2).min(Duration::from_secs(16));
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ApiError::Auth("token creation failed".to_string())))
    }

    async fn request_token(
        &self,
        http: &Client,
        url: &str,
        username: &str,
        password: &str,
    ) -> Result<String, ApiError> {
        let resp = http
            .get(url)
            .header("username", username)
            .header("password", password)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(TOKEN_TIMEOUT)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
            });
        }
        let body = resp.text().await?;
        extract_token(&body).ok_or_else(|| {
            ApiError::Auth("createtoken response carried no recognizable token".to_string())
        })
    }
}

/// A 200 from getResultados is only usable when it actually carries JSON;
/// the upstream has been seen answering maintenance pages with status 200.
fn is_parseable_json(body: &str) -> bool {
    !body.trim().is_empty() && serde_json::from_str::<serde_json::Value>(body).is_ok()
}

/// The token comes back under varying keys, sometimes nested, sometimes as a
/// plain-text body.
fn extract_token(body: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(token) = token_from_value(&value) {
            return Some(token);
        }
    }
    let text = body.trim();
    let text = text.strip_prefix("Bearer ").unwrap_or(text).trim();
    let text = text.trim_matches(|c| c == '"' || c == '\'').trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn token_from_value(value: &serde_json::Value) -> Option<String> {
    let obj = value.as_object()?;
    for key in ["access_token", "token", "accessToken", "AccessToken"] {
        if let Some(serde_json::Value::String(s)) = obj.get(key) {
            let s = s.trim();
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    for key in ["data", "result", "resultado"] {
        if let Some(nested) = obj.get(key) {
            if let Some(token) = token_from_value(nested) {
                return Some(token);
            }
        }
    }
    None
}

/// Typed GET client for the results API. Owns the token manager; every
/// request goes through the explicit 401 contract in authorized_get.
pub struct ApiClient {
    http: Client,
    base_url: String,
    tokens: TokenManager,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            base_url: config.base_url.clone(),
            tokens: TokenManager::new(config),
        }
    }

    /// One request under the two-step auth contract: attempt, on 401 refresh
    /// the token once and retry once, then surface. Non-auth failures are not
    /// retried here; the next scheduled cycle is the retry.
    async fn authorized_get(
        &mut self,
        path: &str,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<String, ApiError> {
        let token = self.tokens.get(&self.http).await?;
        let mut resp = self.issue(path, params, &token, timeout).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            info!("401 on {path}, refreshing token and retrying once");
            self.tokens.invalidate();
            let token = self.tokens.get(&self.http).await?;
            resp = self.issue(path, params, &token, timeout).await?;
            if resp.status() == StatusCode::UNAUTHORIZED {
                return Err(ApiError::Auth(format!(
                    "{path} still unauthorized after token refresh"
                )));
            }
        }
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
            });
        }
        Ok(resp.text().await?)
    }

    async fn issue(
        &self,
        path: &str,
        params: &[(&str, &str)],
        token: &str,
        timeout: Duration,
    ) -> Result<Response, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .query(params)
            .bearer_auth(token)
            // The upstream reads this header too.
            .header("Token", token)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await?;
        Ok(resp)
    }

    fn parse<T: DeserializeOwned>(path: &str, body: &str) -> Result<T, ApiError> {
        serde_json::from_str(body).map_err(|e| ApiError::DataShape {
            endpoint: path.to_string(),
            detail: format!("{e} (body starts {:?})", body.chars().take(120).collect::<String>()),
        })
    }

    /// Returns the parsed categories together with the raw body, which goes
    /// to the one-time categories dump log.
    pub async fn get_categorias(&mut self) -> Result<(Vec<Categoria>, String), ApiError> {
        let path = "/catalogo/getCategorias";
        let body = self.authorized_get(path, &[], CATALOG_TIMEOUT).await?;
        let payload: CategoriasPayload = Self::parse(path, &body)?;
        Ok((payload.into_vec(), body))
    }

    pub async fn get_catalogo(&mut self, categoria_id: i64) -> Result<Vec<CatalogoAmbito>, ApiError> {
        let path = "/catalogo/getCatalogo";
        let cid = categoria_id.to_string();
        let body = self
            .authorized_get(path, &[("categoriaId", cid.as_str())], CATALOG_TIMEOUT)
            .await?;
        let payload: CatalogoPayload = Self::parse(path, &body)?;
        Ok(payload.into_vec())
    }

    pub async fn get_resultados(
        &mut self,
        categoria_id: i64,
        distrito_id: Option<&str>,
    ) -> Result<Resultados, ApiError> {
        let path = "/resultados/getResultados";
        let cid = categoria_id.to_string();
        let mut params = vec![("categoriaId", cid.as_str())];
        if let Some(d) = distrito_id {
            params.push(("distritoId", d));
        }
        let mut body = self.authorized_get(path, &params, RESULTS_TIMEOUT).await?;
        if !is_parseable_json(&body) {
            // The upstream occasionally answers 200 with an empty or non-JSON
            // body; give it a second and ask again.
            warn!("unusable resultados body for categoria {categoria_id} distrito {distrito_id:?}, retrying once");
            tokio::time::sleep(Duration::from_secs(1)).await;
            body = self.authorized_get(path, &params, RESULTS_TIMEOUT).await?;
        }
        if body.trim().is_empty() {
            return Ok(Resultados::default());
        }
        Self::parse(path, &body)
    }

    pub async fn get_estado_recuento(
        &mut self,
        categoria_id: i64,
        distrito_id: Option<&str>,
    ) -> Result<Option<f64>, ApiError> {
        let path = "/estados/estadoRecuento";
        let cid = categoria_id.to_string();
        let mut params = vec![("categoriaId", cid.as_str())];
        if let Some(d) = distrito_id {
            params.push(("distritoId", d));
        }
        let body = self.authorized_get(path, &params, CATALOG_TIMEOUT).await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let payload: EstadoPayload = Self::parse(path, &body)?;
        Ok(payload.mesas_pct())
    }
}
