// src/services/uazapi.rs

//! Cliente HTTP da API Uazapi.
//!
//! Toda chamada de saída carrega o timeout do cliente: um provedor
//! pendurado vira `ProviderUnavailable`, nunca uma espera infinita.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::common::error::AppError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Instância recém-provisionada no provedor.
#[derive(Debug, Clone)]
pub struct ProviderInstance {
    pub instance_name: Option<String>,
    pub token: String,
}

/// Visão normalizada do status que o provedor reporta.
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    /// Estado cru do provedor: "connected", "connecting", "disconnected", ...
    pub state: String,
    pub instance_name: Option<String>,
    pub phone_number: Option<String>,
    pub display_name: Option<String>,
    pub profile_pic_url: Option<String>,
    pub qrcode: Option<String>,
    pub pairing_code: Option<String>,
}

/// Fronteira com o provedor WhatsApp. A máquina de estados fala só com
/// este trait, o que deixa o cliente HTTP substituível nos testes.
#[async_trait]
pub trait WhatsAppProvider: Send + Sync {
    /// Provisiona uma instância nova em nome da organização.
    async fn init_instance(&self, name: &str) -> Result<ProviderInstance, AppError>;

    /// Consulta o estado vivo da instância dona do token.
    async fn instance_status(&self, token: &str) -> Result<ProviderStatus, AppError>;

    /// Pede pareamento: sem telefone = QR code, com telefone = código numérico.
    async fn connect(&self, token: &str, phone: Option<&str>) -> Result<ProviderStatus, AppError>;

    /// Encerra a sessão no provedor.
    async fn disconnect(&self, token: &str) -> Result<(), AppError>;
}

// --- Formato de resposta da Uazapi ---

#[derive(Debug, Deserialize)]
struct UazapiEnvelope {
    instance: Option<UazapiInstance>,
    status: Option<UazapiSession>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UazapiInstance {
    name: Option<String>,
    token: Option<String>,
    status: Option<String>,
    profile_name: Option<String>,
    profile_pic_url: Option<String>,
    qrcode: Option<String>,
    pairing_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UazapiSession {
    jid: Option<UazapiJid>,
}

#[derive(Debug, Deserialize)]
struct UazapiJid {
    user: Option<String>,
}

impl UazapiEnvelope {
    fn into_status(self) -> ProviderStatus {
        let instance = self.instance.unwrap_or(UazapiInstance {
            name: None,
            token: None,
            status: None,
            profile_name: None,
            profile_pic_url: None,
            qrcode: None,
            pairing_code: None,
        });

        ProviderStatus {
            state: instance.status.unwrap_or_else(|| "disconnected".to_string()),
            instance_name: instance.name,
            phone_number: self.status.and_then(|s| s.jid).and_then(|j| j.user),
            display_name: instance.profile_name,
            profile_pic_url: instance.profile_pic_url,
            qrcode: instance.qrcode,
            pairing_code: instance.pairing_code,
        }
    }
}

#[derive(Clone)]
pub struct UazapiClient {
    http: reqwest::Client,
    base_url: String,
    admin_token: Option<String>,
}

impl UazapiClient {
    pub fn new(base_url: String, admin_token: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            admin_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn transport_error(err: reqwest::Error) -> AppError {
    AppError::ProviderUnavailable(err.to_string())
}

#[async_trait]
impl WhatsAppProvider for UazapiClient {
    async fn init_instance(&self, name: &str) -> Result<ProviderInstance, AppError> {
        let admin_token = self
            .admin_token
            .as_deref()
            .ok_or(AppError::MissingAdminCredential)?;

        let response = self
            .http
            .post(self.url("/instance/init"))
            .header("admintoken", admin_token)
            .json(&json!({ "name": name }))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(AppError::ProviderUnavailable(format!(
                "init de instância retornou {}",
                response.status()
            )));
        }

        let envelope: UazapiEnvelope = response.json().await.map_err(transport_error)?;
        let instance = envelope
            .instance
            .ok_or_else(|| AppError::ProviderUnavailable("resposta de init sem instância".to_string()))?;
        let token = instance
            .token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AppError::ProviderUnavailable("resposta de init sem token".to_string()))?;

        Ok(ProviderInstance {
            instance_name: instance.name,
            token,
        })
    }

    async fn instance_status(&self, token: &str) -> Result<ProviderStatus, AppError> {
        let response = self
            .http
            .get(self.url("/instance/status"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport_error)?;

        // 401/403 = token recusado; o resto é indisponibilidade do provedor
        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(AppError::InvalidProviderToken);
        }
        if !response.status().is_success() {
            return Err(AppError::ProviderUnavailable(format!(
                "consulta de status retornou {}",
                response.status()
            )));
        }

        let envelope: UazapiEnvelope = response.json().await.map_err(transport_error)?;
        Ok(envelope.into_status())
    }

    async fn connect(&self, token: &str, phone: Option<&str>) -> Result<ProviderStatus, AppError> {
        let mut request = self
            .http
            .post(self.url("/instance/connect"))
            .bearer_auth(token);

        // Sem corpo = modo QR code; com telefone = código de pareamento
        if let Some(phone) = phone {
            request = request.json(&json!({ "phone": phone }));
        }

        let response = request.send().await.map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(AppError::ProviderUnavailable(format!(
                "pedido de pareamento retornou {}",
                response.status()
            )));
        }

        let envelope: UazapiEnvelope = response.json().await.map_err(transport_error)?;
        Ok(envelope.into_status())
    }

    async fn disconnect(&self, token: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(self.url("/instance/disconnect"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(AppError::ProviderUnavailable(format!(
                "disconnect retornou {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer, admin_token: Option<&str>) -> UazapiClient {
        UazapiClient::new(server.uri(), admin_token.map(str::to_string)).unwrap()
    }

    #[tokio::test]
    async fn init_instance_returns_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instance/init"))
            .and(header("admintoken", "admin-secret"))
            .and(body_json(json!({ "name": "Loja da Maria" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "instance": { "name": "loja-da-maria", "token": "tok-123", "status": "disconnected" }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("admin-secret")).await;
        let instance = client.init_instance("Loja da Maria").await.unwrap();

        assert_eq!(instance.token, "tok-123");
        assert_eq!(instance.instance_name.as_deref(), Some("loja-da-maria"));
    }

    #[tokio::test]
    async fn init_instance_without_admin_token_fails_fast() {
        let server = MockServer::start().await;
        let client = client_for(&server, None).await;

        let err = client.init_instance("qualquer").await.unwrap_err();
        assert!(matches!(err, AppError::MissingAdminCredential));
    }

    #[tokio::test]
    async fn init_instance_without_token_in_response_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instance/init"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "instance": { "name": "sem-token" }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("admin")).await;
        let err = client.init_instance("x").await.unwrap_err();
        assert!(matches!(err, AppError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn instance_status_parses_connected_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/instance/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "instance": {
                    "status": "connected",
                    "profileName": "Loja da Maria",
                    "profilePicUrl": "https://pps.whatsapp.net/abc.jpg"
                },
                "status": { "jid": { "user": "5511999990000" } }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, None).await;
        let status = client.instance_status("tok-123").await.unwrap();

        assert_eq!(status.state, "connected");
        assert_eq!(status.phone_number.as_deref(), Some("5511999990000"));
        assert_eq!(status.display_name.as_deref(), Some("Loja da Maria"));
    }

    #[tokio::test]
    async fn instance_status_defaults_to_disconnected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/instance/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = client_for(&server, None).await;
        let status = client.instance_status("tok-123").await.unwrap();
        assert_eq!(status.state, "disconnected");
    }

    #[tokio::test]
    async fn rejected_token_maps_to_invalid_provider_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/instance/status"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server, None).await;
        let err = client.instance_status("tok-ruim").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidProviderToken));
    }

    #[tokio::test]
    async fn provider_5xx_maps_to_provider_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/instance/status"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server, None).await;
        let err = client.instance_status("tok-123").await.unwrap_err();
        assert!(matches!(err, AppError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn connect_with_phone_sends_pairing_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instance/connect"))
            .and(body_json(json!({ "phone": "5511999990000" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "instance": { "status": "connecting", "paircode": null, "pairingCode": "ABCD-1234" }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, None).await;
        let status = client.connect("tok-123", Some("5511999990000")).await.unwrap();

        assert_eq!(status.state, "connecting");
        assert_eq!(status.pairing_code.as_deref(), Some("ABCD-1234"));
    }

    #[tokio::test]
    async fn connect_without_phone_requests_qrcode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instance/connect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "instance": { "status": "connecting", "qrcode": "data:image/png;base64,AAA" }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, None).await;
        let status = client.connect("tok-123", None).await.unwrap();

        assert_eq!(status.qrcode.as_deref(), Some("data:image/png;base64,AAA"));
        assert!(status.pairing_code.is_none());
    }

    #[tokio::test]
    async fn disconnect_is_ok_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instance/disconnect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "disconnected": true })))
            .mount(&server)
            .await;

        let client = client_for(&server, None).await;
        assert!(client.disconnect("tok-123").await.is_ok());
    }
}
