// [apps/orchestrator/src/services/notify_channels.rs]
/*!
 * =================================================================
 * APARATO: CHANNEL ADAPTER MATRIX (V4.2 - MULTI-CHANNEL)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: ADAPTADORES CONCRETOS DE CANAL PARA EL HERALD
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CAPABILITY IMPLEMENTATION: 'ChannelExecutor' satisface el trait
 *    'ActionExecutor' del motor Herald; el correo se delega a la cola
 *    acotada, el resto de canales viajan por HTTP con timeout propio.
 * 2. PAYLOAD SHAPING: Cada canal recibe su forma nativa (Slack 'text',
 *    Discord 'content', PagerDuty Events v2, Telegram sendMessage...).
 * 3. HONEST CLASSIFICATION: 4xx ≠ 429 es permanente; 429/5xx/red es
 *    transitorio. La cola llena de correo es transitoria.
 * 4. SMTP REFERENCE PROVIDER: Diálogo SMTP mínimo sobre TCP plano
 *    (EHLO/AUTH LOGIN/MAIL/RCPT/DATA); la terminación TLS se delega al
 *    relay local de la malla de despliegue.
 * =================================================================
 */

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use edgelink_domain_models::Alert;
use edgelink_domain_notification::{
    ActionError, ActionSpec, ActionType, EmailMessage, EmailProvider, EmailQueue, NotifyError,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, instrument, warn};

/// Ejecutor de acciones del Herald contra los canales reales.
pub struct ChannelExecutor {
    http_client: reqwest::Client,
    email_queue: Arc<EmailQueue>,
    default_email_recipients: Vec<String>,
}

impl ChannelExecutor {
    pub fn new(
        action_timeout: Duration,
        email_queue: Arc<EmailQueue>,
        default_email_recipients: Vec<String>,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(action_timeout)
            .user_agent("EdgeLink-Herald/4")
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            email_queue,
            default_email_recipients,
        }
    }

    fn config_str(action: &ActionSpec, key: &str) -> Option<String> {
        action
            .config
            .get(key)
            .and_then(|value| value.as_str())
            .map(str::to_string)
    }

    fn require_url(action: &ActionSpec) -> Result<String, ActionError> {
        Self::config_str(action, "url")
            .ok_or_else(|| ActionError::Permanent("CHANNEL_CONFIG_MISSING: url".into()))
    }

    fn alert_summary(alert: &Alert) -> String {
        format!(
            "[{}] {} — {} (device: {}, occurrences: {})",
            alert.severity.to_string().to_uppercase(),
            alert.title,
            alert.message,
            alert.device_id.as_deref().unwrap_or("-"),
            alert.occurrence_count
        )
    }

    async fn post_json(
        &self,
        url: &str,
        body: serde_json::Value,
    ) -> Result<(), ActionError> {
        let response = self
            .http_client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|network_fault| ActionError::Transient(network_fault.to_string()))?;

        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(());
        }

        let excerpt: String = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(200)
            .collect();
        Err(ActionError::from_http_status(status, &excerpt))
    }

    fn enqueue_email(&self, action: &ActionSpec, alert: &Alert) -> Result<(), ActionError> {
        let recipients = action
            .config
            .get("to")
            .and_then(|value| value.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.as_str().map(str::to_string))
                    .collect::<Vec<_>>()
            })
            .filter(|entries| !entries.is_empty())
            .unwrap_or_else(|| self.default_email_recipients.clone());

        if recipients.is_empty() {
            return Err(ActionError::Permanent("EMAIL_NO_RECIPIENTS".into()));
        }

        let message = EmailMessage::new(
            recipients,
            format!("[EdgeLink] {} alert: {}", alert.severity, alert.title),
            Self::alert_summary(alert),
        );

        match self.email_queue.enqueue(message) {
            Ok(()) => Ok(()),
            // Cola llena: presión transitoria, el reintento decide.
            Err(NotifyError::QueueFull) => Err(ActionError::Transient("EMAIL_QUEUE_FULL".into())),
            Err(other) => Err(ActionError::Permanent(other.to_string())),
        }
    }
}

#[async_trait]
impl edgelink_domain_notification::ActionExecutor for ChannelExecutor {
    #[instrument(skip(self, action, alert), fields(channel = %action.action_type, alert = %alert.id))]
    async fn execute(&self, action: &ActionSpec, alert: &Alert) -> Result<(), ActionError> {
        let summary = Self::alert_summary(alert);

        match action.action_type {
            ActionType::Email => self.enqueue_email(action, alert),

            ActionType::Slack => {
                let url = Self::require_url(action)?;
                self.post_json(&url, json!({ "text": summary })).await
            }

            ActionType::Discord => {
                let url = Self::require_url(action)?;
                self.post_json(&url, json!({ "content": summary })).await
            }

            ActionType::Teams => {
                let url = Self::require_url(action)?;
                self.post_json(&url, json!({ "text": summary })).await
            }

            ActionType::Pagerduty => {
                let routing_key = Self::config_str(action, "routing_key").ok_or_else(|| {
                    ActionError::Permanent("CHANNEL_CONFIG_MISSING: routing_key".into())
                })?;
                self.post_json(
                    "https://events.pagerduty.com/v2/enqueue",
                    json!({
                        "routing_key": routing_key,
                        "event_action": "trigger",
                        "dedup_key": alert.id,
                        "payload": {
                            "summary": summary,
                            "severity": alert.severity.as_wire(),
                            "source": alert.device_id.as_deref().unwrap_or("edgelink"),
                        }
                    }),
                )
                .await
            }

            ActionType::Opsgenie => {
                let url = Self::config_str(action, "url")
                    .unwrap_or_else(|| "https://api.opsgenie.com/v2/alerts".into());
                self.post_json(
                    &url,
                    json!({
                        "message": summary,
                        "alias": alert.id,
                        "priority": match alert.severity {
                            edgelink_domain_models::Severity::Critical => "P1",
                            edgelink_domain_models::Severity::High => "P2",
                            edgelink_domain_models::Severity::Medium => "P3",
                            edgelink_domain_models::Severity::Low => "P4",
                        }
                    }),
                )
                .await
            }

            ActionType::Dingtalk => {
                let url = Self::require_url(action)?;
                self.post_json(
                    &url,
                    json!({ "msgtype": "text", "text": { "content": summary } }),
                )
                .await
            }

            ActionType::Wechat => {
                let url = Self::require_url(action)?;
                self.post_json(
                    &url,
                    json!({ "msgtype": "text", "text": { "content": summary } }),
                )
                .await
            }

            ActionType::Telegram => {
                let bot_token = Self::config_str(action, "bot_token").ok_or_else(|| {
                    ActionError::Permanent("CHANNEL_CONFIG_MISSING: bot_token".into())
                })?;
                let chat_id = Self::config_str(action, "chat_id").ok_or_else(|| {
                    ActionError::Permanent("CHANNEL_CONFIG_MISSING: chat_id".into())
                })?;
                self.post_json(
                    &format!("https://api.telegram.org/bot{bot_token}/sendMessage"),
                    json!({ "chat_id": chat_id, "text": summary }),
                )
                .await
            }

            ActionType::Webhook | ActionType::CustomHttp => {
                let url = Self::require_url(action)?;
                let payload = serde_json::to_value(alert)
                    .unwrap_or_else(|_| json!({ "alert_id": alert.id }));
                self.post_json(&url, payload).await
            }
        }
    }
}

// =================================================================
// PROVEEDOR SMTP DE REFERENCIA
// =================================================================

/// Configuración del relay SMTP saliente.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub sender: String,
}

/// Implementación de referencia del trait 'EmailProvider': diálogo
/// SMTP mínimo sobre TCP plano contra el relay de la malla.
pub struct SmtpEmailProvider {
    config: SmtpConfig,
}

impl SmtpEmailProvider {
    #[must_use]
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    async fn read_reply(
        reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
    ) -> Result<u16, ActionError> {
        let mut reply_code = 0u16;
        loop {
            let mut line = String::new();
            let bytes_read = reader
                .read_line(&mut line)
                .await
                .map_err(|io_fault| ActionError::Transient(io_fault.to_string()))?;
            if bytes_read == 0 {
                return Err(ActionError::Transient("SMTP_LINK_CLOSED".into()));
            }

            if line.len() < 4 {
                return Err(ActionError::Transient(format!("SMTP_REPLY_MALFORMED: {line}")));
            }
            reply_code = line[..3]
                .parse()
                .map_err(|_| ActionError::Transient(format!("SMTP_REPLY_MALFORMED: {line}")))?;

            // Las respuestas multi-línea usan '-' como cuarto carácter.
            if line.as_bytes()[3] != b'-' {
                break;
            }
        }
        Ok(reply_code)
    }

    fn classify_reply(reply_code: u16, context: &str) -> ActionError {
        // Convención SMTP: 4yz transitorio, 5yz permanente.
        if (400..500).contains(&reply_code) {
            ActionError::Transient(format!("SMTP_{reply_code} at {context}"))
        } else {
            ActionError::Permanent(format!("SMTP_{reply_code} at {context}"))
        }
    }

    async fn expect_reply(
        reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
        accepted: &[u16],
        context: &str,
    ) -> Result<(), ActionError> {
        let reply_code = Self::read_reply(reader).await?;
        if accepted.contains(&reply_code) {
            Ok(())
        } else {
            Err(Self::classify_reply(reply_code, context))
        }
    }

    async fn send_command(
        writer: &mut tokio::net::tcp::OwnedWriteHalf,
        command: &str,
    ) -> Result<(), ActionError> {
        writer
            .write_all(command.as_bytes())
            .await
            .map_err(|io_fault| ActionError::Transient(io_fault.to_string()))?;
        writer
            .write_all(b"\r\n")
            .await
            .map_err(|io_fault| ActionError::Transient(io_fault.to_string()))
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailProvider {
    async fn send(&self, message: &EmailMessage) -> Result<(), ActionError> {
        let remote = format!("{}:{}", self.config.host, self.config.port);
        let stream = TcpStream::connect(&remote)
            .await
            .map_err(|io_fault| ActionError::Transient(io_fault.to_string()))?;
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        Self::expect_reply(&mut reader, &[220], "GREETING").await?;

        Self::send_command(&mut writer, "EHLO edgelink.local").await?;
        Self::expect_reply(&mut reader, &[250], "EHLO").await?;

        if let (Some(username), Some(password)) =
            (&self.config.username, &self.config.password)
        {
            Self::send_command(&mut writer, "AUTH LOGIN").await?;
            Self::expect_reply(&mut reader, &[334], "AUTH").await?;
            Self::send_command(&mut writer, &BASE64.encode(username)).await?;
            Self::expect_reply(&mut reader, &[334], "AUTH_USER").await?;
            Self::send_command(&mut writer, &BASE64.encode(password)).await?;
            Self::expect_reply(&mut reader, &[235], "AUTH_PASS").await?;
        }

        Self::send_command(&mut writer, &format!("MAIL FROM:<{}>", self.config.sender)).await?;
        Self::expect_reply(&mut reader, &[250], "MAIL_FROM").await?;

        for recipient in &message.to {
            Self::send_command(&mut writer, &format!("RCPT TO:<{recipient}>")).await?;
            Self::expect_reply(&mut reader, &[250, 251], "RCPT_TO").await?;
        }

        Self::send_command(&mut writer, "DATA").await?;
        Self::expect_reply(&mut reader, &[354], "DATA").await?;

        // Cuerpo con cabeceras mínimas y punto-relleno (dot stuffing).
        let stuffed_body = message.body.replace("\r\n.", "\r\n..");
        let payload = format!(
            "From: <{}>\r\nTo: {}\r\nSubject: {}\r\n\r\n{}\r\n.",
            self.config.sender,
            message
                .to
                .iter()
                .map(|recipient| format!("<{recipient}>"))
                .collect::<Vec<_>>()
                .join(", "),
            message.subject,
            stuffed_body
        );
        Self::send_command(&mut writer, &payload).await?;
        Self::expect_reply(&mut reader, &[250], "DATA_SEAL").await?;

        Self::send_command(&mut writer, "QUIT").await?;
        debug!("📧 [SMTP_SENT]: Message {} accepted by relay {}.", message.id, remote);
        Ok(())
    }

    fn name(&self) -> &str {
        "smtp-relay"
    }
}

/// Proveedor nulo para despliegues sin relay configurado: contabiliza y
/// descarta con advertencia (el canal email queda operativo para tests).
pub struct DiscardEmailProvider;

#[async_trait]
impl EmailProvider for DiscardEmailProvider {
    async fn send(&self, message: &EmailMessage) -> Result<(), ActionError> {
        warn!(
            "🗑️ [EMAIL_DISCARDED]: No SMTP relay configured; dropping message {}.",
            message.id
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "discard"
    }
}
