//! Main Slack bot implementation.
//!
//! The `ProjectBot` is the central component that:
//! - Connects to Slack via Socket Mode (WebSocket)
//! - Acknowledges every envelope immediately
//! - Runs each slash command in its own task
//! - Delivers rendered pages back to Slack
//!
//! # Example
//!
//! ```rust,ignore
//! use projectbot_slack::{BotConfig, ProjectBot, SlackWebClient};
//!
//! let config = BotConfig::from_env(None)?;
//! let web = SlackWebClient::new(&config)?;
//! let bot = ProjectBot::new(web, dispatcher);
//! bot.start().await?;
//! ```

use std::time::Duration;

use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

use crate::commands::{
    BotCommand, DelayedResponse, InvocationContext, SlashCommandPayload, parse_command,
    send_delayed_response,
};
use crate::config::BotConfig;
use crate::dispatch::Dispatcher;
use crate::error::{SlackApiError, SlackError, SlackResult};
use crate::events::{SocketEvent, SocketModeEnvelope};
use crate::messages::{SlackMessageContent, format_error_response};

/// Type alias for the WebSocket connection.
type WsConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Slack Web API base URL.
pub const SLACK_API_BASE: &str = "https://slack.com/api";

/// Slack accepts at most this many messages per `response_url`.
pub const MAX_RESPONSE_URL_MESSAGES: usize = 5;

/// Configuration for bot behavior.
#[derive(Debug, Clone)]
pub struct BotOptions {
    /// Delay between reconnection attempts.
    pub reconnect_delay: Duration,
    /// Ping interval for WebSocket keep-alive.
    pub ping_interval: Duration,
}

impl Default for BotOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Minimal Slack Web API client.
#[derive(Clone)]
pub struct SlackWebClient {
    client: reqwest::Client,
    bot_token: SecretString,
    app_token: SecretString,
    api_base: String,
}

impl std::fmt::Debug for SlackWebClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackWebClient")
            .field("bot_token", &"[REDACTED]")
            .field("app_token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl SlackWebClient {
    /// Create a client for the public Slack API.
    pub fn new(config: &BotConfig) -> SlackResult<Self> {
        Self::with_api_base(config.bot_token(), config.app_token(), SLACK_API_BASE)
    }

    /// Create a client for a custom API base (tests).
    pub fn with_api_base(
        bot_token: impl Into<String>,
        app_token: impl Into<String>,
        api_base: impl Into<String>,
    ) -> SlackResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SlackError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            bot_token: SecretString::new(bot_token.into().into()),
            app_token: SecretString::new(app_token.into().into()),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// Check the bot token and return the bot's user id.
    pub async fn auth_test(&self) -> SlackResult<String> {
        debug!("Testing Slack authentication...");
        let response = self
            .api_call("auth.test", &serde_json::json!({}), &self.bot_token)
            .await
            .map_err(|e| match e {
                SlackError::Api(msg) => SlackError::Auth(format!("auth.test failed: {}", msg)),
                other => other,
            })?;

        response
            .get("user_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| SlackError::Api("Missing user_id in auth.test response".to_string()))
    }

    /// Get the WebSocket URL for Socket Mode.
    pub async fn open_socket_url(&self) -> SlackResult<String> {
        let response = self
            .api_call("apps.connections.open", &serde_json::json!({}), &self.app_token)
            .await?;

        response
            .get("url")
            .and_then(|u| u.as_str())
            .map(str::to_string)
            .ok_or_else(|| SlackError::Api("Missing url in response".to_string()))
    }

    /// Send a message to a channel, returning its timestamp.
    pub async fn post_message(
        &self,
        channel: &str,
        content: &SlackMessageContent,
    ) -> SlackResult<String> {
        let mut payload = serde_json::json!({
            "channel": channel,
            "unfurl_links": false,
        });
        if let Some(text) = &content.text {
            payload["text"] = serde_json::json!(text);
        }
        if let Some(blocks) = &content.blocks {
            payload["blocks"] = serde_json::to_value(blocks)?;
        }

        let response = self
            .api_call("chat.postMessage", &payload, &self.bot_token)
            .await?;

        response
            .get("ts")
            .and_then(|ts| ts.as_str())
            .map(str::to_string)
            .ok_or_else(|| SlackError::Api("Missing ts in response".to_string()))
    }

    /// Make an API call to Slack and check its `ok` flag.
    async fn api_call(
        &self,
        method: &str,
        payload: &serde_json::Value,
        token: &SecretString,
    ) -> SlackResult<serde_json::Value> {
        let url = format!("{}/{}", self.api_base, method);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .header("Content-Type", "application/json; charset=utf-8")
            .json(payload)
            .send()
            .await?;

        // Check for rate limiting
        if response.status() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(30);
            return Err(SlackError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SlackError::Api(format!("{}: {}", status, body)));
        }

        let json: serde_json::Value = response.json().await?;
        if json.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let code = json
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown");
            return Err(SlackApiError::new(code, format!("{} failed", method)).into());
        }

        Ok(json)
    }
}

/// Run one slash command and deliver its result.
///
/// Successful output goes to the channel: through the command's
/// `response_url` when it fits in Slack's per-command message allowance,
/// otherwise through `chat.postMessage`. Help and errors are shown only
/// to the invoking user.
pub async fn handle_slash_command(
    web: &SlackWebClient,
    dispatcher: &Dispatcher,
    payload: &SlashCommandPayload,
) -> SlackResult<()> {
    let ctx = InvocationContext::from(payload);
    info!(
        command = %payload.command,
        channel = %ctx.channel_id,
        user = %ctx.user_id,
        "Handling slash command"
    );

    let parsed = parse_command(&payload.command, &payload.text);
    let private = matches!(parsed, Ok(BotCommand::Help));
    let result = match parsed {
        Ok(command) => dispatcher.dispatch(command, &ctx).await,
        Err(e) => Err(e),
    };

    let pages = match result {
        Ok(pages) => pages,
        Err(e) => {
            let message = e.user_message();
            if e.is_user_error() {
                debug!("Command rejected: {}", e);
            } else {
                warn!("Command failed: {}", e);
            }
            let response = DelayedResponse::from_message(format_error_response(&message)).ephemeral();
            return send_delayed_response(web.http(), &ctx.response_url, &response).await;
        }
    };

    if private || pages.len() <= MAX_RESPONSE_URL_MESSAGES {
        for page in &pages {
            let response = DelayedResponse::from_message(page.to_slack_message());
            let response = if private {
                response.ephemeral()
            } else {
                response.in_channel()
            };
            send_delayed_response(web.http(), &ctx.response_url, &response).await?;
        }
        return Ok(());
    }

    debug!(
        pages = pages.len(),
        "Too many pages for response_url, posting to channel"
    );
    for page in &pages {
        if let Err(e) = web.post_message(&ctx.channel_id, &page.to_slack_message()).await {
            error!("Failed to post page {}/{}: {}", page.index, page.total, e);
            let response =
                DelayedResponse::from_message(format_error_response(&partial_post_message(
                    page.index.saturating_sub(1),
                    page.total,
                )))
                .ephemeral();
            return send_delayed_response(web.http(), &ctx.response_url, &response).await;
        }
    }
    Ok(())
}

/// Hint shown when posting to the channel stopped after `posted` pages.
fn partial_post_message(posted: usize, total: usize) -> String {
    let hint = "Invite the bot to the channel, or add a status filter to narrow the list.";
    if posted == 0 {
        format!("I couldn't post the results to this channel. {}", hint)
    } else {
        format!(
            "I could only post {} of {} pages to this channel. {}",
            posted, total, hint
        )
    }
}

/// How a WebSocket session ended.
enum SessionEnd {
    Shutdown,
    Reconnect,
}

/// The main project bot.
pub struct ProjectBot {
    /// Slack Web API client.
    web: SlackWebClient,
    /// Command pipeline.
    dispatcher: Dispatcher,
    /// Bot options.
    options: BotOptions,
    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
}

impl ProjectBot {
    /// Create a new bot.
    pub fn new(web: SlackWebClient, dispatcher: Dispatcher) -> Self {
        Self::with_options(web, dispatcher, BotOptions::default())
    }

    /// Create a new bot with custom options.
    pub fn with_options(web: SlackWebClient, dispatcher: Dispatcher, options: BotOptions) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            web,
            dispatcher,
            options,
            shutdown_tx,
        }
    }

    /// Start the bot and run until shutdown.
    pub async fn start(&self) -> SlackResult<()> {
        info!("Starting project bot...");

        let user_id = self.web.auth_test().await?;
        info!("Authenticated as bot user: {}", user_id);

        self.run_socket_mode().await
    }

    /// Shutdown the bot gracefully.
    pub fn shutdown(&self) {
        info!("Shutting down Slack bot...");
        let _ = self.shutdown_tx.send(());
    }

    /// Run the Socket Mode connection loop.
    async fn run_socket_mode(&self) -> SlackResult<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            let outcome = match self.web.open_socket_url().await {
                Ok(ws_url) => {
                    info!("Connecting to Socket Mode...");
                    self.connect_and_run(&ws_url, &mut shutdown_rx).await
                }
                Err(SlackError::Auth(msg)) => return Err(SlackError::Auth(msg)),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(SessionEnd::Shutdown) => {
                    info!("Socket Mode connection closed gracefully");
                    return Ok(());
                }
                Ok(SessionEnd::Reconnect) => {
                    info!("Socket Mode session ended, reconnecting");
                }
                Err(e) => {
                    error!("Socket Mode connection error: {}", e);
                    info!("Reconnecting in {:?}...", self.options.reconnect_delay);
                    tokio::select! {
                        _ = shutdown_rx.recv() => return Ok(()),
                        _ = tokio::time::sleep(self.options.reconnect_delay) => {}
                    }
                }
            }
        }
    }

    /// Connect to WebSocket and run event loop.
    async fn connect_and_run(
        &self,
        ws_url: &str,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> SlackResult<SessionEnd> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (mut write, read) = ws_stream.split();

        // Channel for outgoing messages
        let (msg_tx, mut msg_rx) = mpsc::channel::<WsMessage>(100);

        // Spawn write task
        let write_task = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    error!("Failed to send WebSocket message: {}", e);
                    break;
                }
            }
        });

        // Spawn ping task
        let ping_tx = msg_tx.clone();
        let ping_interval = self.options.ping_interval;
        let ping_task = tokio::spawn(async move {
            let mut interval = interval(ping_interval);
            loop {
                interval.tick().await;
                if ping_tx.send(WsMessage::Ping(vec![])).await.is_err() {
                    break;
                }
            }
        });

        let result = self.process_messages(read, msg_tx, shutdown_rx).await;

        ping_task.abort();
        write_task.abort();

        result
    }

    /// Process incoming WebSocket messages.
    async fn process_messages(
        &self,
        mut read: SplitStream<WsConnection>,
        msg_tx: mpsc::Sender<WsMessage>,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> SlackResult<SessionEnd> {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    return Ok(SessionEnd::Shutdown);
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            if self.handle_socket_message(&text, &msg_tx).await {
                                return Ok(SessionEnd::Reconnect);
                            }
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            let _ = msg_tx.send(WsMessage::Pong(data)).await;
                        }
                        Some(Ok(WsMessage::Close(_))) => {
                            info!("WebSocket closed by server");
                            return Ok(SessionEnd::Reconnect);
                        }
                        Some(Err(e)) => {
                            return Err(SlackError::WebSocket(e.to_string()));
                        }
                        None => {
                            return Ok(SessionEnd::Reconnect);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Handle a Socket Mode frame. Returns true when Slack asked us to
    /// reconnect.
    async fn handle_socket_message(&self, text: &str, msg_tx: &mpsc::Sender<WsMessage>) -> bool {
        let envelope = match SocketModeEnvelope::parse(text) {
            Ok(env) => env,
            Err(e) => {
                warn!("Failed to parse Socket Mode envelope: {}", e);
                return false;
            }
        };

        // Always acknowledge first
        if let Some(ack) = envelope.ack() {
            match serde_json::to_string(&ack) {
                Ok(ack_json) => {
                    let _ = msg_tx.send(WsMessage::Text(ack_json)).await;
                }
                Err(e) => error!("Failed to encode acknowledgment: {}", e),
            }
        }

        match envelope.into_event() {
            Ok(SocketEvent::Hello) => {
                info!("Socket Mode connection established");
                false
            }
            Ok(SocketEvent::Disconnect { reason }) => {
                info!("Received disconnect request from Slack: {:?}", reason);
                true
            }
            Ok(SocketEvent::SlashCommand(payload)) => {
                let web = self.web.clone();
                let dispatcher = self.dispatcher.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_slash_command(&web, &dispatcher, &payload).await {
                        error!("Failed to deliver {} response: {}", payload.command, e);
                    }
                });
                false
            }
            Ok(SocketEvent::Ignored(_)) => false,
            Err(e) => {
                warn!("Dropping envelope: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchOptions;
    use crate::messages::SlackMessageBuilder;
    use async_trait::async_trait;
    use projectbot_github::{
        ChannelDirectory, ChannelProjectMapping, GraphQLRequest, GraphQLResponse, ProjectsApi,
        ProjectsError, ProjectsResult, RequestLimiter,
    };
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct OfflineApi;

    #[async_trait]
    impl ProjectsApi for OfflineApi {
        async fn execute(&self, _request: &GraphQLRequest) -> ProjectsResult<GraphQLResponse> {
            Err(ProjectsError::Upstream("offline".to_string()))
        }
    }

    fn offline_dispatcher() -> Dispatcher {
        Dispatcher::new(
            Arc::new(OfflineApi),
            Arc::new(RequestLimiter::default()),
            Arc::new(ChannelDirectory::new(ChannelProjectMapping::empty("acme"))),
            DispatchOptions::new("acme"),
        )
    }

    fn web_for(server: &MockServer) -> SlackWebClient {
        SlackWebClient::with_api_base("xoxb-test", "xapp-test", format!("{}/api", server.uri()))
            .unwrap()
    }

    fn payload(server: &MockServer, command: &str, text: &str) -> SlashCommandPayload {
        SlashCommandPayload {
            team_id: "T1".to_string(),
            channel_id: "C1".to_string(),
            channel_name: "general".to_string(),
            user_id: "U1".to_string(),
            user_name: "alice".to_string(),
            command: command.to_string(),
            text: text.to_string(),
            response_url: format!("{}/commands/T1/1/abc", server.uri()),
            trigger_id: "t".to_string(),
        }
    }

    #[test]
    fn test_bot_options_default() {
        let options = BotOptions::default();
        assert_eq!(options.reconnect_delay, Duration::from_secs(5));
        assert_eq!(options.ping_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_web_client_debug_redacts_tokens() {
        let web = SlackWebClient::with_api_base("xoxb-secret", "xapp-secret", SLACK_API_BASE).unwrap();
        let debug_str = format!("{:?}", web);
        assert!(!debug_str.contains("xoxb-secret"));
        assert!(!debug_str.contains("xapp-secret"));
    }

    #[tokio::test]
    async fn test_open_socket_url_uses_app_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/apps.connections.open"))
            .and(header("authorization", "Bearer xapp-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "url": "wss://wss.slack.com/link/?ticket=abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let url = web_for(&server).open_socket_url().await.unwrap();
        assert_eq!(url, "wss://wss.slack.com/link/?ticket=abc");
    }

    #[tokio::test]
    async fn test_auth_test_failure_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth.test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": false, "error": "invalid_auth"})),
            )
            .mount(&server)
            .await;

        let err = web_for(&server).auth_test().await.unwrap_err();
        assert!(matches!(err, SlackError::Auth(_)));
    }

    #[tokio::test]
    async fn test_post_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-test"))
            .and(body_partial_json(serde_json::json!({"channel": "C1", "text": "hi"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": true, "ts": "1700000000.000100"})),
            )
            .mount(&server)
            .await;

        let ts = web_for(&server)
            .post_message("C1", &SlackMessageBuilder::new().fallback("hi").build())
            .await
            .unwrap();
        assert_eq!(ts, "1700000000.000100");
    }

    #[tokio::test]
    async fn test_post_message_not_in_channel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": false, "error": "not_in_channel"})),
            )
            .mount(&server)
            .await;

        let err = web_for(&server)
            .post_message("C1", &SlackMessageBuilder::new().fallback("hi").build())
            .await
            .unwrap_err();
        assert!(matches!(err, SlackError::Channel(_)));
    }

    #[test]
    fn test_partial_post_message() {
        assert!(partial_post_message(0, 8).starts_with("I couldn't post the results"));
        assert!(partial_post_message(3, 8).contains("3 of 8 pages"));
    }

    #[tokio::test]
    async fn test_help_is_ephemeral() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/commands/T1/1/abc"))
            .and(body_partial_json(serde_json::json!({"response_type": "ephemeral"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        handle_slash_command(&web_for(&server), &offline_dispatcher(), &payload(&server, "/help", ""))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unmapped_channel_error_is_ephemeral() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/commands/T1/1/abc"))
            .and(body_partial_json(serde_json::json!({"response_type": "ephemeral"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        handle_slash_command(&web_for(&server), &offline_dispatcher(), &payload(&server, "/tasks", ""))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body["text"].as_str().unwrap().contains("isn't linked to a project"));
    }

    #[tokio::test]
    async fn test_upstream_failure_hides_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/commands/T1/1/abc"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        handle_slash_command(&web_for(&server), &offline_dispatcher(), &payload(&server, "/projects", ""))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let text = body["text"].as_str().unwrap();
        assert!(!text.contains("offline"));
        assert!(text.contains("try again"));
    }
}
