//! W3C WebDriver client.
//!
//! Talks the WebDriver HTTP protocol to chromedriver, geckodriver or a
//! Selenium grid. Every launch creates a new browser session with a fresh
//! profile, so no cookies or storage carry over between runs.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::models::BrowserConfig;
use crate::domain::ports::{BrowserError, BrowserLauncher, BrowserSession};

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

pub struct WebDriverLauncher {
    client: Client,
    base_url: String,
    headless: bool,
}

impl WebDriverLauncher {
    pub fn new(config: &BrowserConfig) -> Result<Self, BrowserError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.navigation_timeout_ms))
            .build()
            .map_err(|e| BrowserError::Session(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.webdriver_url.trim_end_matches('/').to_string(),
            headless: config.headless,
        })
    }

    fn capabilities(&self) -> Value {
        let mut args = vec!["--incognito", "--disable-gpu", "--no-sandbox", "--window-size=1280,1024"];
        if self.headless {
            args.push("--headless=new");
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    fn name(&self) -> &'static str {
        "webdriver"
    }

    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let url = format!("{}/session", self.base_url);
        let value = send(&self.client, Method::POST, &url, Some(self.capabilities())).await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol("new session response without sessionId".into()))?
            .to_string();

        debug!(session_id = %session_id, "webdriver session created");

        Ok(Box::new(WebDriverSession {
            client: self.client.clone(),
            session_url: format!("{}/session/{}", self.base_url, session_id),
            closed: AtomicBool::new(false),
        }))
    }
}

struct WebDriverSession {
    client: Client,
    session_url: String,
    closed: AtomicBool,
}

impl WebDriverSession {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, BrowserError> {
        let url = format!("{}{}", self.session_url, path);
        send(&self.client, method, &url, body).await
    }

    async fn find_element(&self, selector: &str) -> Result<String, BrowserError> {
        let value = self
            .command(
                Method::POST,
                "/element",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;

        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Protocol(format!("no element reference for {selector}")))
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map_err(|e| match e {
                BrowserError::Protocol(msg) => BrowserError::Navigation(msg),
                other => other,
            })?;
        Ok(())
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        let value = self.command(Method::GET, "/source", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Protocol("page source is not a string".into()))
    }

    async fn exists(&self, selector: &str) -> Result<bool, BrowserError> {
        let value = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        Ok(value.as_array().is_some_and(|a| !a.is_empty()))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let id = self.find_element(selector).await?;
        self.command(Method::POST, &format!("/element/{id}/clear"), Some(json!({})))
            .await?;
        self.command(
            Method::POST,
            &format!("/element/{id}/value"),
            Some(json!({ "text": value })),
        )
        .await?;
        Ok(())
    }

    async fn upload(&self, selector: &str, path: &str) -> Result<(), BrowserError> {
        // File inputs take the local path as typed text.
        let id = self.find_element(selector).await?;
        self.command(
            Method::POST,
            &format!("/element/{id}/value"),
            Some(json!({ "text": path })),
        )
        .await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let id = self.find_element(selector).await?;
        self.command(Method::POST, &format!("/element/{id}/click"), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        let value = self.command(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| BrowserError::Protocol("screenshot is not a string".into()))?;
        STANDARD
            .decode(encoded)
            .map_err(|e| BrowserError::Protocol(format!("invalid screenshot encoding: {e}")))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let url = self.session_url.clone();
        send(&self.client, Method::DELETE, &url, None).await?;
        Ok(())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            warn!(session = %self.session_url, "webdriver session dropped without close");
        }
    }
}

/// Send one WebDriver command and unwrap its `value`.
async fn send(
    client: &Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, BrowserError> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await.map_err(map_transport_error)?;
    let status = response.status();
    let mut payload: Value = response
        .json()
        .await
        .map_err(|e| BrowserError::Protocol(format!("invalid WebDriver response ({status}): {e}")))?;
    let value = payload.get_mut("value").map(Value::take).unwrap_or(Value::Null);

    if status.is_success() {
        Ok(value)
    } else {
        Err(map_webdriver_error(&value))
    }
}

fn map_transport_error(err: reqwest::Error) -> BrowserError {
    if err.is_timeout() {
        BrowserError::Timeout(err.to_string())
    } else {
        BrowserError::Network(err.to_string())
    }
}

/// Map a W3C error object (`{"error": ..., "message": ...}`).
fn map_webdriver_error(value: &Value) -> BrowserError {
    let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match error {
        "no such element" => BrowserError::ElementNotFound(message),
        "stale element reference" => BrowserError::StaleElement(message),
        "element not interactable" | "element click intercepted" => {
            BrowserError::NotInteractable(message)
        }
        "timeout" | "script timeout" => BrowserError::Timeout(message),
        "invalid session id" | "session not created" | "no such window" => {
            BrowserError::Session(message)
        }
        _ if message.contains("net::ERR_") => BrowserError::Navigation(message),
        other => BrowserError::Protocol(format!("{other}: {message}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn config(url: &str) -> BrowserConfig {
        BrowserConfig {
            webdriver_url: url.to_string(),
            navigation_timeout_ms: 2_000,
            ..BrowserConfig::default()
        }
    }

    async fn new_session(server: &mut Server) -> Box<dyn BrowserSession> {
        server
            .mock("POST", "/session")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"value":{"sessionId":"abc","capabilities":{}}}"#)
            .create_async()
            .await;
        let launcher = WebDriverLauncher::new(&config(&server.url())).unwrap();
        launcher.launch().await.unwrap()
    }

    #[tokio::test]
    async fn test_navigate_and_read_source() {
        let mut server = Server::new_async().await;
        let session = new_session(&mut server).await;

        let navigate = server
            .mock("POST", "/session/abc/url")
            .match_body(Matcher::PartialJson(json!({"url": "https://jobs.lever.co/acme/1/apply"})))
            .with_status(200)
            .with_body(r#"{"value":null}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/session/abc/source")
            .with_status(200)
            .with_body(r#"{"value":"<html>apply</html>"}"#)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/session/abc")
            .with_status(200)
            .with_body(r#"{"value":null}"#)
            .expect(1)
            .create_async()
            .await;

        session.navigate("https://jobs.lever.co/acme/1/apply").await.unwrap();
        assert_eq!(session.page_source().await.unwrap(), "<html>apply</html>");
        session.close().await.unwrap();
        session.close().await.unwrap();

        navigate.assert_async().await;
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_fill_clears_then_types() {
        let mut server = Server::new_async().await;
        let session = new_session(&mut server).await;

        server
            .mock("POST", "/session/abc/element")
            .match_body(Matcher::PartialJson(json!({"using": "css selector", "value": "#email"})))
            .with_status(200)
            .with_body(format!(r#"{{"value":{{"{ELEMENT_KEY}":"el-1"}}}}"#))
            .create_async()
            .await;
        let clear = server
            .mock("POST", "/session/abc/element/el-1/clear")
            .with_status(200)
            .with_body(r#"{"value":null}"#)
            .create_async()
            .await;
        let typed = server
            .mock("POST", "/session/abc/element/el-1/value")
            .match_body(Matcher::PartialJson(json!({"text": "ada@example.com"})))
            .with_status(200)
            .with_body(r#"{"value":null}"#)
            .create_async()
            .await;

        session.fill("#email", "ada@example.com").await.unwrap();
        clear.assert_async().await;
        typed.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_element_maps_to_not_found() {
        let mut server = Server::new_async().await;
        let session = new_session(&mut server).await;

        server
            .mock("POST", "/session/abc/element")
            .with_status(404)
            .with_body(
                r#"{"value":{"error":"no such element","message":"Unable to locate #first_name"}}"#,
            )
            .create_async()
            .await;

        let err = session.click("#first_name").await.unwrap_err();
        assert!(matches!(err, BrowserError::ElementNotFound(_)));
    }

    #[tokio::test]
    async fn test_exists_uses_element_list() {
        let mut server = Server::new_async().await;
        let session = new_session(&mut server).await;

        server
            .mock("POST", "/session/abc/elements")
            .with_status(200)
            .with_body(r#"{"value":[]}"#)
            .create_async()
            .await;

        assert!(!session.exists("#application_confirmation").await.unwrap());
    }

    #[tokio::test]
    async fn test_screenshot_is_decoded() {
        let mut server = Server::new_async().await;
        let session = new_session(&mut server).await;

        let encoded = STANDARD.encode(b"\x89PNGdata");
        server
            .mock("GET", "/session/abc/screenshot")
            .with_status(200)
            .with_body(format!(r#"{{"value":"{encoded}"}}"#))
            .create_async()
            .await;

        assert_eq!(session.screenshot().await.unwrap(), b"\x89PNGdata".to_vec());
    }

    #[tokio::test]
    async fn test_unreachable_driver_is_network_error() {
        let launcher = WebDriverLauncher::new(&config("http://127.0.0.1:1")).unwrap();
        let err = launcher.launch().await.err().unwrap();
        assert!(matches!(err, BrowserError::Network(_) | BrowserError::Timeout(_)));
    }

    #[test]
    fn test_error_mapping() {
        let stale = json!({"error": "stale element reference", "message": "gone"});
        assert_eq!(map_webdriver_error(&stale), BrowserError::StaleElement("gone".into()));

        let dns = json!({"error": "unknown error", "message": "net::ERR_NAME_NOT_RESOLVED"});
        assert!(matches!(map_webdriver_error(&dns), BrowserError::Navigation(_)));

        let odd = json!({"error": "unsupported operation", "message": "nope"});
        assert!(matches!(map_webdriver_error(&odd), BrowserError::Protocol(_)));
    }
}
