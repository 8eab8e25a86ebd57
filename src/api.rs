use std::sync::mpsc::Sender;
use std::thread;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::domain::{Message, PvError};
use crate::record::Product;

/// Thin HTTP shim over the products API. The view engine never sees this,
/// it only consumes the decoded record sequence.
#[derive(Clone)]
pub struct ApiClient {
    base: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct ProductsResponse {
    products: Vec<Product>,
}

impl ApiClient {
    pub fn new(base: impl Into<String>) -> Self {
        ApiClient {
            base: base.into().trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    /// `GET {base}/products?limit=100` with a bearer credential.
    pub fn fetch_products(&self, token: &str) -> Result<Vec<Product>, PvError> {
        let url = format!("{}/products?limit=100", self.base);
        let response = self.http.get(&url).bearer_auth(token).send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(PvError::Network(fetch_error_message(status.as_u16(), &body)));
        }
        let products = decode_products(&body)?;
        info!("Fetched {} products", products.len());
        Ok(products)
    }

    /// `POST {base}/auth/login` exchanging username/password for a token.
    pub fn login(&self, username: &str, password: &str) -> Result<String, PvError> {
        let url = format!("{}/auth/login", self.base);
        let payload = serde_json::json!({
            "username": username,
            "password": password,
        });
        let response = self.http.post(&url).json(&payload).send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(PvError::Auth(login_error_message(&body)));
        }
        extract_token(&body)
    }
}

/// Error text for a failed fetch: the server's `message` field when the body
/// parses, a generic status line otherwise.
fn fetch_error_message(status: u16, body: &str) -> String {
    message_field(body).unwrap_or_else(|| format!("Request failed with status {status}"))
}

/// Login rejections fall back to a fixed phrase instead of a status line.
fn login_error_message(body: &str) -> String {
    message_field(body).unwrap_or_else(|| "Invalid username or password".to_string())
}

fn message_field(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("message")?.as_str().map(str::to_string)
}

fn decode_products(body: &str) -> Result<Vec<Product>, PvError> {
    let response: ProductsResponse = serde_json::from_str(body)
        .map_err(|_| PvError::DataShape("No product list in server response".to_string()))?;
    Ok(response.products)
}

/// The token field moved around between API revisions; accept all the known
/// spellings, nested under `data` included.
fn extract_token(body: &str) -> Result<String, PvError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|_| PvError::Auth("Token not found in login response".to_string()))?;
    let token = value
        .get("token")
        .or_else(|| value.get("accessToken"))
        .or_else(|| value.get("data").and_then(|d| d.get("token")))
        .or_else(|| value.get("data").and_then(|d| d.get("accessToken")))
        .and_then(Value::as_str);
    token
        .map(str::to_string)
        .ok_or_else(|| PvError::Auth("Token not found in login response".to_string()))
}

/// Fetch on a worker thread, posting the outcome back into the event loop.
/// The generation number lets the model drop completions that were
/// overtaken by a newer request.
pub fn spawn_fetch(client: ApiClient, token: String, generation: u64, tx: Sender<Message>) {
    thread::spawn(move || {
        debug!("Fetch {generation} started");
        let result = client.fetch_products(&token);
        if tx.send(Message::RecordsLoaded(generation, result)).is_err() {
            debug!("Fetch {generation} finished after shutdown");
        }
    });
}

pub fn spawn_login(client: ApiClient, username: String, password: String, tx: Sender<Message>) {
    thread::spawn(move || {
        let result = client.login(&username, &password);
        if tx.send(Message::LoginFinished(result)).is_err() {
            debug!("Login finished after shutdown");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_is_surfaced_verbatim() {
        let body = r#"{"message":"Invalid credentials"}"#;
        assert_eq!(fetch_error_message(401, body), "Invalid credentials");
        assert_eq!(login_error_message(body), "Invalid credentials");
    }

    #[test]
    fn unparseable_error_bodies_fall_back_to_generic_text() {
        assert_eq!(
            fetch_error_message(500, "<html>oops</html>"),
            "Request failed with status 500"
        );
        assert_eq!(
            login_error_message("not json"),
            "Invalid username or password"
        );
    }

    #[test]
    fn decode_products_unwraps_the_list() {
        let body = r#"{"products":[{"id":1,"title":"iPhone 9","brand":"Apple",
            "category":"smartphones","price":549,"rating":4.69,"stock":94,
            "thumbnail":"x"}],"total":1,"skip":0,"limit":100}"#;
        let products = decode_products(body).unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].title, "iPhone 9");
    }

    #[test]
    fn missing_product_list_is_a_data_shape_error() {
        let err = decode_products(r#"{"items":[]}"#).unwrap_err();
        assert!(matches!(err, PvError::DataShape(_)));
    }

    #[test]
    fn token_extraction_accepts_all_spellings() {
        for body in [
            r#"{"token":"t"}"#,
            r#"{"accessToken":"t"}"#,
            r#"{"data":{"token":"t"}}"#,
            r#"{"data":{"accessToken":"t"}}"#,
        ] {
            assert_eq!(extract_token(body).unwrap(), "t");
        }
    }

    #[test]
    fn tokenless_login_response_is_an_auth_error() {
        let err = extract_token(r#"{"id":1,"username":"emilys"}"#).unwrap_err();
        match err {
            PvError::Auth(msg) => assert_eq!(msg, "Token not found in login response"),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
