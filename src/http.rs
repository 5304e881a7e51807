//! Helpers shared by every remote call: client construction and status checks.
use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

pub fn client(user_agent: &str) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .build()
        .map_err(|e| Error::transport("<client>", e))
}

pub fn accept_json() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

/// Returns the response untouched if it carries `expected`, otherwise turns it
/// into an `HttpStatus` error holding whatever body the server sent.
pub async fn expect_status(url: &str, response: Response, expected: StatusCode) -> Result<Response> {
    let status = response.status();
    if status == expected {
        return Ok(response);
    }
    let body = match response.text().await {
        Ok(text) if !text.is_empty() => text,
        _ => status.canonical_reason().unwrap_or_default().to_string(),
    };
    Err(Error::HttpStatus {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

pub async fn get_json<T: DeserializeOwned>(client: &Client, url: &str, headers: HeaderMap) -> Result<T> {
    let response = client
        .get(url)
        .headers(headers)
        .send()
        .await
        .map_err(|e| Error::transport(url, e))?;
    let response = expect_status(url, response, StatusCode::OK).await?;
    response.json::<T>().await.map_err(|e| Error::transport(url, e))
}

/// For `deserialize_with`: the remote APIs send `null` where they mean "empty".
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Deserialize, Debug)]
    struct Nullable {
        #[serde(default, deserialize_with = "null_as_default")]
        name: String,
        #[serde(default, deserialize_with = "null_as_default")]
        tags: Vec<String>,
    }

    #[test]
    fn test_null_reads_as_empty() {
        let value: Nullable = serde_json::from_str(r#"{"name": null, "tags": null}"#).unwrap();
        assert_eq!(value.name, "");
        assert!(value.tags.is_empty());

        let value: Nullable = serde_json::from_str(r#"{"tags": ["a"]}"#).unwrap();
        assert_eq!(value.name, "");
        assert_eq!(value.tags, ["a"]);

        assert!(serde_json::from_str::<Nullable>(r#"{"name": 4}"#).is_err());
    }

    #[tokio::test]
    async fn test_get_json_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thing"))
            .and(header("user-agent", "Reclaimer/0.1"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"a": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client("Reclaimer/0.1").unwrap();
        let url = format!("{}/thing", server.uri());
        let value: serde_json::Value = get_json(&client, &url, accept_json()).await.unwrap();
        assert_eq!(value["a"], 1);
    }

    #[tokio::test]
    async fn test_non_ok_status_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = client("Reclaimer/0.1").unwrap();
        let url = format!("{}/thing", server.uri());
        let err = get_json::<serde_json::Value>(&client, &url, HeaderMap::new())
            .await
            .unwrap_err();
        match err {
            Error::HttpStatus { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let client = client("Reclaimer/0.1").unwrap();
        let url = format!("{}/thing", server.uri());
        let err = get_json::<serde_json::Value>(&client, &url, HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }
}
