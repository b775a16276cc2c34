use crate::error::{Error, Result};
use async_trait::async_trait;
use relayer_wire::rpc_types::{RelayerEndpoint, RelayerReply};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Raw HTTP reply. The body is kept as text so JSON problems are reported by the SDK.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends JSON bodies to the relayer. No retries are performed at this level.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<TransportResponse>;
}

/// [`Transport`] backed by a shared [`reqwest::Client`].
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<TransportResponse> {
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(TransportResponse { status, body })
    }
}

/// Posts `request` to `endpoint` and unwraps the status envelope of the reply.
pub(crate) async fn call_relayer<Req, Resp>(
    transport: &dyn Transport,
    relayer_url: &str,
    endpoint: RelayerEndpoint,
    request: &Req,
) -> Result<Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let url = endpoint.url(relayer_url);
    let body = serde_json::to_value(request)
        .map_err(|e| Error::relayer(&url, None, format!("cannot encode request: {e}")))?;

    tracing::info!("Calling relayer endpoint {url}");
    let reply = transport
        .post_json(&url, &body)
        .await
        .map_err(|source| Error::Transport {
            endpoint: url.clone(),
            source,
        })?;

    if !reply.is_success() {
        tracing::warn!("Relayer replied with status {} on {url}", reply.status);
        return Err(Error::relayer(
            &url,
            Some(reply.status),
            format!("Bad status {}", reply.status),
        ));
    }

    let parsed: RelayerReply<Resp> = serde_json::from_str(&reply.body).map_err(|e| {
        Error::relayer(&url, Some(reply.status), format!("Bad JSON: {e}"))
    })?;
    match parsed {
        RelayerReply::Success { response } => Ok(response),
        RelayerReply::Failed { message } => Err(Error::relayer(
            &url,
            Some(reply.status),
            message.unwrap_or_else(|| "relayer reported a failure".to_string()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;
    use relayer_wire::rpc_types::InputProofResponse;
    use serde_json::json;

    #[tokio::test]
    async fn bad_status_is_a_protocol_error() {
        let transport = FakeTransport::with_reply(503, "unavailable");
        let res: Result<InputProofResponse> = call_relayer(
            &transport,
            "https://relayer.test",
            RelayerEndpoint::InputProof,
            &json!({}),
        )
        .await;
        match res.unwrap_err() {
            Error::RelayerProtocol {
                endpoint, status, ..
            } => {
                assert_eq!(endpoint, "https://relayer.test/v1/input-proof");
                assert_eq!(status, Some(503));
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn bad_json_is_a_protocol_error() {
        let transport = FakeTransport::with_reply(200, "not json");
        let res: Result<InputProofResponse> = call_relayer(
            &transport,
            "https://relayer.test",
            RelayerEndpoint::InputProof,
            &json!({}),
        )
        .await;
        assert!(res.unwrap_err().to_string().contains("Bad JSON"));
    }

    #[tokio::test]
    async fn failed_envelope_carries_message() {
        let transport = FakeTransport::with_json(200, json!({"status": "failed", "message": "nope"}));
        let res: Result<InputProofResponse> = call_relayer(
            &transport,
            "https://relayer.test",
            RelayerEndpoint::InputProof,
            &json!({}),
        )
        .await;
        assert!(res.unwrap_err().to_string().contains("nope"));
    }

    #[tokio::test]
    async fn transport_failure_is_surfaced() {
        let transport = FakeTransport::failing("connection refused");
        let res: Result<InputProofResponse> = call_relayer(
            &transport,
            "https://relayer.test",
            RelayerEndpoint::InputProof,
            &json!({}),
        )
        .await;
        assert!(matches!(res.unwrap_err(), Error::Transport { .. }));
    }
}
