//! HTTP client for a remote Status Service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{
    ConfigurationValue, ErrorBody, OrderDetail, QueueScenesRequest, QueueScenesResponse,
    ReconcileReport, SceneCompleteRequest, SceneErrorRequest, SceneUnavailableRequest,
    ServiceError, StatusService, UpdateResponse, UpdateStatusRequest,
};
use crate::status::{
    NewOrder, Order, PurgeCandidate, Scene, SceneCompletion, SceneRef, SceneStatus,
    SceneToProcess,
};

/// Talks to the Status Service over HTTP+JSON.
///
/// `base_url` includes the API prefix, e.g. `http://status:8080/api/v1`.
pub struct HttpStatusClient {
    client: Client,
    base_url: String,
}

impl HttpStatusClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("reprocess/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn scene_url(&self, scene: &SceneRef, action: &str) -> String {
        self.url(&format!(
            "/orders/{}/scenes/{}/{}",
            urlencoding::encode(&scene.order_id),
            urlencoding::encode(&scene.scene_id),
            action
        ))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ServiceError> {
        let response = request.send().await.map_err(map_send_error)?;
        decode(response).await
    }
}

fn map_send_error(err: reqwest::Error) -> ServiceError {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        ServiceError::Unavailable(err.to_string())
    } else {
        ServiceError::Protocol(err.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::Protocol(e.to_string()));
    }

    let message = response
        .json::<ErrorBody>()
        .await
        .map(|body| body.error)
        .unwrap_or_else(|_| status.to_string());
    debug!(status = %status, error = %message, "Status service returned an error");

    Err(match status {
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
            ServiceError::Unavailable(message)
        }
        StatusCode::NOT_FOUND => ServiceError::NotFound(message),
        s if s.is_client_error() => ServiceError::Rejected(message),
        _ => ServiceError::Internal(message),
    })
}

#[async_trait]
impl StatusService for HttpStatusClient {
    async fn get_scenes_to_process(
        &self,
        limit: usize,
    ) -> Result<Vec<SceneToProcess>, ServiceError> {
        self.send(
            self.client
                .get(self.url("/scenes/to-process"))
                .query(&[("limit", limit)]),
        )
        .await
    }

    async fn get_scenes_to_retry(
        &self,
        order_id: Option<&str>,
    ) -> Result<Vec<SceneToProcess>, ServiceError> {
        let mut request = self.client.get(self.url("/scenes/to-retry"));
        if let Some(order_id) = order_id {
            request = request.query(&[("order_id", order_id)]);
        }
        self.send(request).await
    }

    async fn queue_scenes(
        &self,
        scenes: &[SceneRef],
        location: &str,
        job_name: &str,
    ) -> Result<usize, ServiceError> {
        let body = QueueScenesRequest {
            scenes: scenes.to_vec(),
            location: location.to_string(),
            job_name: job_name.to_string(),
        };
        let response: QueueScenesResponse = self
            .send(self.client.post(self.url("/scenes/queue")).json(&body))
            .await?;
        Ok(response.queued)
    }

    async fn update_status(
        &self,
        scene: &SceneRef,
        location: &str,
        status: SceneStatus,
    ) -> Result<bool, ServiceError> {
        let body = UpdateStatusRequest {
            location: location.to_string(),
            status,
        };
        let response: UpdateResponse = self
            .send(self.client.post(self.scene_url(scene, "status")).json(&body))
            .await?;
        Ok(response.updated)
    }

    async fn set_scene_error(
        &self,
        scene: &SceneRef,
        location: &str,
        log: &str,
    ) -> Result<bool, ServiceError> {
        let body = SceneErrorRequest {
            location: location.to_string(),
            log: log.to_string(),
        };
        let response: UpdateResponse = self
            .send(self.client.post(self.scene_url(scene, "error")).json(&body))
            .await?;
        Ok(response.updated)
    }

    async fn set_scene_unavailable(
        &self,
        scene: &SceneRef,
        location: &str,
        log: &str,
        note: Option<&str>,
    ) -> Result<bool, ServiceError> {
        let body = SceneUnavailableRequest {
            location: location.to_string(),
            log: log.to_string(),
            note: note.map(str::to_string),
        };
        let response: UpdateResponse = self
            .send(
                self.client
                    .post(self.scene_url(scene, "unavailable"))
                    .json(&body),
            )
            .await?;
        Ok(response.updated)
    }

    async fn mark_scene_complete(
        &self,
        completion: &SceneCompletion,
    ) -> Result<bool, ServiceError> {
        let body = SceneCompleteRequest {
            location: completion.location.clone(),
            product_location: completion.product_location.clone(),
            checksum_location: completion.checksum_location.clone(),
            log: completion.log.clone(),
        };
        let response: UpdateResponse = self
            .send(
                self.client
                    .post(self.scene_url(&completion.scene_ref(), "complete"))
                    .json(&body),
            )
            .await?;
        Ok(response.updated)
    }

    async fn get_scenes_to_purge(&self) -> Result<Vec<PurgeCandidate>, ServiceError> {
        self.send(self.client.get(self.url("/scenes/to-purge"))).await
    }

    async fn mark_scene_purged(&self, scene: &SceneRef) -> Result<bool, ServiceError> {
        let response: UpdateResponse = self
            .send(self.client.post(self.scene_url(scene, "purged")))
            .await?;
        Ok(response.updated)
    }

    async fn get_configuration(&self, key: &str) -> Result<Option<String>, ServiceError> {
        let url = self.url(&format!("/configuration/{}", urlencoding::encode(key)));
        let response: ConfigurationValue = self.send(self.client.get(url)).await?;
        Ok(response.value)
    }

    async fn list_scenes(
        &self,
        status: SceneStatus,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Scene>, ServiceError> {
        let limit = limit.to_string();
        let offset = offset.to_string();
        self.send(self.client.get(self.url("/scenes")).query(&[
            ("status", status.as_str()),
            ("limit", limit.as_str()),
            ("offset", offset.as_str()),
        ]))
        .await
    }

    async fn finalize_orders(&self) -> Result<Vec<Order>, ServiceError> {
        self.send(self.client.post(self.url("/orders/finalize")))
            .await
    }

    async fn mark_order_notified(&self, order_id: &str) -> Result<bool, ServiceError> {
        let url = self.url(&format!("/orders/{}/notified", urlencoding::encode(order_id)));
        let response: UpdateResponse = self.send(self.client.post(url)).await?;
        Ok(response.updated)
    }

    async fn reconcile_stale_scenes(&self) -> Result<ReconcileReport, ServiceError> {
        self.send(self.client.post(self.url("/scenes/reconcile")))
            .await
    }

    async fn create_order(&self, order: NewOrder) -> Result<Order, ServiceError> {
        self.send(self.client.post(self.url("/orders")).json(&order))
            .await
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<OrderDetail>, ServiceError> {
        let url = self.url(&format!("/orders/{}", urlencoding::encode(order_id)));
        match self.send(self.client.get(url)).await {
            Ok(detail) => Ok(Some(detail)),
            Err(ServiceError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
