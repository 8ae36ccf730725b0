//! Smithy HTTP client backed by an [`HttpTransport`].
//!
//! The SDK serializes and signs; the transport sends. A bearer-token handle
//! wraps its transport in [`BearerTokenTransport`](crate::BearerTokenTransport),
//! so the signed request is cloned before `Authorization` is replaced.

use crate::Error;
use crate::transport::HttpTransport;
use aws_smithy_runtime_api::client::http::{
    HttpClient, HttpConnector, HttpConnectorFuture, HttpConnectorSettings, SharedHttpConnector,
};
use aws_smithy_runtime_api::client::orchestrator::{HttpRequest, HttpResponse};
use aws_smithy_runtime_api::client::result::ConnectorError;
use aws_smithy_runtime_api::client::runtime_components::RuntimeComponents;
use aws_smithy_types::body::SdkBody;
use reqwest::{Request, Response, Url};
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct TransportClient {
    transport: Arc<dyn HttpTransport>,
}

impl TransportClient {
    pub(crate) fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }
}

impl std::fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClient").finish_non_exhaustive()
    }
}

impl HttpClient for TransportClient {
    fn http_connector(&self, _settings: &HttpConnectorSettings, _components: &RuntimeComponents) -> SharedHttpConnector {
        SharedHttpConnector::new(self.clone())
    }
}

impl HttpConnector for TransportClient {
    fn call(&self, request: HttpRequest) -> HttpConnectorFuture {
        let transport = Arc::clone(&self.transport);
        HttpConnectorFuture::new(async move {
            let request = to_reqwest(request)?;
            let response = transport.execute(&request).await.map_err(connector_error)?;
            from_reqwest(response)
        })
    }
}

fn to_reqwest(request: HttpRequest) -> Result<Request, ConnectorError> {
    let request = request
        .try_into_http1x()
        .map_err(|err| ConnectorError::user(err.into()))?;
    let (parts, body) = request.into_parts();
    let url = Url::parse(&parts.uri.to_string()).map_err(|err| ConnectorError::user(err.into()))?;

    let Some(bytes) = body.bytes() else {
        return Err(ConnectorError::user("streaming request bodies are not supported".into()));
    };

    let mut out = Request::new(parts.method, url);
    *out.headers_mut() = parts.headers;
    if !bytes.is_empty() {
        *out.body_mut() = Some(bytes.to_vec().into());
    }
    Ok(out)
}

fn from_reqwest(response: Response) -> Result<HttpResponse, ConnectorError> {
    let response: http::Response<reqwest::Body> = response.into();
    HttpResponse::try_from(response.map(SdkBody::from_body_1_x)).map_err(|err| ConnectorError::other(err.into(), None))
}

fn connector_error(err: Error) -> ConnectorError {
    match err {
        Error::Network(err) if err.is_timeout() => ConnectorError::timeout(err.into()),
        Error::Network(err) => ConnectorError::io(err.into()),
        other => ConnectorError::other(other.into(), None),
    }
}
