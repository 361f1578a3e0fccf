//! Request dispatch
//!
//! One canonical request goes through: resolve the target, log any capability
//! advisory, update the sticky slot, check credentials, encode for the
//! provider, open the upstream, then either stream the relayed events or fold
//! them into a single message. Everything that can fail up to the upstream's
//! response head is an [`AppError`]; later failures arrive as canonical
//! `error` events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tokio::sync::mpsc;

use crate::canonical::{CanonicalRequest, MessageAggregator, StreamEvent};
use crate::config::{credential_hint, Config};
use crate::error::{AppError, AppResult};
use crate::proxy::{ByteStream, RequestContext, UpstreamClient, UpstreamRequest};
use crate::routes::metrics;
use crate::routing::{advise, resolve, Provider, ProviderModel, SessionRoutingState};
use crate::streaming::Relay;
use crate::translate::{
    GeminiTranslator, OpenAiDialect, OpenAiTranslator, PassthroughDialect, PassthroughTranslator,
    ProviderTranslator, Translator,
};

pub struct Gateway {
    config: Arc<Config>,
    session: SessionRoutingState,
    relay: Relay,
}

impl Gateway {
    pub fn new(config: Arc<Config>, http_client: reqwest::Client) -> Self {
        let relay = Relay::new(UpstreamClient::new(http_client), config.idle_timeout());
        Self {
            config,
            session: SessionRoutingState::new(),
            relay,
        }
    }

    pub fn session(&self) -> &SessionRoutingState {
        &self.session
    }

    /// Resolve the target for `request` and make it sticky
    pub fn route(&self, request: &CanonicalRequest) -> AppResult<(ProviderModel, RequestContext)> {
        let target = resolve(request.model(), self.session.get().as_ref())?;
        let context = RequestContext::new(&target, request.is_streaming());
        context.log_request_start();

        if let Some(advisory) = advise(request.message(), target.provider) {
            context.log_advisory(&advisory);
            for capability in &advisory.unsupported {
                metrics::record_advisory(target.provider.as_str(), capability.as_str());
            }
        }

        self.session.set(target.clone());
        Ok((target, context))
    }

    /// Build the translator for `provider` from its configured credentials
    pub fn translator(
        &self,
        provider: Provider,
        beta: Option<String>,
    ) -> AppResult<ProviderTranslator> {
        let credential = self
            .config
            .endpoint(provider)
            .credential()
            .ok_or(AppError::MissingCredential {
                provider,
                hint: credential_hint(provider),
            })?;

        let translator = match provider {
            Provider::Glm | Provider::Anthropic => {
                let dialect = if provider == Provider::Glm {
                    PassthroughDialect::Glm
                } else {
                    PassthroughDialect::Anthropic
                };
                ProviderTranslator::Passthrough(
                    PassthroughTranslator::new(
                        dialect,
                        credential.base_url,
                        credential.api_key,
                        &self.config.anthropic_version,
                    )
                    .with_beta(beta),
                )
            }
            Provider::OpenAi => ProviderTranslator::OpenAi(OpenAiTranslator::new(
                OpenAiDialect::OpenAi,
                credential.base_url,
                credential.api_key,
            )),
            Provider::OpenRouter => ProviderTranslator::OpenAi(
                OpenAiTranslator::new(
                    OpenAiDialect::OpenRouter,
                    credential.base_url,
                    credential.api_key,
                )
                .with_attribution(
                    self.config.openrouter_referer.clone(),
                    self.config.openrouter_title.clone(),
                ),
            ),
            Provider::Gemini => ProviderTranslator::Gemini(GeminiTranslator::new(
                credential.base_url,
                credential.api_key,
            )),
        };

        Ok(translator)
    }

    /// Serve one canonical request
    pub async fn dispatch(
        &self,
        request: CanonicalRequest,
        beta: Option<String>,
    ) -> AppResult<Response> {
        let (target, context) = self.route(&request)?;
        let translator = self.translator(target.provider, beta)?;
        let upstream = translator.encode_request(&request, &target.model)?;

        // Response headers wait for the upstream's own status
        let stream = self.open(&upstream, &context).await?;
        let rx = self.relay.attach(translator, stream, context);

        if request.is_streaming() {
            stream_response(rx)
        } else {
            aggregate(rx).await
        }
    }

    async fn open(
        &self,
        upstream: &UpstreamRequest,
        context: &RequestContext,
    ) -> AppResult<ByteStream> {
        context.log_upstream_request(&upstream.url);
        self.relay.open(upstream).await.map_err(|error| {
            context.log_error(&error.to_string());
            metrics::record_request(context.provider.as_str(), "failed");
            AppError::from(error)
        })
    }
}

/// Fold relayed events into one `message` object
async fn aggregate(mut rx: mpsc::Receiver<StreamEvent>) -> AppResult<Response> {
    let mut aggregator = MessageAggregator::new();
    while let Some(event) = rx.recv().await {
        aggregator.push(event)?;
    }

    Ok((StatusCode::OK, Json(aggregator.finish()?)).into_response())
}

/// Serve relayed events as `text/event-stream`
fn stream_response(mut rx: mpsc::Receiver<StreamEvent>) -> AppResult<Response> {
    let events = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield Ok::<_, Infallible>(event.to_sse());
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(events))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build response: {}", e)))
}
