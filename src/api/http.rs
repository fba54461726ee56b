use super::broker::{Brokerage, CancelResponse, SubmitResponse};
use crate::error::TradeError;
use crate::models::{
    Holding, Interval, LimitOrder, OrderState, OrderStatus, PriceBar, Quote, Security, Span,
    TimeInForce,
};
use crate::Result;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const ERROR_BODY_SNIPPET_MAX_CHARS: usize = 300;

type BrokerRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// JSON-over-HTTP brokerage client
///
/// Cloneable; all clones share one rate limiter.
#[derive(Clone)]
pub struct HttpBroker {
    client: Client,
    base_url: String,
    api_token: String,
    rate_limiter: Arc<BrokerRateLimiter>,
}

// ============== Wire Types ==============

#[derive(Debug, Serialize)]
struct OrderRequestBody<'a> {
    symbol: &'a str,
    side: &'a str,
    #[serde(rename = "type")]
    order_type: &'a str,
    quantity: String,
    price: String,
    time_in_force: TimeInForce,
}

#[derive(Debug, Deserialize)]
struct OrderBody {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    price: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    quantity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct QuoteBody {
    #[serde(deserialize_with = "de_f64")]
    bid_price: f64,
    #[serde(deserialize_with = "de_f64")]
    ask_price: f64,
}

#[derive(Debug, Deserialize)]
struct HistoricalsBody {
    data_points: Vec<DataPoint>,
}

#[derive(Debug, Deserialize)]
struct DataPoint {
    begins_at: DateTime<Utc>,
    #[serde(deserialize_with = "de_f64")]
    open_price: f64,
    #[serde(deserialize_with = "de_f64")]
    high_price: f64,
    #[serde(deserialize_with = "de_f64")]
    low_price: f64,
    #[serde(deserialize_with = "de_f64")]
    close_price: f64,
}

#[derive(Debug, Deserialize)]
struct PositionsBody {
    results: Vec<PositionEntry>,
}

#[derive(Debug, Deserialize)]
struct PositionEntry {
    symbol: String,
    #[serde(deserialize_with = "de_f64")]
    quantity: f64,
    #[serde(default, deserialize_with = "de_opt_f64")]
    quantity_held_for_sell: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProfileBody {
    #[serde(deserialize_with = "de_f64")]
    buying_power: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    String(String),
}

/// Prices come back as JSON strings from most venues, numbers from some
fn de_f64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(v) => Ok(v),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn de_opt_f64<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<f64>, D::Error> {
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(v)) => Ok(Some(v)),
        Some(NumberOrString::String(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrString::String(s)) => {
            s.trim().parse().map(Some).map_err(serde::de::Error::custom)
        }
    }
}

// ============== Implementation ==============

impl HttpBroker {
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        requests_per_minute: u32,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let quota =
            Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Rate-limited, authenticated send; transport failures are upstream failures
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.rate_limiter.until_ready().await;

        let request = if self.api_token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_token)
        };

        Ok(request.send().await?)
    }

    /// Statuses that mean "try again later" rather than "the venue said no"
    fn is_upstream_status(status: StatusCode) -> bool {
        status.is_server_error()
            || status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || status == StatusCode::TOO_MANY_REQUESTS
    }

    async fn body_snippet(response: Response) -> String {
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        text.chars().take(ERROR_BODY_SNIPPET_MAX_CHARS).collect()
    }

    /// Decode a read endpoint; every non-success status is an upstream failure
    async fn read_json<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let text = Self::body_snippet(response).await;
            return Err(TradeError::UpstreamUnavailable(format!(
                "broker API error ({}): {}",
                status, text
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            TradeError::UpstreamUnavailable(format!("malformed broker response: {}", e))
        })
    }
}

impl Brokerage for HttpBroker {
    async fn submit_limit_order(&self, order: &LimitOrder) -> Result<SubmitResponse> {
        let body = OrderRequestBody {
            symbol: order.security.as_str(),
            side: order.side.as_str(),
            order_type: "limit",
            quantity: format!("{}", order.quantity),
            price: format!("{:.2}", order.limit_price),
            time_in_force: order.time_in_force,
        };

        let response = self
            .send(self.client.post(self.url("/orders")).json(&body))
            .await?;
        let status = response.status();

        if Self::is_upstream_status(status) {
            let text = Self::body_snippet(response).await;
            return Err(TradeError::UpstreamUnavailable(format!(
                "order submit failed ({}): {}",
                status, text
            )));
        }

        if status.is_client_error() {
            return Ok(SubmitResponse::Rejected {
                message: Self::body_snippet(response).await,
            });
        }

        let text = response.text().await?;
        let parsed: OrderBody = serde_json::from_str(&text).map_err(|e| {
            TradeError::UpstreamUnavailable(format!("malformed order response: {}", e))
        })?;

        match parsed.id {
            Some(id) => Ok(SubmitResponse::Accepted {
                id,
                state: parsed
                    .state
                    .as_deref()
                    .map(OrderState::parse)
                    .unwrap_or(OrderState::Submitted),
            }),
            None => Ok(SubmitResponse::Rejected { message: text }),
        }
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus> {
        let response = self
            .send(self.client.get(self.url(&format!("/orders/{}", order_id))))
            .await?;
        let body: OrderBody = self.read_json(response).await?;

        let state = body.state.ok_or_else(|| {
            TradeError::UpstreamUnavailable(format!("order {} status has no state", order_id))
        })?;

        Ok(OrderStatus {
            state: OrderState::parse(&state),
            price: body.price,
            quantity: body.quantity,
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<CancelResponse> {
        let response = self
            .send(
                self.client
                    .post(self.url(&format!("/orders/{}/cancel", order_id))),
            )
            .await?;
        let status = response.status();

        if Self::is_upstream_status(status) {
            let text = Self::body_snippet(response).await;
            return Err(TradeError::UpstreamUnavailable(format!(
                "order cancel failed ({}): {}",
                status, text
            )));
        }

        if status.is_client_error() {
            return Ok(CancelResponse::Rejected {
                message: Self::body_snippet(response).await,
            });
        }

        let text = response.text().await?;

        match serde_json::from_str::<OrderBody>(&text)
            .ok()
            .and_then(|body| body.state)
        {
            Some(state) => Ok(CancelResponse::State(OrderState::parse(&state))),
            None => Ok(CancelResponse::Rejected { message: text }),
        }
    }

    async fn get_quote(&self, security: &Security) -> Result<Quote> {
        let response = self
            .send(self.client.get(self.url(&format!("/quotes/{}", security))))
            .await?;
        let body: QuoteBody = self.read_json(response).await?;

        Ok(Quote {
            bid_price: body.bid_price,
            ask_price: body.ask_price,
        })
    }

    async fn get_historicals(
        &self,
        security: &Security,
        interval: Interval,
        span: Span,
    ) -> Result<Vec<PriceBar>> {
        let request = self
            .client
            .get(self.url(&format!("/historicals/{}", security)))
            .query(&[("interval", interval.as_str()), ("span", span.as_str())]);
        let body: HistoricalsBody = self.read_json(self.send(request).await?).await?;

        let mut bars: Vec<PriceBar> = body
            .data_points
            .into_iter()
            .map(|p| PriceBar {
                timestamp: p.begins_at,
                open: p.open_price,
                high: p.high_price,
                low: p.low_price,
                close: p.close_price,
            })
            .collect();
        bars.sort_by_key(|b| b.timestamp);

        Ok(bars)
    }

    async fn get_positions(&self) -> Result<Vec<Holding>> {
        let response = self.send(self.client.get(self.url("/positions"))).await?;
        let body: PositionsBody = self.read_json(response).await?;

        Ok(body
            .results
            .into_iter()
            .map(|p| Holding {
                security: Security::new(p.symbol),
                quantity: p.quantity,
                quantity_held_for_sell: p.quantity_held_for_sell.unwrap_or(0.0),
            })
            .collect())
    }

    async fn buying_power(&self) -> Result<f64> {
        let response = self
            .send(self.client.get(self.url("/accounts/profile")))
            .await?;
        let body: ProfileBody = self.read_json(response).await?;
        Ok(body.buying_power)
    }
}
