//! REST client for the marketplace API
//!
//! Every call needs a bearer token; anonymous sessions fail locally with
//! [`ClientError::NotAuthenticated`] before any request is made.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::api::{MessageBody, Paginated, PaginationParams, Success};
use crate::domain::{
    BidBody, BidListBody, CounterOfferListBody, CounterOfferRequest, CounterOfferSummary,
    CreateBidRequest, CreateOrderRequest, CreateProviderRequest, DecisionBody, Order, OrderBid,
    OrderBody, OrderDetails, OrderListBody, OrderStatus, ProviderBody, ServiceProvider,
    UpdateOrderStatusRequest,
};
use crate::error::ErrorResponse;
use crate::routes::orders::DeclineOrderRequest;

use super::{validate, ClientError, ClientResult, Session};

/// The bid operations the watcher and decision flows depend on
#[async_trait]
pub trait BidsApi: Send + Sync {
    async fn bids_for_order(&self, order_id: Uuid) -> ClientResult<Vec<OrderBid>>;
    async fn accept_bid(&self, bid_id: Uuid) -> ClientResult<OrderBid>;
    async fn reject_bid(&self, bid_id: Uuid) -> ClientResult<OrderBid>;
    async fn counter_offer(&self, bid_id: Uuid, amount: Decimal) -> ClientResult<OrderBid>;
}

#[derive(Clone)]
pub struct MarketplaceClient {
    http: Client,
    session: Session,
}

impl MarketplaceClient {
    pub fn new(session: Session) -> Self {
        Self {
            http: Client::new(),
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    async fn send<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ClientResult<R> {
        let token = self.session.bearer()?;
        let url = self.session.endpoint(path)?;

        debug!(method = %method, url = %url, "API request");

        let mut req = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            req = req.json(body);
        }
        let response = req.send().await?;
        let status = response.status();

        if status.is_success() {
            let envelope: Success<R> = response.json().await?;
            return Ok(envelope.body);
        }

        let message = response
            .json::<ErrorResponse>()
            .await
            .map(|e| e.message)
            .unwrap_or_else(|_| format!("Request failed with status {}", status));
        warn!(status = %status, message = %message, "API error");

        Err(ClientError::Server {
            status: status.as_u16(),
            message,
        })
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> ClientResult<R> {
        self.send::<(), R>(Method::GET, path, None).await
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<R> {
        self.send(Method::POST, path, Some(body)).await
    }

    // =========================================================================
    // Providers
    // =========================================================================

    pub async fn create_provider(&self, req: &CreateProviderRequest) -> ClientResult<ServiceProvider> {
        let body: ProviderBody = self.post("providers", req).await?;
        Ok(body.provider)
    }

    /// The caller's provider profile
    pub async fn my_provider(&self) -> ClientResult<ServiceProvider> {
        match self.get::<ProviderBody>("providers/me").await {
            Ok(body) => Ok(body.provider),
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND.as_u16()) => {
                Err(ClientError::ProviderNotLoaded)
            }
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Orders
    // =========================================================================

    #[instrument(skip(self, req))]
    pub async fn create_order(&self, req: &CreateOrderRequest) -> ClientResult<OrderDetails> {
        req.validate().map_err(ClientError::Validation)?;
        let body: OrderBody = self.post("orders", req).await?;
        Ok(body.order)
    }

    pub async fn order(&self, order_id: Uuid) -> ClientResult<OrderDetails> {
        let body: OrderBody = self.get(&format!("orders/{}", order_id)).await?;
        Ok(body.order)
    }

    pub async fn orders(&self, params: &PaginationParams) -> ClientResult<Paginated<OrderListBody>> {
        let mut path = String::from("orders");
        let query: Vec<String> = [("page", params.page), ("per_page", params.per_page)]
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| format!("{}={}", k, v)))
            .collect();
        if !query.is_empty() {
            path.push('?');
            path.push_str(&query.join("&"));
        }
        self.get(&path).await
    }

    pub async fn available_orders(&self) -> ClientResult<Vec<Order>> {
        let body: OrderListBody = self.get("orders/available").await?;
        Ok(body.orders)
    }

    /// Returns the server's confirmation message
    pub async fn decline_order(&self, order_id: Uuid, provider_id: Option<Uuid>) -> ClientResult<String> {
        let body: MessageBody = self
            .post(
                &format!("orders/{}/decline", order_id),
                &DeclineOrderRequest { provider_id },
            )
            .await?;
        Ok(body.message)
    }

    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> ClientResult<OrderDetails> {
        let body: OrderBody = self
            .send(
                Method::PATCH,
                &format!("orders/{}/status", order_id),
                Some(&UpdateOrderStatusRequest { status }),
            )
            .await?;
        Ok(body.order)
    }

    // =========================================================================
    // Bids
    // =========================================================================

    /// Submit a bid from the raw price the provider typed
    #[instrument(skip(self, message))]
    pub async fn submit_bid(
        &self,
        order_id: Uuid,
        price: &str,
        message: Option<String>,
    ) -> ClientResult<OrderBid> {
        let bid_price = validate::bid_price(price)?;
        let body: BidBody = self
            .post(
                "bids",
                &CreateBidRequest {
                    order_id,
                    service_provider_id: None,
                    bid_price,
                    bid_message: message,
                },
            )
            .await?;
        Ok(body.bid)
    }

    pub async fn counter_offers(&self, provider_id: Uuid) -> ClientResult<Vec<CounterOfferSummary>> {
        let body: CounterOfferListBody = self
            .get(&format!("bids/provider/{}/counter-offers", provider_id))
            .await?;
        Ok(body.counter_offers)
    }

    async fn decide<B: Serialize>(&self, path: String, body: &B) -> ClientResult<OrderBid> {
        let body: DecisionBody = self.post(&path, body).await?;
        Ok(body.bid)
    }
}

#[async_trait]
impl BidsApi for MarketplaceClient {
    async fn bids_for_order(&self, order_id: Uuid) -> ClientResult<Vec<OrderBid>> {
        let body: BidListBody = self.get(&format!("bids/order/{}", order_id)).await?;
        Ok(body.bids)
    }

    async fn accept_bid(&self, bid_id: Uuid) -> ClientResult<OrderBid> {
        self.decide(format!("bids/accept/{}", bid_id), &serde_json::json!({}))
            .await
    }

    async fn reject_bid(&self, bid_id: Uuid) -> ClientResult<OrderBid> {
        self.decide(format!("bids/reject/{}", bid_id), &serde_json::json!({}))
            .await
    }

    async fn counter_offer(&self, bid_id: Uuid, amount: Decimal) -> ClientResult<OrderBid> {
        if amount <= Decimal::ZERO {
            return Err(ClientError::Validation(
                "Please enter a valid counter offer amount".to_string(),
            ));
        }
        self.decide(
            format!("bids/counter-offer/{}", bid_id),
            &CounterOfferRequest {
                counter_offer_price: amount,
            },
        )
        .await
    }
}
