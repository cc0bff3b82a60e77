//! PostgreSQL store
//!
//! Bid decisions lock the owning order row before the bid row, so every
//! write path that touches an order's bids is serialized on that order.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{
    DecisionOutcome, DeclineOutcome, MarketplaceStore, StatusOutcome, StoreError, StoreResult,
    DUPLICATE_BID, ORDER_ASSIGNED, ORDER_CLOSED, ORDER_DECLINED, PROVIDER_EXISTS,
};
use crate::domain::{
    BidAction, BidStatus, Order, OrderBid, OrderDetails, OrderServiceItem, OrderStatus, Party,
    PaymentStatus, ServiceProvider,
};

macro_rules! provider_columns {
    () => {
        "id, user_id, business_name, phone, description, is_active, created_at"
    };
}

macro_rules! order_columns {
    () => {
        "id, user_id, service_provider_id, address, city, phone, scheduled_date, scheduled_time, \
         notes, amount, original_amount, is_negotiated, bidding_enabled, status, payment_status, \
         created_at, updated_at"
    };
}

macro_rules! bid_columns {
    () => {
        "id, order_id, service_provider_id, original_price, bid_price, bid_message, \
         customer_counter_offer, status, version, created_at, updated_at"
    };
}

/// Database row for provider
#[derive(Debug, sqlx::FromRow)]
struct ProviderRow {
    id: Uuid,
    user_id: Uuid,
    business_name: String,
    phone: Option<String>,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<ProviderRow> for ServiceProvider {
    fn from(row: ProviderRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            business_name: row.business_name,
            phone: row.phone,
            description: row.description,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

/// Database row for order
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    service_provider_id: Option<Uuid>,
    address: String,
    city: Option<String>,
    phone: Option<String>,
    scheduled_date: NaiveDate,
    scheduled_time: String,
    notes: Option<String>,
    amount: Decimal,
    original_amount: Decimal,
    is_negotiated: bool,
    bidding_enabled: bool,
    status: String,
    payment_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status: OrderStatus = row.status.parse().map_err(decode_error)?;
        let payment_status: PaymentStatus = row.payment_status.parse().map_err(decode_error)?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            service_provider_id: row.service_provider_id,
            address: row.address,
            city: row.city,
            phone: row.phone,
            scheduled_date: row.scheduled_date,
            scheduled_time: row.scheduled_time,
            notes: row.notes,
            amount: row.amount,
            original_amount: row.original_amount,
            is_negotiated: row.is_negotiated,
            bidding_enabled: row.bidding_enabled,
            status,
            payment_status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderServiceRow {
    id: Uuid,
    order_id: Uuid,
    service_id: Option<Uuid>,
    title: String,
    price: Decimal,
    image: Option<String>,
    quantity: i32,
}

impl From<OrderServiceRow> for OrderServiceItem {
    fn from(row: OrderServiceRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            service_id: row.service_id,
            title: row.title,
            price: row.price,
            image: row.image,
            quantity: row.quantity,
        }
    }
}

/// Database row for bid
#[derive(Debug, sqlx::FromRow)]
struct BidRow {
    id: Uuid,
    order_id: Uuid,
    service_provider_id: Uuid,
    original_price: Decimal,
    bid_price: Decimal,
    bid_message: Option<String>,
    customer_counter_offer: Option<Decimal>,
    status: String,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BidRow> for OrderBid {
    type Error = StoreError;

    fn try_from(row: BidRow) -> Result<Self, Self::Error> {
        let status: BidStatus = row.status.parse().map_err(decode_error)?;

        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            service_provider_id: row.service_provider_id,
            original_price: row.original_price,
            bid_price: row.bid_price,
            bid_message: row.bid_message,
            customer_counter_offer: row.customer_counter_offer,
            status,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn decode_error(message: String) -> StoreError {
    StoreError::Database(sqlx::Error::Decode(message.into()))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn into_bids(rows: Vec<BidRow>) -> StoreResult<Vec<OrderBid>> {
    rows.into_iter().map(OrderBid::try_from).collect()
}

fn into_orders(rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
    rows.into_iter().map(Order::try_from).collect()
}

fn closed_reason(order: &Order) -> String {
    if order.service_provider_id.is_some() {
        ORDER_ASSIGNED.to_string()
    } else {
        ORDER_CLOSED.to_string()
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_order(tx: &mut Transaction<'_, Postgres>, order_id: Uuid) -> StoreResult<Order> {
        sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(StoreError::NotFound("Order"))?
        .try_into()
    }
}

#[async_trait]
impl MarketplaceStore for PgStore {
    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    async fn insert_provider(&self, provider: ServiceProvider) -> StoreResult<ServiceProvider> {
        let row = sqlx::query_as::<_, ProviderRow>(concat!(
            "INSERT INTO service_providers (id, user_id, business_name, phone, description, is_active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING ",
            provider_columns!()
        ))
        .bind(provider.id)
        .bind(provider.user_id)
        .bind(&provider.business_name)
        .bind(&provider.phone)
        .bind(&provider.description)
        .bind(provider.is_active)
        .bind(provider.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(PROVIDER_EXISTS.to_string())
            } else {
                e.into()
            }
        })?;

        Ok(row.into())
    }

    async fn provider(&self, id: Uuid) -> StoreResult<Option<ServiceProvider>> {
        let row = sqlx::query_as::<_, ProviderRow>(concat!(
            "SELECT ",
            provider_columns!(),
            " FROM service_providers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn provider_by_user(&self, user_id: Uuid) -> StoreResult<Option<ServiceProvider>> {
        let row = sqlx::query_as::<_, ProviderRow>(concat!(
            "SELECT ",
            provider_columns!(),
            " FROM service_providers WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn eligible_providers(&self, order_id: Uuid) -> StoreResult<Vec<ServiceProvider>> {
        let rows = sqlx::query_as::<_, ProviderRow>(
            r#"
            SELECT p.id, p.user_id, p.business_name, p.phone, p.description, p.is_active, p.created_at
            FROM service_providers p
            JOIN orders o ON o.id = $1
            WHERE p.is_active
            AND p.user_id <> o.user_id
            AND NOT EXISTS (
                SELECT 1 FROM rejected_orders r
                WHERE r.order_id = o.id AND r.service_provider_id = p.id
            )
            ORDER BY p.created_at ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_order(&self, details: OrderDetails) -> StoreResult<OrderDetails> {
        let mut tx = self.pool.begin().await?;
        let o = &details.order;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, service_provider_id, address, city, phone, scheduled_date,
                scheduled_time, notes, amount, original_amount, is_negotiated, bidding_enabled, status,
                payment_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(o.id)
        .bind(o.user_id)
        .bind(o.service_provider_id)
        .bind(&o.address)
        .bind(&o.city)
        .bind(&o.phone)
        .bind(o.scheduled_date)
        .bind(&o.scheduled_time)
        .bind(&o.notes)
        .bind(o.amount)
        .bind(o.original_amount)
        .bind(o.is_negotiated)
        .bind(o.bidding_enabled)
        .bind(o.status.as_str())
        .bind(o.payment_status.as_str())
        .bind(o.created_at)
        .bind(o.updated_at)
        .execute(&mut *tx)
        .await?;

        for s in &details.services {
            sqlx::query(
                r#"
                INSERT INTO order_services (id, order_id, service_id, title, price, image, quantity)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(s.id)
            .bind(s.order_id)
            .bind(s.service_id)
            .bind(&s.title)
            .bind(s.price)
            .bind(&s.image)
            .bind(s.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(details)
    }

    async fn order(&self, id: Uuid) -> StoreResult<Option<OrderDetails>> {
        let Some(row) = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let services = sqlx::query_as::<_, OrderServiceRow>(
            r#"
            SELECT id, order_id, service_id, title, price, image, quantity
            FROM order_services
            WHERE order_id = $1
            ORDER BY title ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(OrderDetails {
            order: Order::try_from(row)?,
            services: services.into_iter().map(Into::into).collect(),
        }))
    }

    async fn orders_for_customer(
        &self,
        user_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> StoreResult<(Vec<Order>, u64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM orders WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok((into_orders(rows)?, total as u64))
    }

    async fn open_orders_for_provider(&self, provider: &ServiceProvider) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM orders o \
             WHERE o.bidding_enabled AND o.status = 'pending' AND o.service_provider_id IS NULL \
             AND o.user_id <> $2 \
             AND NOT EXISTS (SELECT 1 FROM rejected_orders r \
                 WHERE r.order_id = o.id AND r.service_provider_id = $1) \
             ORDER BY o.created_at DESC"
        ))
        .bind(provider.id)
        .bind(provider.user_id)
        .fetch_all(&self.pool)
        .await?;

        into_orders(rows)
    }

    async fn update_order_status(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        actor: Party,
    ) -> StoreResult<StatusOutcome> {
        let mut tx = self.pool.begin().await?;
        let order = Self::lock_order(&mut tx, order_id).await?;

        if !order.status.can_move_to(to, actor, order.bidding_enabled) {
            return Err(StoreError::Conflict(format!(
                "Cannot move order from {} to {}",
                order.status, to
            )));
        }

        let row = sqlx::query_as::<_, OrderRow>(concat!(
            "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING ",
            order_columns!()
        ))
        .bind(order_id)
        .bind(to.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let mut expired = Vec::new();
        if to == OrderStatus::Cancelled {
            let rows = sqlx::query_as::<_, BidRow>(concat!(
                "UPDATE order_bids SET status = 'expired', version = version + 1, updated_at = NOW() \
                 WHERE order_id = $1 AND status IN ('pending', 'counter_offered') \
                 RETURNING ",
                bid_columns!()
            ))
            .bind(order_id)
            .fetch_all(&mut *tx)
            .await?;
            expired = into_bids(rows)?;
        }

        tx.commit().await?;
        Ok(StatusOutcome {
            order: Order::try_from(row)?,
            expired,
        })
    }

    async fn decline_order(&self, order_id: Uuid, provider_id: Uuid) -> StoreResult<DeclineOutcome> {
        let mut tx = self.pool.begin().await?;
        let order = Self::lock_order(&mut tx, order_id).await?;

        let recorded = sqlx::query(
            r#"
            INSERT INTO rejected_orders (order_id, service_provider_id)
            VALUES ($1, $2)
            ON CONFLICT (order_id, service_provider_id) DO NOTHING
            "#,
        )
        .bind(order_id)
        .bind(provider_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        let mut rejected = None;
        if !order.bidding_enabled
            && order.service_provider_id == Some(provider_id)
            && order.status == OrderStatus::Pending
        {
            let row = sqlx::query_as::<_, OrderRow>(concat!(
                "UPDATE orders SET status = 'rejected', updated_at = NOW() WHERE id = $1 RETURNING ",
                order_columns!()
            ))
            .bind(order_id)
            .fetch_one(&mut *tx)
            .await?;
            rejected = Some(row.try_into()?);
        }

        tx.commit().await?;
        Ok(DeclineOutcome {
            recorded,
            order: rejected,
        })
    }

    async fn insert_bid(&self, bid: OrderBid) -> StoreResult<OrderBid> {
        let mut tx = self.pool.begin().await?;
        let order = Self::lock_order(&mut tx, bid.order_id).await?;
        if !order.is_open_for_bids() {
            return Err(StoreError::Conflict(closed_reason(&order)));
        }

        let declined: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM rejected_orders WHERE order_id = $1 AND service_provider_id = $2)",
        )
        .bind(bid.order_id)
        .bind(bid.service_provider_id)
        .fetch_one(&mut *tx)
        .await?;
        if declined {
            return Err(StoreError::Conflict(ORDER_DECLINED.to_string()));
        }

        let row = sqlx::query_as::<_, BidRow>(concat!(
            "INSERT INTO order_bids (id, order_id, service_provider_id, original_price, bid_price, \
             bid_message, customer_counter_offer, status, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING ",
            bid_columns!()
        ))
        .bind(bid.id)
        .bind(bid.order_id)
        .bind(bid.service_provider_id)
        .bind(bid.original_price)
        .bind(bid.bid_price)
        .bind(&bid.bid_message)
        .bind(bid.customer_counter_offer)
        .bind(bid.status.as_str())
        .bind(bid.version)
        .bind(bid.created_at)
        .bind(bid.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(DUPLICATE_BID.to_string())
            } else {
                e.into()
            }
        })?;

        tx.commit().await?;
        row.try_into()
    }

    async fn bid(&self, id: Uuid) -> StoreResult<Option<OrderBid>> {
        sqlx::query_as::<_, BidRow>(concat!(
            "SELECT ",
            bid_columns!(),
            " FROM order_bids WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(OrderBid::try_from)
        .transpose()
    }

    async fn bids_for_order(&self, order_id: Uuid) -> StoreResult<Vec<OrderBid>> {
        let rows = sqlx::query_as::<_, BidRow>(concat!(
            "SELECT ",
            bid_columns!(),
            " FROM order_bids WHERE order_id = $1 ORDER BY created_at ASC"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        into_bids(rows)
    }

    async fn counter_offers_for_provider(&self, provider_id: Uuid) -> StoreResult<Vec<OrderBid>> {
        let rows = sqlx::query_as::<_, BidRow>(concat!(
            "SELECT ",
            bid_columns!(),
            " FROM order_bids WHERE service_provider_id = $1 AND status = 'counter_offered' \
             ORDER BY updated_at DESC"
        ))
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await?;

        into_bids(rows)
    }

    async fn decide_bid(
        &self,
        bid_id: Uuid,
        action: BidAction,
        actor: Party,
    ) -> StoreResult<DecisionOutcome> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let order_id: Uuid = sqlx::query_scalar("SELECT order_id FROM order_bids WHERE id = $1")
            .bind(bid_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound("Bid"))?;

        let mut order = Self::lock_order(&mut tx, order_id).await?;

        let mut bid: OrderBid = sqlx::query_as::<_, BidRow>(concat!(
            "SELECT ",
            bid_columns!(),
            " FROM order_bids WHERE id = $1 FOR UPDATE"
        ))
        .bind(bid_id)
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        let agreed = bid.apply(&action, actor, now)?;
        if !order.is_open_for_bids() {
            return Err(StoreError::Conflict(closed_reason(&order)));
        }

        sqlx::query(
            r#"
            UPDATE order_bids
            SET status = $2, customer_counter_offer = $3, version = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(bid.id)
        .bind(bid.status.as_str())
        .bind(bid.customer_counter_offer)
        .bind(bid.version)
        .bind(bid.updated_at)
        .execute(&mut *tx)
        .await?;

        let mut assigned = None;
        let mut expired = Vec::new();

        if let Some(price) = agreed {
            order.assign(bid.service_provider_id, price, now);

            sqlx::query(
                r#"
                UPDATE orders
                SET service_provider_id = $2, amount = $3, is_negotiated = $4, status = $5, updated_at = $6
                WHERE id = $1
                "#,
            )
            .bind(order.id)
            .bind(order.service_provider_id)
            .bind(order.amount)
            .bind(order.is_negotiated)
            .bind(order.status.as_str())
            .bind(order.updated_at)
            .execute(&mut *tx)
            .await?;

            let rows = sqlx::query_as::<_, BidRow>(concat!(
                "UPDATE order_bids SET status = 'expired', version = version + 1, updated_at = $3 \
                 WHERE order_id = $1 AND id <> $2 AND status IN ('pending', 'counter_offered') \
                 RETURNING ",
                bid_columns!()
            ))
            .bind(order.id)
            .bind(bid.id)
            .bind(now)
            .fetch_all(&mut *tx)
            .await?;

            expired = into_bids(rows)?;
            assigned = Some(order);
        }

        tx.commit().await?;

        Ok(DecisionOutcome {
            bid,
            order: assigned,
            expired,
        })
    }
}
