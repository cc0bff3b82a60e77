//! Orders placed by customers at checkout.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::bids::Party;

/// Order status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
    Rejected,
}

impl Default for OrderStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Rejected)
    }

    /// Whether `party` may move an order from `self` to `to`.
    ///
    /// Bidding orders reach `accepted` only through bid acceptance, so the
    /// provider shortcut applies to direct bookings alone.
    pub fn can_move_to(self, to: OrderStatus, party: Party, bidding: bool) -> bool {
        match (party, self, to) {
            (Party::Provider, Self::Pending, Self::Accepted) => !bidding,
            (Party::Provider, Self::Accepted, Self::InProgress) => true,
            (Party::Provider, Self::InProgress, Self::Completed) => true,
            (Party::Customer, Self::Pending | Self::Accepted, Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

/// Payment status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Refunded,
    Failed,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "refunded" => Ok(Self::Refunded),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// Order entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    /// Customer who placed the order
    pub user_id: Uuid,
    /// Null until a bid is accepted, unless booked directly
    pub service_provider_id: Option<Uuid>,
    pub address: String,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: String,
    pub notes: Option<String>,
    pub amount: Decimal,
    pub original_amount: Decimal,
    pub is_negotiated: bool,
    /// Opened to competitive bids rather than booked with a provider
    pub bidding_enabled: bool,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Pending bidding orders nobody has won yet
    pub fn is_open_for_bids(&self) -> bool {
        self.bidding_enabled && self.status == OrderStatus::Pending && self.service_provider_id.is_none()
    }

    /// Settle the order with the winning provider at the agreed price.
    pub fn assign(&mut self, provider_id: Uuid, agreed_price: Decimal, now: DateTime<Utc>) {
        self.service_provider_id = Some(provider_id);
        self.amount = agreed_price;
        self.is_negotiated = agreed_price != self.original_amount;
        self.status = OrderStatus::Accepted;
        self.updated_at = now;
    }
}

/// Snapshot of a catalog service at checkout time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderServiceItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub service_id: Option<Uuid>,
    pub title: String,
    pub price: Decimal,
    pub image: Option<String>,
    pub quantity: i32,
}

/// Order with its service lines
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub services: Vec<OrderServiceItem>,
}

/// Cart line submitted at checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderServiceInput {
    #[serde(default)]
    pub service_id: Option<Uuid>,
    pub title: String,
    pub price: Decimal,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    #[serde(default)]
    pub image: Option<String>,
}

fn default_quantity() -> i32 {
    1
}

/// Request DTO for checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub address: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub services: Vec<OrderServiceInput>,
    /// Direct booking with a known provider; omit to collect bids
    #[serde(default)]
    pub service_provider_id: Option<Uuid>,
}

impl CreateOrderRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.address.trim().is_empty() {
            return Err("Address is required".to_string());
        }
        if self.scheduled_time.trim().is_empty() {
            return Err("Scheduled time is required".to_string());
        }
        if self.services.is_empty() {
            return Err("At least one service is required".to_string());
        }
        for line in &self.services {
            if line.title.trim().is_empty() {
                return Err("Service title is required".to_string());
            }
            if line.price <= Decimal::ZERO {
                return Err(format!("Invalid price for service '{}'", line.title));
            }
            if line.quantity < 1 {
                return Err(format!("Invalid quantity for service '{}'", line.title));
            }
        }
        Ok(())
    }

    /// Sum of price × quantity over all lines
    pub fn total(&self) -> Decimal {
        self.services
            .iter()
            .map(|s| s.price * Decimal::from(s.quantity))
            .sum()
    }

    /// Build the order row and its service snapshot.
    pub fn into_order(self, user_id: Uuid, now: DateTime<Utc>) -> OrderDetails {
        let id = Uuid::new_v4();
        let total = self.total();

        let services = self
            .services
            .into_iter()
            .map(|s| OrderServiceItem {
                id: Uuid::new_v4(),
                order_id: id,
                service_id: s.service_id,
                title: s.title.trim().to_string(),
                price: s.price,
                image: s.image,
                quantity: s.quantity,
            })
            .collect();

        OrderDetails {
            order: Order {
                id,
                user_id,
                service_provider_id: self.service_provider_id,
                address: self.address.trim().to_string(),
                city: self.city,
                phone: self.phone,
                scheduled_date: self.scheduled_date,
                scheduled_time: self.scheduled_time,
                notes: self.notes,
                amount: total,
                original_amount: total,
                is_negotiated: false,
                bidding_enabled: self.service_provider_id.is_none(),
                status: OrderStatus::Pending,
                payment_status: PaymentStatus::Pending,
                created_at: now,
                updated_at: now,
            },
            services,
        }
    }
}

/// Request DTO for status changes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

/// `{order}` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBody {
    pub order: OrderDetails,
}

/// `{orders}` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderListBody {
    pub orders: Vec<Order>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkout(provider: Option<Uuid>) -> CreateOrderRequest {
        CreateOrderRequest {
            address: " 12 Lake Road ".into(),
            city: Some("Pune".into()),
            phone: None,
            scheduled_date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            scheduled_time: "10:00".into(),
            notes: None,
            services: vec![
                OrderServiceInput {
                    service_id: None,
                    title: "Fan repair".into(),
                    price: Decimal::from(300),
                    quantity: 2,
                    image: None,
                },
                OrderServiceInput {
                    service_id: None,
                    title: "Switchboard".into(),
                    price: Decimal::from(400),
                    quantity: 1,
                    image: None,
                },
            ],
            service_provider_id: provider,
        }
    }

    #[test]
    fn totals_and_snapshots_services() {
        let req = checkout(None);
        assert_eq!(req.validate(), Ok(()));
        assert_eq!(req.total(), Decimal::from(1000));

        let user = Uuid::new_v4();
        let details = req.into_order(user, Utc::now());
        assert_eq!(details.order.user_id, user);
        assert_eq!(details.order.address, "12 Lake Road");
        assert_eq!(details.order.amount, Decimal::from(1000));
        assert_eq!(details.order.original_amount, Decimal::from(1000));
        assert!(details.order.is_open_for_bids());
        assert_eq!(details.services.len(), 2);
        assert!(details.services.iter().all(|s| s.order_id == details.order.id));
    }

    #[test]
    fn direct_booking_is_assigned_immediately() {
        let provider = Uuid::new_v4();
        let details = checkout(Some(provider)).into_order(Uuid::new_v4(), Utc::now());
        assert_eq!(details.order.service_provider_id, Some(provider));
        assert!(!details.order.bidding_enabled);
        assert!(!details.order.is_open_for_bids());
    }

    #[test]
    fn rejects_bad_cart_lines() {
        let mut req = checkout(None);
        req.services[0].price = Decimal::ZERO;
        assert!(req.validate().is_err());

        let mut req = checkout(None);
        req.services[1].quantity = 0;
        assert!(req.validate().is_err());

        let mut req = checkout(None);
        req.services.clear();
        assert_eq!(
            req.validate(),
            Err("At least one service is required".to_string())
        );
    }

    #[test]
    fn assign_marks_negotiated_price() {
        let mut order = checkout(None).into_order(Uuid::new_v4(), Utc::now()).order;
        let provider = Uuid::new_v4();
        order.assign(provider, Decimal::from(850), Utc::now());
        assert_eq!(order.service_provider_id, Some(provider));
        assert_eq!(order.amount, Decimal::from(850));
        assert!(order.is_negotiated);
        assert_eq!(order.status, OrderStatus::Accepted);
    }

    #[test]
    fn status_moves_by_party() {
        use OrderStatus::*;
        assert!(Pending.can_move_to(Accepted, Party::Provider, false));
        assert!(!Pending.can_move_to(Accepted, Party::Provider, true));
        assert!(Accepted.can_move_to(InProgress, Party::Provider, true));
        assert!(InProgress.can_move_to(Completed, Party::Provider, true));
        assert!(!InProgress.can_move_to(Completed, Party::Customer, true));
        assert!(Pending.can_move_to(Cancelled, Party::Customer, true));
        assert!(Accepted.can_move_to(Cancelled, Party::Customer, false));
        assert!(!InProgress.can_move_to(Cancelled, Party::Customer, false));
        assert!(!Completed.can_move_to(Cancelled, Party::Customer, false));
    }
}
