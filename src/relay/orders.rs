use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::GrantflowError;
use crate::relay::exchange::TokenExchangeRelay;

pub const PAYMENT_FAILED_MESSAGE: &str = "Payment processing failed";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: u64,
    pub name: &'static str,
    pub price: f64,
    pub description: &'static str,
    pub category: &'static str,
}

/// The store's fixed catalog.
pub fn catalog() -> Vec<Product> {
    vec![
        Product {
            id: 1,
            name: "Acme Widget",
            price: 29.99,
            description: "A fantastic widget for all your needs",
            category: "Widgets",
        },
        Product {
            id: 2,
            name: "Super Gadget",
            price: 49.99,
            description: "The latest and greatest gadget",
            category: "Gadgets",
        },
    ]
}

pub fn find_product(id: u64) -> Option<Product> {
    catalog().into_iter().find(|p| p.id == id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub price: f64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: u64,
    pub items: Vec<OrderItem>,
    pub total: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn to_cents(amount: f64) -> Option<i64> {
    let cents = (amount * 100.0).round();
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range.
    (cents.is_finite() && cents.abs() < i64::MAX as f64).then_some(cents as i64)
}

/// Order total, summed in whole cents. `None` when a price is not a finite
/// amount or the sum does not fit.
pub fn order_total(items: &[OrderItem]) -> Option<f64> {
    items
        .iter()
        .try_fold(0i64, |total, item| {
            to_cents(item.price)?
                .checked_mul(i64::from(item.quantity))
                .and_then(|line| total.checked_add(line))
        })
        .map(|cents| cents as f64 / 100.0)
}

/// Millisecond timestamps, bumped when two land in the same millisecond.
#[derive(Debug, Default)]
pub(crate) struct IdSequence {
    last: AtomicU64,
}

impl IdSequence {
    pub(crate) fn next(&self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let id = now.max(prev + 1);
            match self
                .last
                .compare_exchange(prev, id, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return id,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// In-memory order records for the life of the process.
#[derive(Debug, Default)]
pub struct OrderBook {
    orders: Mutex<Vec<Order>>,
    ids: IdSequence,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Order>> {
        self.orders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a new `pending` order. Fails without recording anything when
    /// the total is out of range.
    pub fn create(&self, user_id: &str, items: Vec<OrderItem>) -> Result<Order, GrantflowError> {
        let total = order_total(&items)
            .ok_or_else(|| GrantflowError::InvalidInput("order total is out of range".into()))?;
        let order = Order {
            id: self.ids.next(),
            total,
            items,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            user_id: user_id.to_string(),
            payment_id: None,
            error: None,
        };
        self.lock().push(order.clone());
        Ok(order)
    }

    pub fn get(&self, id: u64) -> Option<Order> {
        self.lock().iter().find(|o| o.id == id).cloned()
    }

    pub fn for_user(&self, user_id: &str) -> Vec<Order> {
        self.lock()
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Apply `f` to the order with `id`, returning the updated copy.
    pub fn update(&self, id: u64, f: impl FnOnce(&mut Order)) -> Option<Order> {
        let mut orders = self.lock();
        let order = orders.iter_mut().find(|o| o.id == id)?;
        f(order);
        Some(order.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reason recorded on a failed order.
pub fn failure_reason(err: &GrantflowError) -> String {
    match err {
        GrantflowError::Downstream { .. } => err
            .downstream_message()
            .unwrap_or_else(|| PAYMENT_FAILED_MESSAGE.to_string()),
        GrantflowError::Exchange(_) => err.to_string(),
        _ => PAYMENT_FAILED_MESSAGE.to_string(),
    }
}

fn payment_id(payment: &serde_json::Value) -> Option<String> {
    match payment.get("id")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Order placement: record, exchange the caller's token, pay downstream.
#[derive(Debug, Clone)]
pub struct Checkout {
    relay: Arc<TokenExchangeRelay>,
    orders: Arc<OrderBook>,
}

impl Checkout {
    pub fn new(relay: Arc<TokenExchangeRelay>, orders: Arc<OrderBook>) -> Self {
        Self { relay, orders }
    }

    pub fn orders(&self) -> &Arc<OrderBook> {
        &self.orders
    }

    /// Place an order for `user_id`, paying with a token exchanged from
    /// `subject_token`. A failed payment leaves the order `failed` with the
    /// reason attached; the record is kept either way.
    pub async fn place_order(
        &self,
        subject_token: &str,
        user_id: &str,
        items: Vec<OrderItem>,
    ) -> Result<Order, GrantflowError> {
        let order = self.orders.create(user_id, items)?;
        tracing::info!(order_id = order.id, total = order.total, "order created");

        match self.pay(subject_token, &order).await {
            Ok(payment_id) => {
                let updated = self.orders.update(order.id, |o| {
                    o.status = OrderStatus::Completed;
                    o.payment_id = payment_id;
                });
                tracing::info!(order_id = order.id, "order completed");
                Ok(updated.unwrap_or(order))
            }
            Err(e) => {
                let reason = failure_reason(&e);
                tracing::warn!(order_id = order.id, reason = %reason, "order failed: {e}");
                self.orders.update(order.id, |o| {
                    o.status = OrderStatus::Failed;
                    o.error = Some(reason);
                });
                Err(e)
            }
        }
    }

    async fn pay(&self, subject_token: &str, order: &Order) -> Result<Option<String>, GrantflowError> {
        let payment_token = self.relay.exchange_for_downstream(subject_token).await?;
        let payload = json!({
            "orderId": order.id,
            "amount": order.total,
            "currency": "USD",
            "paymentMethod": "credit_card",
        });
        let payment = self
            .relay
            .forward_to_downstream(&payment_token, &payload)
            .await?;
        Ok(payment_id(&payment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::fake::FakeProvider;
    use crate::relay::exchange::Downstream;
    use crate::relay::guard::AccessGuard;
    use crate::types::ClientCredentials;

    fn items() -> Vec<OrderItem> {
        vec![
            OrderItem {
                id: 1,
                name: Some("Acme Widget".into()),
                price: 29.99,
                quantity: 1,
            },
            OrderItem {
                id: 2,
                name: Some("Super Gadget".into()),
                price: 49.99,
                quantity: 1,
            },
        ]
    }

    #[test]
    fn total_is_exact_in_cents() {
        assert_eq!(order_total(&items()), Some(79.98));
        let many = vec![OrderItem {
            id: 1,
            name: None,
            price: 0.1,
            quantity: 3,
        }];
        assert_eq!(order_total(&many), Some(0.3));
        assert_eq!(order_total(&[]), Some(0.0));
    }

    #[test]
    fn total_out_of_range_is_rejected() {
        let line = |price: f64, quantity: u32| OrderItem {
            id: 1,
            name: None,
            price,
            quantity,
        };
        assert_eq!(order_total(&[line(1e17, 2)]), None);
        assert_eq!(order_total(&[line(9e16, 1), line(9e16, 1)]), None);
        assert_eq!(order_total(&[line(f64::INFINITY, 1)]), None);
        assert_eq!(order_total(&[line(f64::NAN, 1)]), None);

        let book = OrderBook::new();
        let err = book.create("alice", vec![line(1e17, 2)]).unwrap_err();
        assert!(matches!(err, GrantflowError::InvalidInput(_)));
        assert_eq!(err.http_status(), 400);
        assert!(book.is_empty());
    }

    #[test]
    fn catalog_lookup() {
        assert_eq!(catalog().len(), 2);
        assert_eq!(find_product(2).map(|p| p.name), Some("Super Gadget"));
        assert!(find_product(3).is_none());
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let seq = IdSequence::default();
        let ids: Vec<u64> = (0..100).map(|_| seq.next()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn order_book_filters_by_user() {
        let book = OrderBook::new();
        let a = book.create("alice", items()).unwrap();
        book.create("bob", items()).unwrap();
        assert_eq!(book.len(), 2);
        assert_eq!(book.for_user("alice"), vec![a.clone()]);
        assert_eq!(a.status, OrderStatus::Pending);

        let updated = book
            .update(a.id, |o| o.status = OrderStatus::Completed)
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Completed);
        assert_eq!(book.get(a.id).unwrap().status, OrderStatus::Completed);
        assert!(book.update(42, |_| {}).is_none());
    }

    #[test]
    fn order_serializes_camel_case() {
        let book = OrderBook::new();
        let order = book.create("alice", items()).unwrap();
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["total"], 79.98);
        assert!(json.get("paymentId").is_none());
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn failure_reasons() {
        let declined = GrantflowError::Downstream {
            status: 500,
            body: r#"{"message":"Card declined"}"#.into(),
        };
        assert_eq!(failure_reason(&declined), "Card declined");

        let opaque = GrantflowError::Downstream {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(failure_reason(&opaque), PAYMENT_FAILED_MESSAGE);

        let exchange = GrantflowError::Exchange("invalid_grant".into());
        assert_eq!(failure_reason(&exchange), "Token exchange failed: invalid_grant");
    }

    #[tokio::test]
    async fn exchange_failure_marks_order_failed() {
        let provider = Arc::new(FakeProvider {
            exchange_error: Some("invalid_grant".into()),
            ..Default::default()
        });
        let credentials = ClientCredentials {
            client_id: "store".into(),
            client_secret: "secret".into(),
        };
        let relay = TokenExchangeRelay::new(
            AccessGuard::new(provider.clone(), credentials.clone(), ""),
            provider,
            credentials,
            Downstream {
                base_url: "http://127.0.0.1:9".into(),
                audience: "api://payment-service".into(),
                scopes: vec![],
            },
        );
        let checkout = Checkout::new(Arc::new(relay), Arc::new(OrderBook::new()));

        let err = checkout
            .place_order("user-token", "alice", items())
            .await
            .unwrap_err();
        assert!(matches!(err, GrantflowError::Exchange(_)));

        let orders = checkout.orders().for_user("alice");
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Failed);
        assert_eq!(
            orders[0].error.as_deref(),
            Some("Token exchange failed: invalid_grant")
        );

        let err = checkout
            .place_order("user-token", "bob", vec![OrderItem { id: 1, name: None, price: 1e17, quantity: 2 }])
            .await
            .unwrap_err();
        assert!(matches!(err, GrantflowError::InvalidInput(_)));
        assert!(checkout.orders().for_user("bob").is_empty());
    }
}
