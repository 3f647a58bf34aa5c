//! In-process domain events.
//!
//! Services publish through [`EventSender`]; a single background task drains
//! the channel and logs each event. Publishing never fails the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        confirmation_number: String,
        total_paise: i64,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled {
        order_id: Uuid,
        reason: Option<String>,
    },
    PaymentStatusChanged {
        order_id: Uuid,
        payment_status: String,
    },
    InventoryReserved {
        product_id: Uuid,
        quantity: i32,
    },
    InventoryReleased {
        product_id: Uuid,
        quantity: i32,
    },
    InventoryConfirmed {
        product_id: Uuid,
        quantity: i32,
    },
    StockAdjusted {
        product_id: Uuid,
        old_quantity: i32,
        new_quantity: i32,
    },
    LowStock {
        product_id: Uuid,
        available: i32,
        reorder_point: i32,
    },
    CouponRedeemed {
        coupon_id: Uuid,
        user_id: Option<Uuid>,
    },
    CartsExpired {
        count: u64,
        at: DateTime<Utc>,
    },
    SuspiciousActivity {
        admin_id: Uuid,
        pattern: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderPlaced { .. } => "order_placed",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::OrderCancelled { .. } => "order_cancelled",
            Event::PaymentStatusChanged { .. } => "payment_status_changed",
            Event::InventoryReserved { .. } => "inventory_reserved",
            Event::InventoryReleased { .. } => "inventory_released",
            Event::InventoryConfirmed { .. } => "inventory_confirmed",
            Event::StockAdjusted { .. } => "stock_adjusted",
            Event::LowStock { .. } => "low_stock",
            Event::CouponRedeemed { .. } => "coupon_redeemed",
            Event::CartsExpired { .. } => "carts_expired",
            Event::SuspiciousActivity { .. } => "suspicious_activity",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes without waiting for channel capacity; a full or closed
    /// channel drops the event with a warning.
    pub fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.sender.try_send(event) {
            warn!(event = name, error = %e, "Dropping domain event");
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        metrics::counter!("storefront_events_total", 1, "event" => event.name());
        match &event {
            Event::LowStock {
                product_id,
                available,
                reorder_point,
            } => {
                warn!(
                    %product_id,
                    available,
                    reorder_point,
                    "Product at or below reorder point"
                );
            }
            Event::SuspiciousActivity { admin_id, pattern } => {
                warn!(%admin_id, pattern = %pattern, "Suspicious admin activity detected");
            }
            other => {
                info!(event = other.name(), payload = ?other, "Domain event");
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_delivers_when_capacity_allows() {
        let (sender, mut rx) = EventSender::channel(4);
        let product_id = Uuid::new_v4();
        sender.send_or_log(Event::InventoryReserved {
            product_id,
            quantity: 2,
        });
        assert_eq!(
            rx.recv().await,
            Some(Event::InventoryReserved {
                product_id,
                quantity: 2
            })
        );
    }

    #[tokio::test]
    async fn send_or_log_drops_when_full() {
        let (sender, mut rx) = EventSender::channel(1);
        let order_id = Uuid::new_v4();
        sender.send_or_log(Event::OrderCancelled {
            order_id,
            reason: None,
        });
        sender.send_or_log(Event::OrderCancelled {
            order_id,
            reason: Some("second".into()),
        });
        drop(sender);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
