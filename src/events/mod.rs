use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Domain events emitted by the services after a successful commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        total_amount: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled {
        order_id: Uuid,
        reason: String,
    },
    OrderExpired(Uuid),
    OrderReleased {
        order_id: Uuid,
        released_by: Uuid,
        manual: bool,
    },
    StockReturned {
        product_id: Uuid,
        quantity: i32,
    },
    PaymentApproved {
        payment_id: Uuid,
        order_id: Uuid,
    },
    PaymentRejected {
        payment_id: Uuid,
        order_id: Uuid,
    },
    CouponRedeemed {
        coupon_id: Uuid,
        order_id: Uuid,
    },
    ProductChanged(Uuid),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderCreated { .. } => "order_created",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::OrderCancelled { .. } => "order_cancelled",
            Event::OrderExpired(_) => "order_expired",
            Event::OrderReleased { .. } => "order_released",
            Event::StockReturned { .. } => "stock_returned",
            Event::PaymentApproved { .. } => "payment_approved",
            Event::PaymentRejected { .. } => "payment_rejected",
            Event::CouponRedeemed { .. } => "coupon_redeemed",
            Event::ProductChanged(_) => "product_changed",
        }
    }
}

/// Drains the event channel, logging each event and feeding the metrics registry.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        metrics::increment_counter(&format!("events_{}_total", event.name()));

        match &event {
            Event::OrderCreated {
                order_id,
                user_id,
                total_amount,
            } => {
                info!(%order_id, %user_id, %total_amount, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::OrderCancelled { order_id, reason } => {
                info!(%order_id, %reason, "order cancelled");
            }
            Event::OrderExpired(order_id) => {
                info!(%order_id, "order reservation expired");
            }
            Event::OrderReleased {
                order_id,
                released_by,
                manual,
            } => {
                info!(%order_id, %released_by, manual, "order handed over");
            }
            other => {
                info!(event = other.name(), "event received: {:?}", other);
            }
        }
    }

    info!("Event channel closed; event processing loop stopped");
}
