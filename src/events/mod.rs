use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

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

    /// Publishes after commit; a closed channel only warns because the write
    /// it describes has already happened.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(err) = self.send(event).await {
            warn!(event = name, error = %err, "dropping domain event");
            counter!("retail_pos.events.dropped", 1);
        }
    }
}

/// Domain events published once the write that caused them has committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    TenantRegistered {
        tenant_id: Uuid,
        owner_id: Uuid,
    },
    UserCreated {
        tenant_id: Uuid,
        user_id: Uuid,
        role: String,
    },
    ProductCreated {
        tenant_id: Uuid,
        product_id: Uuid,
    },
    StockChanged {
        tenant_id: Uuid,
        product_id: Uuid,
        change_type: String,
        quantity_change: i32,
        new_quantity: i32,
    },
    LowStock {
        tenant_id: Uuid,
        product_id: Uuid,
        stock_quantity: i32,
        min_stock_level: i32,
    },
    CustomerCreated {
        tenant_id: Uuid,
        customer_id: Uuid,
    },
    CustomerBalanceCorrected {
        tenant_id: Uuid,
        customer_id: Uuid,
        previous: Decimal,
        corrected: Decimal,
    },
    SaleCompleted {
        tenant_id: Uuid,
        transaction_id: Uuid,
        customer_id: Option<Uuid>,
        total_amount: Decimal,
        outstanding_balance: Decimal,
        occurred_at: DateTime<Utc>,
    },
    DebtPaymentRecorded {
        tenant_id: Uuid,
        transaction_id: Uuid,
        customer_id: Uuid,
        amount: Decimal,
        remaining: Decimal,
    },
    DebtSettled {
        tenant_id: Uuid,
        transaction_id: Uuid,
        customer_id: Uuid,
    },
    ReturnRequested {
        tenant_id: Uuid,
        return_id: Uuid,
        transaction_id: Uuid,
    },
    ReturnApproved {
        tenant_id: Uuid,
        return_id: Uuid,
        refund_amount: Decimal,
        debt_credit: Decimal,
    },
    ReturnRejected {
        tenant_id: Uuid,
        return_id: Uuid,
    },
    ReturnReverted {
        tenant_id: Uuid,
        return_id: Uuid,
    },
    PurchaseOrderCreated {
        tenant_id: Uuid,
        purchase_order_id: Uuid,
    },
    PurchaseOrderReceived {
        tenant_id: Uuid,
        purchase_order_id: Uuid,
        total_cost: Decimal,
    },
    PurchaseOrderCancelled {
        tenant_id: Uuid,
        purchase_order_id: Uuid,
    },
    ExpenseRecorded {
        tenant_id: Uuid,
        expense_id: Uuid,
        amount: Decimal,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::TenantRegistered { .. } => "tenant_registered",
            Event::UserCreated { .. } => "user_created",
            Event::ProductCreated { .. } => "product_created",
            Event::StockChanged { .. } => "stock_changed",
            Event::LowStock { .. } => "low_stock",
            Event::CustomerCreated { .. } => "customer_created",
            Event::CustomerBalanceCorrected { .. } => "customer_balance_corrected",
            Event::SaleCompleted { .. } => "sale_completed",
            Event::DebtPaymentRecorded { .. } => "debt_payment_recorded",
            Event::DebtSettled { .. } => "debt_settled",
            Event::ReturnRequested { .. } => "return_requested",
            Event::ReturnApproved { .. } => "return_approved",
            Event::ReturnRejected { .. } => "return_rejected",
            Event::ReturnReverted { .. } => "return_reverted",
            Event::PurchaseOrderCreated { .. } => "purchase_order_created",
            Event::PurchaseOrderReceived { .. } => "purchase_order_received",
            Event::PurchaseOrderCancelled { .. } => "purchase_order_cancelled",
            Event::ExpenseRecorded { .. } => "expense_recorded",
        }
    }
}

/// Drains the channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("retail_pos.events.processed", 1, "event" => event.name());

        match &event {
            Event::LowStock {
                tenant_id,
                product_id,
                stock_quantity,
                min_stock_level,
            } => {
                warn!(
                    %tenant_id,
                    %product_id,
                    stock_quantity,
                    min_stock_level,
                    "product at or below minimum stock level"
                );
            }
            Event::CustomerBalanceCorrected {
                tenant_id,
                customer_id,
                previous,
                corrected,
            } => {
                warn!(
                    %tenant_id,
                    %customer_id,
                    %previous,
                    %corrected,
                    "customer balance drift corrected"
                );
            }
            Event::SaleCompleted {
                tenant_id,
                transaction_id,
                total_amount,
                outstanding_balance,
                ..
            } => {
                info!(
                    %tenant_id,
                    %transaction_id,
                    %total_amount,
                    %outstanding_balance,
                    "sale completed"
                );
            }
            Event::DebtSettled {
                tenant_id,
                transaction_id,
                customer_id,
            } => {
                info!(%tenant_id, %transaction_id, %customer_id, "debt settled");
            }
            other => debug!(event = other.name(), payload = ?other, "domain event"),
        }
    }

    info!("Event channel closed; event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_survives_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        assert!(sender
            .send(Event::ReturnRejected {
                tenant_id: Uuid::new_v4(),
                return_id: Uuid::new_v4(),
            })
            .await
            .is_err());

        sender
            .send_or_log(Event::ReturnRejected {
                tenant_id: Uuid::new_v4(),
                return_id: Uuid::new_v4(),
            })
            .await;
    }

    #[tokio::test]
    async fn loop_stops_when_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(process_events(rx));
        let sender = EventSender::new(tx);
        sender
            .send_or_log(Event::LowStock {
                tenant_id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
                stock_quantity: 1,
                min_stock_level: 5,
            })
            .await;
        drop(sender);
        handle.await.unwrap();
    }
}
