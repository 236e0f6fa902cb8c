use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// The events the application emits. Consumers subscribe through the
/// processor task; publishers go through [`EventSender`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CompanyCreated(Uuid),
    CompanyUpdated(Uuid),
    CompanyDeleted(Uuid),
    OrderCreated {
        order_id: Uuid,
        order_number: String,
    },
    DevicesRecorded {
        order_id: Uuid,
        group_count: usize,
    },
    PestCountsRecorded {
        order_id: Uuid,
        device_count: usize,
    },
    ReportGenerated {
        order_id: Uuid,
        order_number: String,
        page_count: usize,
    },
    BillingStatusUpdated {
        company_id: String,
        status: String,
        active: bool,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event; a full or closed channel is logged, never fatal to
    /// the operation that produced the event.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("Failed to publish event: {}", e);
        }
    }
}

/// Drains the event channel, logging each event. Runs until every sender is
/// dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::ReportGenerated {
                order_number,
                page_count,
                ..
            } => {
                info!(order_number = %order_number, page_count, "service-order report generated");
            }
            Event::BillingStatusUpdated {
                company_id,
                status,
                active,
                ..
            } => {
                info!(company_id = %company_id, status = %status, active, "billing status updated");
            }
            other => {
                info!(event = ?other, "event");
            }
        }
    }
}
