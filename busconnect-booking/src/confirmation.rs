use busconnect_core::booking::{Booking, BookingStatus};
use busconnect_core::identity::Caller;
use busconnect_core::payment::{ChargeStatus, ChargeVerification};
use busconnect_core::repository::{
    BookingRepository, ConfirmPayment, ConfirmationWrite, OutboxRepository, PaymentRepository, SeatDecrement,
};
use busconnect_core::{CoreError, CoreResult};
use busconnect_shared::models::events::{OutboundEvent, PaymentFailedEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::feed::ChangeFeed;
use crate::ledger::report_integrity_alarm;
use crate::orchestrator::{is_valid_reference, PaymentOrchestrator};
use crate::signature::verify_signature;

pub const CHARGE_SUCCESS_EVENT: &str = "charge.success";

/// What one confirmation attempt observed. None of these are errors.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Confirmed {
        booking_id: Uuid,
        /// True only for the single call that performed the transition.
        newly_confirmed: bool,
        #[serde(skip)]
        integrity_alarm: bool,
    },
    Pending {
        booking_id: Uuid,
        gateway_status: String,
    },
    Failed {
        booking_id: Uuid,
        gateway_status: String,
    },
    ManualReview {
        booking_id: Uuid,
        reason: String,
    },
}

impl ConfirmationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConfirmationOutcome::Confirmed { .. })
    }

    pub fn booking_id(&self) -> Uuid {
        match self {
            ConfirmationOutcome::Confirmed { booking_id, .. }
            | ConfirmationOutcome::Pending { booking_id, .. }
            | ConfirmationOutcome::Failed { booking_id, .. }
            | ConfirmationOutcome::ManualReview { booking_id, .. } => *booking_id,
        }
    }

    pub fn status_label(&self) -> &str {
        match self {
            ConfirmationOutcome::Confirmed { .. } => "success",
            ConfirmationOutcome::Pending { gateway_status, .. } => gateway_status,
            ConfirmationOutcome::Failed { gateway_status, .. } => gateway_status,
            ConfirmationOutcome::ManualReview { .. } => "manual_review",
        }
    }

    fn confirmed(booking_id: Uuid, newly_confirmed: bool) -> Self {
        ConfirmationOutcome::Confirmed {
            booking_id,
            newly_confirmed,
            integrity_alarm: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAck {
    Processed(ConfirmationOutcome),
    /// Valid delivery we have nothing to do for (other event types, unknown
    /// references). Acknowledged so the provider stops retrying.
    Ignored { event: String },
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    data: WebhookData,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookData {
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
}

impl WebhookData {
    /// Paystack sends metadata either as an object or as a JSON string.
    fn booking_id(&self) -> Option<Uuid> {
        let metadata = match &self.metadata {
            serde_json::Value::String(s) => serde_json::from_str(s).ok()?,
            other => other.clone(),
        };
        metadata
            .get("booking_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

/// Drives `provisional -> confirmed` from either trigger. Both paths ask the
/// gateway for ground truth and funnel into the same conditional write, so
/// any number of racing or repeated calls confirm a booking at most once.
pub struct ConfirmationStateMachine {
    orchestrator: Arc<PaymentOrchestrator>,
    bookings: Arc<dyn BookingRepository>,
    payments: Arc<dyn PaymentRepository>,
    outbox: Arc<dyn OutboxRepository>,
    feed: ChangeFeed,
    webhook_secret: Vec<u8>,
}

impl ConfirmationStateMachine {
    pub fn new(
        orchestrator: Arc<PaymentOrchestrator>,
        bookings: Arc<dyn BookingRepository>,
        payments: Arc<dyn PaymentRepository>,
        outbox: Arc<dyn OutboxRepository>,
        feed: ChangeFeed,
        webhook_secret: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            orchestrator,
            bookings,
            payments,
            outbox,
            feed,
            webhook_secret: webhook_secret.into(),
        }
    }

    /// Pull path: the booker came back from checkout and asks us to check.
    pub async fn confirm_from_client(
        &self,
        caller: &Caller,
        reference: &str,
        booking_hint: Option<Uuid>,
    ) -> CoreResult<ConfirmationOutcome> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(CoreError::ValidationError("reference is required".to_string()));
        }
        if !is_valid_reference(reference) {
            return Err(CoreError::ValidationError("reference is malformed".to_string()));
        }

        let record = self.payments.find_by_reference(reference).await?;
        let booking_id = match (&record, booking_hint) {
            (Some(record), Some(hint)) if record.booking_id != hint => {
                tracing::warn!(
                    "Reference {} belongs to booking {}, ignoring supplied booking {}",
                    reference,
                    record.booking_id,
                    hint
                );
                record.booking_id
            }
            (Some(record), _) => record.booking_id,
            (None, Some(hint)) => hint,
            (None, None) => return Err(CoreError::NotFound(format!("payment {}", reference))),
        };

        let booking = self.orchestrator.authorize(caller, booking_id).await?;
        if booking.status == BookingStatus::Confirmed {
            return self.settle_confirmed(&booking, reference).await;
        }

        let verification = self.orchestrator.verify_charge(reference).await?;
        if let Some(outcome) = self.check_charge_belongs(&booking, &verification, record.is_some()) {
            return Ok(outcome);
        }

        self.reconcile(&booking, reference, verification).await
    }

    /// Push path. The body is only trusted to locate the booking; the charge
    /// status itself is re-queried from the gateway.
    pub async fn handle_webhook(&self, raw_body: &[u8], signature: Option<&str>) -> CoreResult<WebhookAck> {
        if let Err(e) = verify_signature(&self.webhook_secret, raw_body, signature) {
            tracing::warn!("Rejected webhook delivery: {}", e);
            return Err(CoreError::InvalidSignature);
        }

        let envelope: WebhookEnvelope = serde_json::from_slice(raw_body)
            .map_err(|e| CoreError::ValidationError(format!("malformed webhook body: {}", e)))?;

        if envelope.event != CHARGE_SUCCESS_EVENT {
            tracing::debug!("Ignoring webhook event {}", envelope.event);
            return Ok(WebhookAck::Ignored { event: envelope.event });
        }

        let Some(reference) = envelope.data.reference.as_deref().map(str::trim).filter(|r| !r.is_empty()) else {
            tracing::warn!("charge.success webhook without a reference");
            return Ok(WebhookAck::Ignored { event: envelope.event });
        };

        let record = self.payments.find_by_reference(reference).await?;
        let booking_id = match record.as_ref().map(|r| r.booking_id).or_else(|| envelope.data.booking_id()) {
            Some(id) => id,
            None => {
                tracing::warn!("Webhook for unknown reference {} carries no booking id", reference);
                return Ok(WebhookAck::Ignored { event: envelope.event });
            }
        };

        let Some(booking) = self.bookings.get_booking(booking_id).await? else {
            tracing::warn!("Webhook for reference {} names missing booking {}", reference, booking_id);
            return Ok(WebhookAck::Ignored { event: envelope.event });
        };

        if booking.status == BookingStatus::Confirmed {
            tracing::debug!("Webhook for already confirmed booking {}", booking.id);
            return Ok(WebhookAck::Processed(self.settle_confirmed(&booking, reference).await?));
        }

        let verification = self.orchestrator.verify_charge(reference).await?;
        if let Some(outcome) = self.check_charge_belongs(&booking, &verification, record.is_some()) {
            return Ok(WebhookAck::Processed(outcome));
        }

        Ok(WebhookAck::Processed(self.reconcile(&booking, reference, verification).await?))
    }

    /// The booking is already confirmed, so nothing is written. The reference
    /// that confirmed it short-circuits without a gateway call; any other
    /// reference is checked, because a second successful charge needs a refund.
    async fn settle_confirmed(&self, booking: &Booking, reference: &str) -> CoreResult<ConfirmationOutcome> {
        match booking.payment_reference.as_deref() {
            Some(confirmed_by) if confirmed_by != reference => {}
            _ => return Ok(ConfirmationOutcome::confirmed(booking.id, false)),
        }

        let verification = self.orchestrator.verify_charge(reference).await?;
        let same_booking = verification.booking_id.map_or(true, |id| id == booking.id);
        if verification.status == ChargeStatus::Success && same_booking {
            return Ok(duplicate_charge(booking, reference));
        }
        Ok(ConfirmationOutcome::confirmed(booking.id, false))
    }

    /// A charge may only confirm the booking it was opened for.
    fn check_charge_belongs(
        &self,
        booking: &Booking,
        verification: &ChargeVerification,
        recorded_locally: bool,
    ) -> Option<ConfirmationOutcome> {
        let reason = match verification.booking_id {
            Some(charged_for) if charged_for != booking.id => {
                format!("charge {} was opened for booking {}", verification.reference, charged_for)
            }
            None if !recorded_locally && verification.status == ChargeStatus::Success => {
                format!("charge {} cannot be tied to booking {}", verification.reference, booking.id)
            }
            _ => return None,
        };
        tracing::warn!("Manual review for booking {}: {}", booking.id, reason);
        Some(ConfirmationOutcome::ManualReview {
            booking_id: booking.id,
            reason,
        })
    }

    async fn reconcile(
        &self,
        booking: &Booking,
        reference: &str,
        verification: ChargeVerification,
    ) -> CoreResult<ConfirmationOutcome> {
        match verification.status {
            ChargeStatus::Pending => {
                tracing::info!(
                    "Charge {} for booking {} still {}",
                    reference,
                    booking.id,
                    verification.gateway_status
                );
                Ok(ConfirmationOutcome::Pending {
                    booking_id: booking.id,
                    gateway_status: verification.gateway_status,
                })
            }
            ChargeStatus::Failed => {
                let marked = self
                    .payments
                    .mark_failed(reference, &verification.gateway_status, &verification.raw)
                    .await?;
                if marked {
                    let event = OutboundEvent::PaymentFailed(PaymentFailedEvent {
                        booking_id: booking.id,
                        user_id: booking.user_id.clone(),
                        payment_reference: reference.to_string(),
                        gateway_status: verification.gateway_status.clone(),
                        timestamp: chrono::Utc::now().timestamp(),
                    });
                    self.outbox.enqueue(&event).await?;
                }
                tracing::info!(
                    "Charge {} for booking {} failed ({}), booking stays provisional",
                    reference,
                    booking.id,
                    verification.gateway_status
                );
                Ok(ConfirmationOutcome::Failed {
                    booking_id: booking.id,
                    gateway_status: verification.gateway_status,
                })
            }
            ChargeStatus::Success => {
                let amount_paid = match verification.amount_paid {
                    Some(amount) if amount >= booking.total_amount => amount,
                    other => {
                        let reason = format!(
                            "paid {} but booking total is {}",
                            other.map(|a| a.to_string()).unwrap_or_else(|| "unknown".to_string()),
                            booking.total_amount
                        );
                        tracing::warn!("Manual review for booking {}: {}", booking.id, reason);
                        return Ok(ConfirmationOutcome::ManualReview {
                            booking_id: booking.id,
                            reason,
                        });
                    }
                };

                let write = self
                    .bookings
                    .confirm_paid_booking(&ConfirmPayment {
                        booking_id: booking.id,
                        reference: reference.to_string(),
                        amount_paid,
                        gateway_response: verification.raw,
                    })
                    .await?;

                match write {
                    ConfirmationWrite::Performed { booking, seats } => {
                        let integrity_alarm = seats == SeatDecrement::Refused;
                        if integrity_alarm {
                            report_integrity_alarm(booking.trip_id, "payment confirmation");
                        }
                        tracing::info!(
                            "Booking {} confirmed by {} (seat {} on trip {})",
                            booking.id,
                            reference,
                            booking.seat_number,
                            booking.trip_id
                        );
                        self.feed.publish_trip(booking.trip_id).await;
                        Ok(ConfirmationOutcome::Confirmed {
                            booking_id: booking.id,
                            newly_confirmed: true,
                            integrity_alarm,
                        })
                    }
                    ConfirmationWrite::AlreadyConfirmed(booking) => {
                        if booking.payment_reference.as_deref().is_some_and(|r| r != reference) {
                            return Ok(duplicate_charge(&booking, reference));
                        }
                        tracing::debug!("Booking {} was confirmed by a concurrent trigger", booking.id);
                        Ok(ConfirmationOutcome::confirmed(booking.id, false))
                    }
                    ConfirmationWrite::NotConfirmable(booking) => {
                        let reason = "payment succeeded for cancelled booking; refund required".to_string();
                        tracing::warn!("Manual review for booking {}: {} (reference {})", booking.id, reason, reference);
                        Ok(ConfirmationOutcome::ManualReview {
                            booking_id: booking.id,
                            reason,
                        })
                    }
                }
            }
        }
    }
}

/// A successful charge for a booking some other reference already paid for.
fn duplicate_charge(booking: &Booking, reference: &str) -> ConfirmationOutcome {
    let reason = format!(
        "booking already paid by {}; duplicate charge {} requires a refund",
        booking.payment_reference.as_deref().unwrap_or("another charge"),
        reference
    );
    tracing::warn!("Manual review for booking {}: {}", booking.id, reason);
    ConfirmationOutcome::ManualReview {
        booking_id: booking.id,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_booking_id_object_or_string() {
        let id = Uuid::new_v4();
        let as_object = WebhookData {
            reference: Some("BUS-1".to_string()),
            metadata: serde_json::json!({ "booking_id": id }),
        };
        assert_eq!(as_object.booking_id(), Some(id));

        let as_string = WebhookData {
            reference: Some("BUS-1".to_string()),
            metadata: serde_json::Value::String(format!(r#"{{"booking_id":"{}"}}"#, id)),
        };
        assert_eq!(as_string.booking_id(), Some(id));

        assert_eq!(WebhookData::default().booking_id(), None);
    }

    #[test]
    fn test_outcome_labels() {
        let id = Uuid::new_v4();
        assert_eq!(ConfirmationOutcome::confirmed(id, true).status_label(), "success");
        let pending = ConfirmationOutcome::Pending {
            booking_id: id,
            gateway_status: "timeout".to_string(),
        };
        assert_eq!(pending.status_label(), "timeout");
        assert!(!pending.is_success());
        assert_eq!(pending.booking_id(), id);
    }
}
