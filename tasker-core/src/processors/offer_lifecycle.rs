//! Job offer lifecycle controller.
//!
//! Holds at most one offer. The offer moves `offered -> {accepted | declined
//! | expired | superseded}` exactly once: every transition goes through
//! [`OfferLifecycleController::commit`], which re-checks that the offer is
//! still `offered` and is the one the input refers to before changing
//! anything.
//!
//! The countdown runs as a [`ScheduledTask`] that feeds
//! `DecisionInput::Expire` back into the session, so expiry is applied on the
//! same event loop as every other transition. A decision taken at or after
//! the deadline commits `expired` even if the countdown has not been
//! processed yet.

use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::events::{DecisionInput, DecisionSender, JobOffer, OfferEvent, OfferId, OfferState};
use crate::utils::ScheduledTask;

/// A decision or invalidation that no longer applies.
///
/// Never fatal: callers log it and move on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StaleDecision {
    #[error("no offer has been presented")]
    NoActiveOffer,

    #[error("input refers to offer {received} but the current offer is {current}")]
    OfferMismatch { current: OfferId, received: OfferId },

    #[error("offer {offer_id} is already {state}")]
    AlreadySettled { offer_id: OfferId, state: OfferState },
}

/// Result of presenting a new offer to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// The offer is now active and its countdown is running.
    Admitted(OfferEvent),
    /// Another offer is still awaiting a decision.
    Busy { active: OfferId },
    /// The offer is the current one, delivered again.
    Duplicate,
}

struct CurrentOffer {
    offer: JobOffer,
    deadline: Instant,
    timer: ScheduledTask,
    state: OfferState,
}

pub struct OfferLifecycleController {
    expiry_tx: DecisionSender,
    current: Option<CurrentOffer>,
}

impl OfferLifecycleController {
    /// Create an idle controller. Countdown expiries are sent on `expiry_tx`.
    pub fn new(expiry_tx: DecisionSender) -> Self {
        Self {
            expiry_tx,
            current: None,
        }
    }

    pub fn state(&self) -> OfferState {
        self.current
            .as_ref()
            .map_or(OfferState::Idle, |current| current.state)
    }

    /// The offer awaiting a decision, if any.
    pub fn active_offer(&self) -> Option<&JobOffer> {
        self.current
            .as_ref()
            .filter(|current| current.state == OfferState::Offered)
            .map(|current| &current.offer)
    }

    /// Present `offer`. Admitted from `idle` or any terminal state.
    pub fn offer(&mut self, offer: JobOffer) -> Admission {
        if let Some(current) = &self.current {
            if current.offer.id == offer.id {
                debug!(offer_id = %offer.id, "Duplicate offer ignored");
                return Admission::Duplicate;
            }
            if !current.state.is_terminal() {
                info!(
                    offer_id = %offer.id,
                    active_offer_id = %current.offer.id,
                    "Offer not admitted, another offer is awaiting a decision"
                );
                return Admission::Busy {
                    active: current.offer.id.clone(),
                };
            }
        }

        let remaining = offer.remaining(OffsetDateTime::now_utc());
        let deadline = Instant::now() + remaining;
        let expiry_tx = self.expiry_tx.clone();
        let offer_id = offer.id.clone();
        let timer = ScheduledTask::after(remaining, async move {
            if expiry_tx.send(DecisionInput::Expire(offer_id)).await.is_err() {
                debug!("Session closed before offer countdown fired");
            }
        });

        info!(
            offer_id = %offer.id,
            kind = %offer.kind,
            remaining_ms = remaining.as_millis() as u64,
            "Offer presented"
        );
        self.current = Some(CurrentOffer {
            offer: offer.clone(),
            deadline,
            timer,
            state: OfferState::Offered,
        });
        Admission::Admitted(OfferEvent::Presented { offer, remaining })
    }

    /// Apply a worker decision or a countdown expiry.
    pub fn decide(&mut self, input: DecisionInput) -> Result<OfferEvent, StaleDecision> {
        match input {
            DecisionInput::Expire(offer_id) => self.commit(&offer_id, OfferEvent::Expired),
            DecisionInput::Accept(offer_id) if self.deadline_passed() => {
                debug!(offer_id = %offer_id, "Accept arrived after the deadline");
                self.commit(&offer_id, OfferEvent::Expired)
            }
            DecisionInput::Decline(offer_id) if self.deadline_passed() => {
                self.commit(&offer_id, OfferEvent::Expired)
            }
            DecisionInput::Accept(offer_id) => self.commit(&offer_id, OfferEvent::Accepted),
            DecisionInput::Decline(offer_id) => self.commit(&offer_id, OfferEvent::Declined),
        }
    }

    /// Another worker claimed the offer.
    pub fn supersede(&mut self, offer_id: &OfferId) -> Result<OfferEvent, StaleDecision> {
        self.commit(offer_id, OfferEvent::Superseded)
    }

    /// The dispatch server expired the offer.
    pub fn server_expired(&mut self, offer_id: &OfferId) -> Result<OfferEvent, StaleDecision> {
        self.commit(offer_id, OfferEvent::Expired)
    }

    fn deadline_passed(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| Instant::now() >= current.deadline)
    }

    /// Compare-and-transition: the offer must still be `offered` and match
    /// `offer_id` at the moment of commit.
    fn commit(
        &mut self,
        offer_id: &OfferId,
        transition: fn(OfferId) -> OfferEvent,
    ) -> Result<OfferEvent, StaleDecision> {
        let Some(current) = self.current.as_mut() else {
            return Err(StaleDecision::NoActiveOffer);
        };
        if current.offer.id != *offer_id {
            return Err(StaleDecision::OfferMismatch {
                current: current.offer.id.clone(),
                received: offer_id.clone(),
            });
        }
        if current.state != OfferState::Offered {
            return Err(StaleDecision::AlreadySettled {
                offer_id: offer_id.clone(),
                state: current.state,
            });
        }

        current.timer.cancel();
        let event = transition(offer_id.clone());
        current.state = event.state();
        info!(offer_id = %offer_id, state = %current.state, "Offer settled");
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DecisionReceiver, decision_channel};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use std::time::Duration;
    use tasker_sdk::objects::{JobKind, PlaceDescriptor, RequesterDescriptor};

    fn offer(id: &str) -> JobOffer {
        let now = OffsetDateTime::now_utc();
        JobOffer {
            id: OfferId::from(id),
            kind: JobKind::Errand,
            pickup: PlaceDescriptor {
                address: "1 Main St".into(),
                label: None,
            },
            dropoff: None,
            reward: Decimal::new(800, 2),
            currency: None,
            distance_km: None,
            duration_minutes: None,
            requester: RequesterDescriptor {
                id: "u_1".into(),
                name: "Sam".into(),
            },
            urgent: false,
            created_at: now,
            expires_at: now + Duration::from_secs(30),
        }
    }

    fn controller() -> (OfferLifecycleController, DecisionReceiver) {
        let (expiry_tx, expiry_rx) = decision_channel();
        (OfferLifecycleController::new(expiry_tx), expiry_rx)
    }

    fn admit(controller: &mut OfferLifecycleController, id: &str) {
        assert!(matches!(
            controller.offer(offer(id)),
            Admission::Admitted(OfferEvent::Presented { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_within_window() {
        let (mut controller, mut expiry_rx) = controller();
        admit(&mut controller, "of_1");
        assert_eq!(controller.state(), OfferState::Offered);

        tokio::time::sleep(Duration::from_secs(10)).await;
        let event = controller.decide(DecisionInput::Accept("of_1".into()));
        assert_eq!(event, Ok(OfferEvent::Accepted("of_1".into())));
        assert!(controller.active_offer().is_none());

        // Countdown was cancelled.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(expiry_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_after_deadline_expires() {
        let (mut controller, _expiry_rx) = controller();
        admit(&mut controller, "of_1");

        tokio::time::sleep(Duration::from_secs(31)).await;
        let event = controller.decide(DecisionInput::Accept("of_1".into()));
        assert_eq!(event, Ok(OfferEvent::Expired("of_1".into())));
        assert_eq!(controller.state(), OfferState::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_at_deadline_expires() {
        let (mut controller, mut expiry_rx) = controller();
        admit(&mut controller, "of_1");
        let deadline = controller.current.as_ref().unwrap().deadline;

        tokio::time::sleep_until(deadline).await;
        assert_eq!(
            controller.decide(DecisionInput::Accept("of_1".into())),
            Ok(OfferEvent::Expired("of_1".into()))
        );

        // The countdown, if it fired in the same tick, finds the offer settled.
        if let Ok(fired) = expiry_rx.try_recv() {
            assert!(matches!(
                controller.decide(fired),
                Err(StaleDecision::AlreadySettled { .. })
            ));
        }
        assert_eq!(controller.state(), OfferState::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_expires_offer_once() {
        let (mut controller, mut expiry_rx) = controller();
        admit(&mut controller, "of_1");

        let fired = expiry_rx.recv().await.unwrap();
        assert_eq!(fired, DecisionInput::Expire("of_1".into()));
        assert_eq!(
            controller.decide(fired.clone()),
            Ok(OfferEvent::Expired("of_1".into()))
        );
        assert_eq!(
            controller.decide(fired),
            Err(StaleDecision::AlreadySettled {
                offer_id: "of_1".into(),
                state: OfferState::Expired,
            })
        );
        assert!(controller.decide(DecisionInput::Accept("of_1".into())).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_supersede_beats_late_accept() {
        let (mut controller, _expiry_rx) = controller();
        admit(&mut controller, "of_1");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(
            controller.supersede(&"of_1".into()),
            Ok(OfferEvent::Superseded("of_1".into()))
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(matches!(
            controller.decide(DecisionInput::Accept("of_1".into())),
            Err(StaleDecision::AlreadySettled { .. })
        ));
        assert_eq!(controller.state(), OfferState::Superseded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatched_decision_is_noop() {
        let (mut controller, _expiry_rx) = controller();
        assert_eq!(
            controller.decide(DecisionInput::Decline("of_1".into())),
            Err(StaleDecision::NoActiveOffer)
        );

        admit(&mut controller, "of_2");
        assert!(matches!(
            controller.decide(DecisionInput::Accept("of_1".into())),
            Err(StaleDecision::OfferMismatch { .. })
        ));
        assert_eq!(controller.state(), OfferState::Offered);
        assert_eq!(controller.active_offer().map(|o| o.id.as_str()), Some("of_2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_expiry_cancels_countdown() {
        let (mut controller, mut expiry_rx) = controller();
        admit(&mut controller, "of_1");

        assert_eq!(
            controller.server_expired(&"of_1".into()),
            Ok(OfferEvent::Expired("of_1".into()))
        );
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(expiry_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_one_active_offer() {
        let (mut controller, _expiry_rx) = controller();
        admit(&mut controller, "of_1");

        assert_eq!(
            controller.offer(offer("of_2")),
            Admission::Busy {
                active: "of_1".into()
            }
        );
        assert_eq!(controller.offer(offer("of_1")), Admission::Duplicate);

        controller
            .decide(DecisionInput::Decline("of_1".into()))
            .unwrap();
        admit(&mut controller, "of_2");
        assert_eq!(controller.active_offer().map(|o| o.id.as_str()), Some("of_2"));

        for n in 3..10 {
            let _ = controller.offer(offer(&format!("of_{n}")));
            assert_eq!(controller.state(), OfferState::Offered);
            assert_eq!(controller.active_offer().map(|o| o.id.as_str()), Some("of_2"));
        }
    }

    #[derive(Debug, Clone)]
    enum Step {
        Offer(u8),
        Accept(u8),
        Decline(u8),
        Supersede(u8),
        ServerExpire(u8),
        Advance(u64),
        Countdown,
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0u8..3).prop_map(Step::Offer),
            (0u8..3).prop_map(Step::Accept),
            (0u8..3).prop_map(Step::Decline),
            (0u8..3).prop_map(Step::Supersede),
            (0u8..3).prop_map(Step::ServerExpire),
            (0u64..40).prop_map(Step::Advance),
            Just(Step::Countdown),
        ]
    }

    fn id(n: u8) -> OfferId {
        OfferId::from(format!("of_{n}").as_str())
    }

    /// Presentation being tracked: offer id, when it was presented, and
    /// whether it has settled.
    struct Presented {
        offer_id: OfferId,
        at: Instant,
        settled: bool,
    }

    async fn run_steps(steps: Vec<Step>) -> Result<(), TestCaseError> {
        let (mut controller, mut expiry_rx) = controller();
        let mut presented: Option<Presented> = None;

        for step in steps {
            let outcome = match step {
                Step::Offer(n) => match controller.offer(offer(id(n).as_str())) {
                    Admission::Admitted(event) => Some(event),
                    Admission::Busy { .. } | Admission::Duplicate => None,
                },
                Step::Accept(n) => controller.decide(DecisionInput::Accept(id(n))).ok(),
                Step::Decline(n) => controller.decide(DecisionInput::Decline(id(n))).ok(),
                Step::Supersede(n) => controller.supersede(&id(n)).ok(),
                Step::ServerExpire(n) => controller.server_expired(&id(n)).ok(),
                Step::Advance(secs) => {
                    tokio::time::advance(Duration::from_secs(secs)).await;
                    None
                }
                Step::Countdown => {
                    tokio::task::yield_now().await;
                    match expiry_rx.try_recv() {
                        Ok(fired) => controller.decide(fired).ok(),
                        Err(_) => None,
                    }
                }
            };

            match outcome {
                Some(OfferEvent::Presented { offer, .. }) => {
                    if let Some(previous) = &presented {
                        prop_assert!(previous.settled, "offer presented while another is active");
                    }
                    presented = Some(Presented {
                        offer_id: offer.id,
                        at: Instant::now(),
                        settled: false,
                    });
                }
                Some(event) => {
                    let Some(current) = presented.as_mut() else {
                        return Err(TestCaseError::fail("settled before any offer"));
                    };
                    prop_assert_eq!(event.offer_id(), &current.offer_id);
                    prop_assert!(!current.settled, "offer settled twice");
                    prop_assert!(event.state().is_terminal());
                    if matches!(event, OfferEvent::Accepted(_)) {
                        prop_assert!(current.at.elapsed() < Duration::from_secs(30));
                    }
                    current.settled = true;
                }
                None => {}
            }

            let state = controller.state();
            prop_assert_eq!(controller.active_offer().is_some(), state == OfferState::Offered);
            if let Some(current) = &presented {
                prop_assert_eq!(state.is_terminal(), current.settled);
                if !current.settled {
                    prop_assert_eq!(
                        controller.active_offer().map(|offer| &offer.id),
                        Some(&current.offer_id)
                    );
                }
            } else {
                prop_assert_eq!(state, OfferState::Idle);
            }
        }
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        #[test]
        fn test_any_sequence_settles_each_offer_once(
            steps in prop::collection::vec(step_strategy(), 1..40)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            runtime.block_on(run_steps(steps))?;
        }
    }
}
