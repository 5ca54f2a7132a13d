use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use tally_db::models::CheckinOutcome;
use tally_types::error::LoyaltyError;
use tally_types::events::LoyaltyEvent;
use tally_types::models::{
    CheckInMethod, CheckinAttempt, CheckinConfirmation, CheckinRecord, Event, LedgerReason, Tier,
};

use crate::{EngineInner, blocking, codes, geo};

/// Proof-of-presence verification. Every rejection happens before any row
/// is written; the accepted path writes the check-in record and the ledger
/// credit in one store transaction, with `UNIQUE(account_id, event_id)` as
/// the final once-only gate under races.
#[derive(Clone)]
pub struct CheckinVerifier {
    inner: Arc<EngineInner>,
}

impl CheckinVerifier {
    pub(crate) fn new(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    /// Create an event at a venue. The QR token is generated here; the
    /// check-in location defaults to the venue's coordinates unless
    /// overridden.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_event(
        &self,
        venue_id: Uuid,
        title: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        check_in_method: CheckInMethod,
        points_reward: u32,
        rsvp_required: bool,
        location: Option<(f64, f64)>,
    ) -> Result<Event, LoyaltyError> {
        let id = Uuid::new_v4();
        let qr_token = codes::generate_code();
        let title = title.to_string();

        let inner = self.inner.clone();
        let db_title = title.clone();
        let db_token = qr_token.clone();
        let (latitude, longitude) = blocking(move || {
            let Some(venue) = inner.db.get_venue(&venue_id.to_string())? else {
                return Ok(None);
            };
            let (latitude, longitude) = location.unwrap_or((venue.latitude, venue.longitude));
            inner.db.create_event(
                &id.to_string(),
                &venue_id.to_string(),
                &db_title,
                start_time,
                end_time,
                check_in_method.as_str(),
                latitude,
                longitude,
                &db_token,
                i64::from(points_reward),
                rsvp_required,
            )?;
            Ok(Some((latitude, longitude)))
        })
        .await?
        .ok_or(LoyaltyError::VenueNotFound)?;

        info!("created event {} at venue {}", id, venue_id);
        Ok(Event {
            id,
            venue_id,
            title,
            start_time,
            end_time,
            check_in_method,
            latitude,
            longitude,
            qr_token,
            points_reward: i64::from(points_reward),
            rsvp_required,
        })
    }

    /// Register attendance intent. Idempotent; required before check-in
    /// only when the event says so.
    pub async fn rsvp(&self, account_id: Uuid, event_id: Uuid) -> Result<(), LoyaltyError> {
        let now = Utc::now();
        let inner = self.inner.clone();
        blocking(move || {
            if inner.db.get_event(&event_id.to_string())?.is_none() {
                return Ok(Err(LoyaltyError::EventNotFound));
            }
            if inner.db.get_account(&account_id.to_string())?.is_none() {
                return Ok(Err(LoyaltyError::AccountNotFound));
            }
            inner
                .db
                .add_rsvp(&event_id.to_string(), &account_id.to_string(), now)?;
            Ok(Ok(()))
        })
        .await?
    }

    /// Verify presence and credit the event's points, at most once per
    /// account per event.
    pub async fn check_in(
        &self,
        account_id: Uuid,
        event_id: Uuid,
        attempt: CheckinAttempt,
    ) -> Result<CheckinConfirmation, LoyaltyError> {
        let now = Utc::now();

        // One round trip for everything the validation chain reads.
        let inner = self.inner.clone();
        let (event_row, has_rsvp, already) = blocking(move || {
            let event = inner.db.get_event(&event_id.to_string())?;
            let has_rsvp = inner
                .db
                .has_rsvp(&event_id.to_string(), &account_id.to_string())?;
            let already = inner
                .db
                .get_checkin(&account_id.to_string(), &event_id.to_string())?
                .is_some();
            Ok((event, has_rsvp, already))
        })
        .await?;

        let event = event_row
            .ok_or(LoyaltyError::EventNotFound)?
            .into_event()?;

        if event.rsvp_required && !has_rsvp {
            return Err(LoyaltyError::NotRegistered);
        }
        if already {
            return Err(LoyaltyError::AlreadyCheckedIn);
        }
        if !event.check_in_method.accepts(attempt.method()) {
            return Err(LoyaltyError::WrongMethod);
        }

        match &attempt {
            CheckinAttempt::Qr { token } => {
                if *token != event.qr_token {
                    return Err(LoyaltyError::InvalidCode);
                }
            }
            CheckinAttempt::Gps {
                latitude,
                longitude,
            } => {
                let distance_m =
                    geo::haversine_m(*latitude, *longitude, event.latitude, event.longitude);
                let max_m = self.inner.policy.checkin_radius_m;
                if distance_m > max_m {
                    debug!(
                        "check-in rejected: {} is {:.0}m from event {}",
                        account_id, distance_m, event_id
                    );
                    return Err(LoyaltyError::TooFar { distance_m, max_m });
                }
            }
        }

        if now < event.start_time {
            return Err(LoyaltyError::CheckinNotOpen);
        }
        if now > event.end_time {
            return Err(LoyaltyError::CheckinEnded);
        }

        let checkin_id = Uuid::new_v4();
        let entry_id = Uuid::new_v4();
        let method = attempt.method();
        let points = event.points_reward;

        let inner = self.inner.clone();
        let outcome = blocking(move || {
            inner.db.record_checkin(
                &checkin_id.to_string(),
                &entry_id.to_string(),
                &account_id.to_string(),
                &event_id.to_string(),
                method.as_str(),
                points,
                now,
            )
        })
        .await?;

        match outcome {
            CheckinOutcome::Recorded { new_balance } => {
                info!(
                    "account {} checked in to event {} (+{} points)",
                    account_id, event_id, points
                );
                self.inner
                    .dispatcher
                    .broadcast(LoyaltyEvent::CheckinVerified {
                        account_id,
                        event_id,
                        points_awarded: points,
                    });
                self.inner.dispatcher.broadcast(LoyaltyEvent::PointsChanged {
                    account_id,
                    delta: points,
                    reason: LedgerReason::CheckIn,
                    new_balance,
                    tier: Tier::for_balance(new_balance, &self.inner.policy.tiers),
                });
                Ok(CheckinConfirmation {
                    record: CheckinRecord {
                        id: checkin_id,
                        account_id,
                        event_id,
                        method,
                        verified_at: now,
                        points_awarded: points,
                    },
                    points_earned: points,
                    new_balance,
                })
            }
            CheckinOutcome::Duplicate => Err(LoyaltyError::AlreadyCheckedIn),
            CheckinOutcome::Suspended => Err(LoyaltyError::AccountSuspended),
            CheckinOutcome::AccountNotFound => Err(LoyaltyError::AccountNotFound),
        }
    }
}
