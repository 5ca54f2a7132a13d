/// End-to-end scenarios against a real on-disk store: the earn/redeem/
/// validate flow, check-in verification in all its rejection modes, and the
/// moderation workflow.
use std::fs;
use std::path::PathBuf;

use chrono::{Duration, Utc};

use tally_engine::{Engine, Policy};
use tally_types::error::LoyaltyError;
use tally_types::events::LoyaltyEvent;
use tally_types::models::{
    AccountStatus, CaseAction, CaseSeverity, CheckInMethod, CheckinAttempt, LedgerReason, Tier,
};

fn fresh_engine(name: &str) -> Engine {
    fresh_engine_with(name, Policy::default())
}

fn fresh_engine_with(name: &str, policy: Policy) -> Engine {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tally=debug")
        .try_init();

    let dir = std::env::temp_dir().join("tally_engine_tests");
    let _ = fs::create_dir_all(&dir);
    for suffix in ["db", "db-wal", "db-shm"] {
        let _ = fs::remove_file(dir.join(format!("{}.{}", name, suffix)));
    }
    let path: PathBuf = dir.join(format!("{}.db", name));
    Engine::open(&path, policy).unwrap()
}

const VENUE_LAT: f64 = 52.5200;
const VENUE_LON: f64 = 13.4050;

#[tokio::test]
async fn test_redeem_then_validate_flow() {
    let engine = fresh_engine("redeem_validate");
    let ledger = engine.ledger();
    let rewards = engine.rewards();
    let vouchers = engine.vouchers();

    let account = ledger.open_account("Ada").await.unwrap();
    ledger
        .apply_delta(account.id, 1000, LedgerReason::AdminAdjustment)
        .await
        .unwrap();

    let venue = rewards
        .register_venue("Corner Cafe", VENUE_LAT, VENUE_LON)
        .await
        .unwrap();
    let reward = rewards
        .create_reward(venue.id, "Free Dinner", "food", 800)
        .await
        .unwrap();

    let voucher = rewards.redeem(account.id, reward.id).await.unwrap();
    assert!(!voucher.consumed);
    assert_eq!(voucher.code.len(), 22);

    let summary = ledger.balance(account.id).await.unwrap();
    assert_eq!(summary.point_balance, 200);
    assert!(ledger.verify_account(account.id).await.unwrap());

    // Validate at the right venue: consumed in the same call
    let consumed = vouchers.validate(&voucher.code, venue.id).await.unwrap();
    assert!(consumed.consumed);
    assert_eq!(consumed.consumed_at_venue_id, Some(venue.id));

    // Second scan loses
    let err = vouchers.validate(&voucher.code, venue.id).await.unwrap_err();
    assert!(matches!(err, LoyaltyError::VoucherAlreadyUsed));
}

#[tokio::test]
async fn test_redeem_insufficient_balance() {
    let engine = fresh_engine("redeem_insufficient");
    let ledger = engine.ledger();
    let rewards = engine.rewards();

    let account = ledger.open_account("Ben").await.unwrap();
    ledger
        .apply_delta(account.id, 100, LedgerReason::Survey)
        .await
        .unwrap();

    let venue = rewards
        .register_venue("Corner Cafe", VENUE_LAT, VENUE_LON)
        .await
        .unwrap();
    let reward = rewards
        .create_reward(venue.id, "Free Dinner", "food", 800)
        .await
        .unwrap();

    let err = rewards.redeem(account.id, reward.id).await.unwrap_err();
    assert!(matches!(
        err,
        LoyaltyError::InsufficientBalance {
            balance: 100,
            requested: 800
        }
    ));

    // Nothing leaked
    let summary = ledger.balance(account.id).await.unwrap();
    assert_eq!(summary.point_balance, 100);
    assert!(ledger.verify_account(account.id).await.unwrap());
}

#[tokio::test]
async fn test_voucher_survives_reward_deactivation() {
    let engine = fresh_engine("deactivated_reward");
    let ledger = engine.ledger();
    let rewards = engine.rewards();
    let vouchers = engine.vouchers();

    let account = ledger.open_account("Cleo").await.unwrap();
    ledger
        .apply_delta(account.id, 500, LedgerReason::AdminAdjustment)
        .await
        .unwrap();
    let venue = rewards
        .register_venue("Corner Cafe", VENUE_LAT, VENUE_LON)
        .await
        .unwrap();
    let reward = rewards
        .create_reward(venue.id, "Mug", "merch", 200)
        .await
        .unwrap();

    let voucher = rewards.redeem(account.id, reward.id).await.unwrap();
    rewards.set_reward_active(reward.id, false).await.unwrap();

    // No further redemptions...
    let err = rewards.redeem(account.id, reward.id).await.unwrap_err();
    assert!(matches!(err, LoyaltyError::RewardInactive));

    // ...but the outstanding voucher still validates
    let consumed = vouchers.validate(&voucher.code, venue.id).await.unwrap();
    assert!(consumed.consumed);
}

#[tokio::test]
async fn test_voucher_expiry() {
    let policy = Policy {
        voucher_ttl: Duration::seconds(-60),
        ..Policy::default()
    };
    let engine = fresh_engine_with("voucher_expiry", policy);
    let ledger = engine.ledger();
    let rewards = engine.rewards();

    let account = ledger.open_account("Dee").await.unwrap();
    ledger
        .apply_delta(account.id, 500, LedgerReason::AdminAdjustment)
        .await
        .unwrap();
    let venue = rewards
        .register_venue("Corner Cafe", VENUE_LAT, VENUE_LON)
        .await
        .unwrap();
    let reward = rewards
        .create_reward(venue.id, "Mug", "merch", 100)
        .await
        .unwrap();

    let voucher = rewards.redeem(account.id, reward.id).await.unwrap();
    let err = engine
        .vouchers()
        .validate(&voucher.code, venue.id)
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::VoucherExpired));
}

#[tokio::test]
async fn test_checkin_qr_flow() {
    let engine = fresh_engine("checkin_qr");
    let ledger = engine.ledger();
    let rewards = engine.rewards();
    let checkins = engine.checkins();

    let account = ledger.open_account("Eve").await.unwrap();
    let venue = rewards
        .register_venue("Corner Cafe", VENUE_LAT, VENUE_LON)
        .await
        .unwrap();
    let now = Utc::now();
    let event = checkins
        .create_event(
            venue.id,
            "Trivia Night",
            now - Duration::hours(1),
            now + Duration::hours(1),
            CheckInMethod::Qr,
            75,
            false,
            None,
        )
        .await
        .unwrap();

    let err = checkins
        .check_in(
            account.id,
            event.id,
            CheckinAttempt::Qr {
                token: "guessed".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::InvalidCode));

    let confirmation = checkins
        .check_in(
            account.id,
            event.id,
            CheckinAttempt::Qr {
                token: event.qr_token.clone(),
            },
        )
        .await
        .unwrap();
    assert_eq!(confirmation.points_earned, 75);
    assert_eq!(confirmation.new_balance, 75);

    // Exactly once per (account, event)
    let err = checkins
        .check_in(
            account.id,
            event.id,
            CheckinAttempt::Qr {
                token: event.qr_token.clone(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::AlreadyCheckedIn));

    let summary = ledger.balance(account.id).await.unwrap();
    assert_eq!(summary.point_balance, 75);
    assert!(ledger.verify_account(account.id).await.unwrap());
}

#[tokio::test]
async fn test_checkin_time_window() {
    let engine = fresh_engine("checkin_window");
    let ledger = engine.ledger();
    let rewards = engine.rewards();
    let checkins = engine.checkins();

    let account = ledger.open_account("Finn").await.unwrap();
    let venue = rewards
        .register_venue("Corner Cafe", VENUE_LAT, VENUE_LON)
        .await
        .unwrap();
    let now = Utc::now();

    // Two minutes early
    let upcoming = checkins
        .create_event(
            venue.id,
            "Doors Later",
            now + Duration::minutes(2),
            now + Duration::hours(2),
            CheckInMethod::Qr,
            50,
            false,
            None,
        )
        .await
        .unwrap();
    let err = checkins
        .check_in(
            account.id,
            upcoming.id,
            CheckinAttempt::Qr {
                token: upcoming.qr_token.clone(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::CheckinNotOpen));

    // Already over
    let finished = checkins
        .create_event(
            venue.id,
            "Last Week",
            now - Duration::hours(2),
            now - Duration::hours(1),
            CheckInMethod::Qr,
            50,
            false,
            None,
        )
        .await
        .unwrap();
    let err = checkins
        .check_in(
            account.id,
            finished.id,
            CheckinAttempt::Qr {
                token: finished.qr_token.clone(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::CheckinEnded));

    // Nothing was credited by either rejection
    let summary = ledger.balance(account.id).await.unwrap();
    assert_eq!(summary.point_balance, 0);
}

#[tokio::test]
async fn test_checkin_gps_proximity() {
    let engine = fresh_engine("checkin_gps");
    let ledger = engine.ledger();
    let rewards = engine.rewards();
    let checkins = engine.checkins();

    let near = ledger.open_account("Near").await.unwrap();
    let far = ledger.open_account("Far").await.unwrap();
    let venue = rewards
        .register_venue("Corner Cafe", VENUE_LAT, VENUE_LON)
        .await
        .unwrap();
    let now = Utc::now();
    let event = checkins
        .create_event(
            venue.id,
            "Open Mic",
            now - Duration::hours(1),
            now + Duration::hours(1),
            CheckInMethod::Gps,
            60,
            false,
            None,
        )
        .await
        .unwrap();

    // ~200m north of the venue: inside the default 1100m radius
    let confirmation = checkins
        .check_in(
            near.id,
            event.id,
            CheckinAttempt::Gps {
                latitude: VENUE_LAT + 0.0018,
                longitude: VENUE_LON,
            },
        )
        .await
        .unwrap();
    assert_eq!(confirmation.points_earned, 60);

    // ~2km north: rejected with the measured distance
    let err = checkins
        .check_in(
            far.id,
            event.id,
            CheckinAttempt::Gps {
                latitude: VENUE_LAT + 0.018,
                longitude: VENUE_LON,
            },
        )
        .await
        .unwrap_err();
    match err {
        LoyaltyError::TooFar { distance_m, max_m } => {
            assert!(distance_m > 1900.0 && distance_m < 2100.0);
            assert_eq!(max_m, 1100.0);
        }
        other => panic!("expected TooFar, got {other:?}"),
    }
}

#[tokio::test]
async fn test_checkin_method_enforcement() {
    let engine = fresh_engine("checkin_method");
    let ledger = engine.ledger();
    let rewards = engine.rewards();
    let checkins = engine.checkins();

    let account = ledger.open_account("Gus").await.unwrap();
    let venue = rewards
        .register_venue("Corner Cafe", VENUE_LAT, VENUE_LON)
        .await
        .unwrap();
    let now = Utc::now();

    let qr_only = checkins
        .create_event(
            venue.id,
            "QR Only",
            now - Duration::hours(1),
            now + Duration::hours(1),
            CheckInMethod::Qr,
            10,
            false,
            None,
        )
        .await
        .unwrap();
    let err = checkins
        .check_in(
            account.id,
            qr_only.id,
            CheckinAttempt::Gps {
                latitude: VENUE_LAT,
                longitude: VENUE_LON,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::WrongMethod));

    // An "either" event takes both
    let either = checkins
        .create_event(
            venue.id,
            "Anything Goes",
            now - Duration::hours(1),
            now + Duration::hours(1),
            CheckInMethod::Either,
            10,
            false,
            None,
        )
        .await
        .unwrap();
    checkins
        .check_in(
            account.id,
            either.id,
            CheckinAttempt::Gps {
                latitude: VENUE_LAT,
                longitude: VENUE_LON,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_checkin_rsvp_policy() {
    let engine = fresh_engine("checkin_rsvp");
    let ledger = engine.ledger();
    let rewards = engine.rewards();
    let checkins = engine.checkins();

    let account = ledger.open_account("Hana").await.unwrap();
    let venue = rewards
        .register_venue("Corner Cafe", VENUE_LAT, VENUE_LON)
        .await
        .unwrap();
    let now = Utc::now();
    let event = checkins
        .create_event(
            venue.id,
            "Members Dinner",
            now - Duration::hours(1),
            now + Duration::hours(1),
            CheckInMethod::Qr,
            100,
            true,
            None,
        )
        .await
        .unwrap();

    let err = checkins
        .check_in(
            account.id,
            event.id,
            CheckinAttempt::Qr {
                token: event.qr_token.clone(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::NotRegistered));

    checkins.rsvp(account.id, event.id).await.unwrap();
    // RSVP is idempotent
    checkins.rsvp(account.id, event.id).await.unwrap();

    let confirmation = checkins
        .check_in(
            account.id,
            event.id,
            CheckinAttempt::Qr {
                token: event.qr_token.clone(),
            },
        )
        .await
        .unwrap();
    assert_eq!(confirmation.points_earned, 100);
}

#[tokio::test]
async fn test_suspension_blocks_earning_and_spending() {
    let engine = fresh_engine("suspension");
    let ledger = engine.ledger();
    let rewards = engine.rewards();
    let checkins = engine.checkins();
    let moderation = engine.moderation();

    let account = ledger.open_account("Ivy").await.unwrap();
    ledger
        .apply_delta(account.id, 500, LedgerReason::AdminAdjustment)
        .await
        .unwrap();
    let venue = rewards
        .register_venue("Corner Cafe", VENUE_LAT, VENUE_LON)
        .await
        .unwrap();
    let reward = rewards
        .create_reward(venue.id, "Mug", "merch", 100)
        .await
        .unwrap();
    let now = Utc::now();
    let event = checkins
        .create_event(
            venue.id,
            "Open Mic",
            now - Duration::hours(1),
            now + Duration::hours(1),
            CheckInMethod::Qr,
            10,
            false,
            None,
        )
        .await
        .unwrap();

    let case = moderation
        .open_case(account.id, Some("post:7"), CaseSeverity::High, None)
        .await
        .unwrap();
    moderation
        .resolve(case.id, CaseAction::Suspend, Some("fake check-ins"))
        .await
        .unwrap();

    let err = rewards.redeem(account.id, reward.id).await.unwrap_err();
    assert!(matches!(err, LoyaltyError::AccountSuspended));
    let err = checkins
        .check_in(
            account.id,
            event.id,
            CheckinAttempt::Qr {
                token: event.qr_token.clone(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::AccountSuspended));
    let err = ledger
        .apply_delta(account.id, 5, LedgerReason::Post)
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::AccountSuspended));

    // Admin adjustments still work on suspended accounts
    ledger
        .apply_delta(account.id, -50, LedgerReason::AdminAdjustment)
        .await
        .unwrap();

    moderation.reinstate(account.id).await.unwrap();
    let summary = ledger.balance(account.id).await.unwrap();
    assert_eq!(summary.status, AccountStatus::Active);
    rewards.redeem(account.id, reward.id).await.unwrap();
    assert!(ledger.verify_account(account.id).await.unwrap());
}

#[tokio::test]
async fn test_warning_resolution() {
    let engine = fresh_engine("warning");
    let ledger = engine.ledger();
    let moderation = engine.moderation();

    let account = ledger.open_account("Jay").await.unwrap();
    let case = moderation
        .open_case(account.id, None, CaseSeverity::Low, None)
        .await
        .unwrap();

    let resolved = moderation
        .resolve(case.id, CaseAction::Warn, Some("spammy posts"))
        .await
        .unwrap();
    assert_eq!(resolved.resolution_notes.as_deref(), Some("spammy posts"));

    let summary = ledger.balance(account.id).await.unwrap();
    assert_eq!(summary.warning_count, 1);
    assert_eq!(summary.status, AccountStatus::Active);
}

#[tokio::test]
async fn test_tier_progression() {
    let engine = fresh_engine("tiers");
    let ledger = engine.ledger();

    let account = ledger.open_account("Kim").await.unwrap();
    assert_eq!(ledger.balance(account.id).await.unwrap().tier, Tier::Silver);

    let change = ledger
        .apply_delta(account.id, 600, LedgerReason::Survey)
        .await
        .unwrap();
    assert_eq!(change.tier, Tier::Gold);

    let change = ledger
        .apply_delta(account.id, 1000, LedgerReason::AdminAdjustment)
        .await
        .unwrap();
    assert_eq!(change.tier, Tier::Platinum);

    // Tier is a view of the balance: spending drops it back
    let change = ledger
        .apply_delta(account.id, -1200, LedgerReason::CashoutDebit)
        .await
        .unwrap();
    assert_eq!(change.new_balance, 400);
    assert_eq!(change.tier, Tier::Silver);
}

#[tokio::test]
async fn test_ledger_history_newest_first() {
    let engine = fresh_engine("history");
    let ledger = engine.ledger();

    let account = ledger.open_account("Lou").await.unwrap();
    ledger
        .apply_delta(account.id, 10, LedgerReason::Post)
        .await
        .unwrap();
    ledger
        .apply_delta(account.id, 5, LedgerReason::Like)
        .await
        .unwrap();
    ledger
        .apply_delta(account.id, 20, LedgerReason::Survey)
        .await
        .unwrap();

    let history = ledger.history(account.id, 10).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].reason, LedgerReason::Survey);
    assert_eq!(history[2].reason, LedgerReason::Post);
}

#[tokio::test]
async fn test_notifications_for_redemption() {
    let engine = fresh_engine("notifications");
    let ledger = engine.ledger();
    let rewards = engine.rewards();

    let account = ledger.open_account("Mia").await.unwrap();
    ledger
        .apply_delta(account.id, 500, LedgerReason::AdminAdjustment)
        .await
        .unwrap();
    let venue = rewards
        .register_venue("Corner Cafe", VENUE_LAT, VENUE_LON)
        .await
        .unwrap();
    let reward = rewards
        .create_reward(venue.id, "Mug", "merch", 200)
        .await
        .unwrap();

    let mut rx = engine.subscribe();
    let voucher = rewards.redeem(account.id, reward.id).await.unwrap();

    match rx.recv().await.unwrap() {
        LoyaltyEvent::PointsChanged {
            delta, new_balance, ..
        } => {
            assert_eq!(delta, -200);
            assert_eq!(new_balance, 300);
        }
        other => panic!("expected PointsChanged, got {other:?}"),
    }
    match rx.recv().await.unwrap() {
        LoyaltyEvent::VoucherIssued { voucher_id, .. } => {
            assert_eq!(voucher_id, voucher.id);
        }
        other => panic!("expected VoucherIssued, got {other:?}"),
    }
}
