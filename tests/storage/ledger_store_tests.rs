//! LedgerStore interface tests.
//!
//! These tests verify the contract of the LedgerStore trait.
//! Each storage implementation should run these tests.

use catchpoints::model::{Account, AwardKind, MembershipTier, PublishableItem, Timestamp};
use catchpoints::storage::{LedgerStore, StorageError};
use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

fn created() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
}

/// A timestamp with sub-second precision, to catch lossy storage.
fn precise(day: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 2, day, 12, 0, 0).unwrap() + Duration::microseconds(123_456)
}

async fn seed_account<S: LedgerStore>(store: &S, tier: MembershipTier) -> Account {
    let account = Account::new(Uuid::new_v4(), tier, created());
    store
        .create_account(&account)
        .await
        .expect("create_account should succeed");
    account
}

async fn seed_item<S: LedgerStore>(store: &S, owner: Uuid, is_public: bool) -> Uuid {
    let mut item = PublishableItem::new(Uuid::new_v4(), owner);
    item.is_public = is_public;
    store
        .create_item(&item)
        .await
        .expect("create_item should succeed");
    item.id
}

// =============================================================================
// Accounts
// =============================================================================

pub async fn test_get_nonexistent_account<S: LedgerStore>(store: &S) {
    let result = store
        .get_account(Uuid::new_v4())
        .await
        .expect("get_account should succeed");
    assert!(result.is_none(), "nonexistent account should be None");
}

pub async fn test_create_and_get_account<S: LedgerStore>(store: &S) {
    let mut account = Account::new(Uuid::new_v4(), MembershipTier::Supporter, created());
    account.balance = 4_200;
    account.last_recurring_award_at = Some(precise(1));
    store.create_account(&account).await.unwrap();

    let loaded = store
        .get_account(account.id)
        .await
        .unwrap()
        .expect("account should exist");
    assert_eq!(loaded, account, "account should round-trip unchanged");
}

pub async fn test_create_duplicate_account<S: LedgerStore>(store: &S) {
    let account = seed_account(store, MembershipTier::Free).await;

    let err = store.create_account(&account).await.unwrap_err();
    assert!(
        matches!(err, StorageError::AlreadyExists { id, .. } if id == account.id),
        "duplicate account should be rejected, got {:?}",
        err
    );
}

pub async fn test_unknown_tier_label_preserved<S: LedgerStore>(store: &S) {
    let account = seed_account(store, MembershipTier::parse("platinum")).await;

    let loaded = store.get_account(account.id).await.unwrap().unwrap();
    assert_eq!(loaded.membership_tier, MembershipTier::Other("platinum".to_string()));
}

pub async fn test_set_membership_tier<S: LedgerStore>(store: &S) {
    let account = seed_account(store, MembershipTier::Free).await;

    store
        .set_membership_tier(account.id, &MembershipTier::Gold)
        .await
        .expect("set_membership_tier should succeed");

    let loaded = store.get_account(account.id).await.unwrap().unwrap();
    assert_eq!(loaded.membership_tier, MembershipTier::Gold);
    assert_eq!(loaded.balance, 0, "tier change should not touch balance");
}

pub async fn test_set_membership_tier_missing<S: LedgerStore>(store: &S) {
    let err = store
        .set_membership_tier(Uuid::new_v4(), &MembershipTier::Gold)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { entity: "account", .. }));
}

// =============================================================================
// Recurring awards
// =============================================================================

pub async fn test_first_recurring_award<S: LedgerStore>(store: &S) {
    let account = seed_account(store, MembershipTier::Gold).await;
    let now = precise(15);

    store
        .apply_recurring_award(account.id, 100_000, None, now)
        .await
        .expect("first award should succeed");

    let loaded = store.get_account(account.id).await.unwrap().unwrap();
    assert_eq!(loaded.balance, 100_000);
    assert_eq!(loaded.last_recurring_award_at, Some(now));

    let awards = store.list_awards(account.id).await.unwrap();
    assert_eq!(awards.len(), 1);
    assert_eq!(awards[0].kind, AwardKind::Recurring);
    assert_eq!(awards[0].item_id, None);
    assert_eq!(awards[0].points, 100_000);
    assert_eq!(awards[0].awarded_at, now);
}

pub async fn test_chained_recurring_awards<S: LedgerStore>(store: &S) {
    let account = seed_account(store, MembershipTier::Supporter).await;
    let first = precise(15);
    let second = first + Duration::days(31);

    store
        .apply_recurring_award(account.id, 1_000_000, None, first)
        .await
        .unwrap();
    // Guard uses the anchor as read back from the store
    let anchor = store
        .get_account(account.id)
        .await
        .unwrap()
        .unwrap()
        .last_recurring_award_at;
    store
        .apply_recurring_award(account.id, 1_000_000, anchor, second)
        .await
        .expect("award guarded on current anchor should succeed");

    let loaded = store.get_account(account.id).await.unwrap().unwrap();
    assert_eq!(loaded.balance, 2_000_000);
    assert_eq!(loaded.last_recurring_award_at, Some(second));
}

pub async fn test_stale_anchor_conflicts<S: LedgerStore>(store: &S) {
    let account = seed_account(store, MembershipTier::Gold).await;
    let now = precise(15);

    store
        .apply_recurring_award(account.id, 100_000, None, now)
        .await
        .unwrap();

    // A second writer that read the account before the first award
    let err = store
        .apply_recurring_award(account.id, 100_000, None, now)
        .await
        .unwrap_err();
    assert!(
        matches!(err, StorageError::AnchorConflict { account_id } if account_id == account.id),
        "stale anchor should conflict, got {:?}",
        err
    );

    let loaded = store.get_account(account.id).await.unwrap().unwrap();
    assert_eq!(loaded.balance, 100_000, "conflict must not credit");
    assert_eq!(store.list_awards(account.id).await.unwrap().len(), 1);
}

pub async fn test_recurring_award_missing_account<S: LedgerStore>(store: &S) {
    let err = store
        .apply_recurring_award(Uuid::new_v4(), 100, None, precise(1))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { entity: "account", .. }));
}

pub async fn test_recurring_award_overflow<S: LedgerStore>(store: &S) {
    let mut account = Account::new(Uuid::new_v4(), MembershipTier::Gold, created());
    account.balance = i64::MAX as u64 - 10;
    store.create_account(&account).await.unwrap();

    let err = store
        .apply_recurring_award(account.id, 100, None, precise(1))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::BalanceOverflow { .. }));

    let loaded = store.get_account(account.id).await.unwrap().unwrap();
    assert_eq!(loaded.balance, i64::MAX as u64 - 10);
    assert!(loaded.last_recurring_award_at.is_none());
    assert!(store.list_awards(account.id).await.unwrap().is_empty());
}

// =============================================================================
// Publishable items
// =============================================================================

pub async fn test_get_nonexistent_item<S: LedgerStore>(store: &S) {
    let result = store.get_item(Uuid::new_v4()).await.unwrap();
    assert!(result.is_none(), "nonexistent item should be None");
}

pub async fn test_create_and_get_item<S: LedgerStore>(store: &S) {
    let owner = seed_account(store, MembershipTier::Paid).await;
    let item_id = seed_item(store, owner.id, true).await;

    let item = store.get_item(item_id).await.unwrap().expect("item should exist");
    assert_eq!(item.owner_account_id, owner.id);
    assert!(item.is_public);
    assert!(!item.points_awarded);

    let err = store.create_item(&item).await.unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists { .. }));
}

pub async fn test_set_item_visibility<S: LedgerStore>(store: &S) {
    let owner = seed_account(store, MembershipTier::Paid).await;
    let item_id = seed_item(store, owner.id, false).await;

    store.set_item_visibility(item_id, true).await.unwrap();
    assert!(store.get_item(item_id).await.unwrap().unwrap().is_public);

    store.set_item_visibility(item_id, false).await.unwrap();
    assert!(!store.get_item(item_id).await.unwrap().unwrap().is_public);

    let err = store
        .set_item_visibility(Uuid::new_v4(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { entity: "publishable item", .. }));
}

pub async fn test_list_unawarded_public_items<S: LedgerStore>(store: &S) {
    let owner = seed_account(store, MembershipTier::Paid).await;
    let other = seed_account(store, MembershipTier::Paid).await;

    let mut expected = vec![
        seed_item(store, owner.id, true).await,
        seed_item(store, owner.id, true).await,
        seed_item(store, owner.id, true).await,
    ];
    expected.sort();
    seed_item(store, owner.id, false).await;
    seed_item(store, other.id, true).await;

    let pending = store.list_unawarded_public_items(owner.id).await.unwrap();
    assert_eq!(pending, expected, "should list owned public unpaid items by id");

    store
        .award_publications(owner.id, &expected[..1], 1_000, precise(2))
        .await
        .unwrap();
    let pending = store.list_unawarded_public_items(owner.id).await.unwrap();
    assert_eq!(pending, expected[1..].to_vec(), "paid items should drop out");
}

// =============================================================================
// Publication awards
// =============================================================================

pub async fn test_award_publications_pays_once<S: LedgerStore>(store: &S) {
    let owner = seed_account(store, MembershipTier::Paid).await;
    let item_id = seed_item(store, owner.id, true).await;

    let paid = store
        .award_publications(owner.id, &[item_id], 1_000, precise(3))
        .await
        .unwrap();
    assert_eq!(paid, vec![item_id]);

    let paid_again = store
        .award_publications(owner.id, &[item_id], 1_000, precise(4))
        .await
        .unwrap();
    assert!(paid_again.is_empty(), "second award should flip nothing");

    let loaded = store.get_account(owner.id).await.unwrap().unwrap();
    assert_eq!(loaded.balance, 1_000);
    assert!(store.get_item(item_id).await.unwrap().unwrap().points_awarded);

    let awards = store.list_awards(owner.id).await.unwrap();
    assert_eq!(awards.len(), 1);
    assert_eq!(awards[0].kind, AwardKind::Publication);
    assert_eq!(awards[0].item_id, Some(item_id));
    assert_eq!(awards[0].awarded_at, precise(3));
}

pub async fn test_award_publications_skips_ineligible<S: LedgerStore>(store: &S) {
    let owner = seed_account(store, MembershipTier::Paid).await;
    let other = seed_account(store, MembershipTier::Paid).await;

    let public = seed_item(store, owner.id, true).await;
    let private = seed_item(store, owner.id, false).await;
    let foreign = seed_item(store, other.id, true).await;
    let missing = Uuid::new_v4();

    let paid = store
        .award_publications(owner.id, &[public, private, foreign, missing], 1_000, precise(5))
        .await
        .unwrap();
    assert_eq!(paid, vec![public]);

    assert_eq!(store.get_account(owner.id).await.unwrap().unwrap().balance, 1_000);
    assert_eq!(store.get_account(other.id).await.unwrap().unwrap().balance, 0);
    assert!(!store.get_item(private).await.unwrap().unwrap().points_awarded);
    assert!(!store.get_item(foreign).await.unwrap().unwrap().points_awarded);
}

pub async fn test_award_publications_batch_credit<S: LedgerStore>(store: &S) {
    let owner = seed_account(store, MembershipTier::Gold).await;
    let mut items = Vec::new();
    for _ in 0..4 {
        items.push(seed_item(store, owner.id, true).await);
    }
    items.sort();

    let paid = store
        .award_publications(owner.id, &items, 1_000, precise(6))
        .await
        .unwrap();
    assert_eq!(paid, items);
    assert_eq!(store.get_account(owner.id).await.unwrap().unwrap().balance, 4_000);
    assert_eq!(store.list_awards(owner.id).await.unwrap().len(), 4);
}

pub async fn test_visibility_toggle_keeps_award_flag<S: LedgerStore>(store: &S) {
    let owner = seed_account(store, MembershipTier::Free).await;
    let item_id = seed_item(store, owner.id, true).await;

    store
        .award_publications(owner.id, &[item_id], 100, precise(7))
        .await
        .unwrap();
    store.set_item_visibility(item_id, false).await.unwrap();
    store.set_item_visibility(item_id, true).await.unwrap();

    assert!(store.get_item(item_id).await.unwrap().unwrap().points_awarded);
    let paid = store
        .award_publications(owner.id, &[item_id], 100, precise(8))
        .await
        .unwrap();
    assert!(paid.is_empty(), "republished item must not be paid again");
}

pub async fn test_award_publications_overflow_rolls_back<S: LedgerStore>(store: &S) {
    let mut account = Account::new(Uuid::new_v4(), MembershipTier::Paid, created());
    account.balance = i64::MAX as u64 - 500;
    store.create_account(&account).await.unwrap();
    let first = seed_item(store, account.id, true).await;
    let second = seed_item(store, account.id, true).await;

    let err = store
        .award_publications(account.id, &[first, second], 1_000, precise(12))
        .await
        .unwrap_err();
    assert!(
        matches!(err, StorageError::BalanceOverflow { account_id } if account_id == account.id),
        "overflowing credit should be rejected, got {:?}",
        err
    );

    for item_id in [first, second] {
        let item = store.get_item(item_id).await.unwrap().unwrap();
        assert!(!item.points_awarded, "flag must roll back with the credit");
    }
    let loaded = store.get_account(account.id).await.unwrap().unwrap();
    assert_eq!(loaded.balance, i64::MAX as u64 - 500);
    assert!(store.list_awards(account.id).await.unwrap().is_empty());

    let mut pending = vec![first, second];
    pending.sort();
    assert_eq!(
        store.list_unawarded_public_items(account.id).await.unwrap(),
        pending,
        "items should still be payable after the rollback"
    );
}

pub async fn test_award_publications_missing_account<S: LedgerStore>(store: &S) {
    let err = store
        .award_publications(Uuid::new_v4(), &[Uuid::new_v4()], 100, precise(9))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { entity: "account", .. }));
}

// =============================================================================
// Audit log
// =============================================================================

pub async fn test_list_awards_oldest_first<S: LedgerStore>(store: &S) {
    let owner = seed_account(store, MembershipTier::Gold).await;
    let item_id = seed_item(store, owner.id, true).await;

    store
        .apply_recurring_award(owner.id, 100_000, None, precise(10))
        .await
        .unwrap();
    store
        .award_publications(owner.id, &[item_id], 1_000, precise(11))
        .await
        .unwrap();

    let awards = store.list_awards(owner.id).await.unwrap();
    let kinds: Vec<AwardKind> = awards.iter().map(|a| a.kind).collect();
    assert_eq!(kinds, vec![AwardKind::Recurring, AwardKind::Publication]);

    let total: u64 = awards.iter().map(|a| a.points).sum();
    let balance = store.get_account(owner.id).await.unwrap().unwrap().balance;
    assert_eq!(total, balance, "audit log should sum to the balance");

    assert!(store.list_awards(Uuid::new_v4()).await.unwrap().is_empty());
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all LedgerStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_ledger_store_tests {
    ($store:expr) => {
        use $crate::storage::ledger_store_tests::*;

        // account tests
        test_get_nonexistent_account($store).await;
        println!("  test_get_nonexistent_account: PASSED");

        test_create_and_get_account($store).await;
        println!("  test_create_and_get_account: PASSED");

        test_create_duplicate_account($store).await;
        println!("  test_create_duplicate_account: PASSED");

        test_unknown_tier_label_preserved($store).await;
        println!("  test_unknown_tier_label_preserved: PASSED");

        test_set_membership_tier($store).await;
        println!("  test_set_membership_tier: PASSED");

        test_set_membership_tier_missing($store).await;
        println!("  test_set_membership_tier_missing: PASSED");

        // recurring award tests
        test_first_recurring_award($store).await;
        println!("  test_first_recurring_award: PASSED");

        test_chained_recurring_awards($store).await;
        println!("  test_chained_recurring_awards: PASSED");

        test_stale_anchor_conflicts($store).await;
        println!("  test_stale_anchor_conflicts: PASSED");

        test_recurring_award_missing_account($store).await;
        println!("  test_recurring_award_missing_account: PASSED");

        test_recurring_award_overflow($store).await;
        println!("  test_recurring_award_overflow: PASSED");

        // item tests
        test_get_nonexistent_item($store).await;
        println!("  test_get_nonexistent_item: PASSED");

        test_create_and_get_item($store).await;
        println!("  test_create_and_get_item: PASSED");

        test_set_item_visibility($store).await;
        println!("  test_set_item_visibility: PASSED");

        test_list_unawarded_public_items($store).await;
        println!("  test_list_unawarded_public_items: PASSED");

        // publication award tests
        test_award_publications_pays_once($store).await;
        println!("  test_award_publications_pays_once: PASSED");

        test_award_publications_skips_ineligible($store).await;
        println!("  test_award_publications_skips_ineligible: PASSED");

        test_award_publications_batch_credit($store).await;
        println!("  test_award_publications_batch_credit: PASSED");

        test_visibility_toggle_keeps_award_flag($store).await;
        println!("  test_visibility_toggle_keeps_award_flag: PASSED");

        test_award_publications_overflow_rolls_back($store).await;
        println!("  test_award_publications_overflow_rolls_back: PASSED");

        test_award_publications_missing_account($store).await;
        println!("  test_award_publications_missing_account: PASSED");

        // audit log tests
        test_list_awards_oldest_first($store).await;
        println!("  test_list_awards_oldest_first: PASSED");
    };
}
