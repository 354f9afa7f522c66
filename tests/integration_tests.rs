//! Integration tests for card-ledger-core

use bigdecimal::BigDecimal;
use card_ledger_core::{
    utils::{init_tracing, MemoryStorage},
    Account, AccountKind, AdjustmentType, CardLedger, DecisionAction,
    EntryStatus, ErrorKind, ImportDecision, LedgerEntry, LedgerStorage, MatchType,
    ParsedAdjustment, ParsedStatement, ParsedTransaction, PeriodStatus, StatementCard,
};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::str::FromStr;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn usd(amount: &str) -> BigDecimal {
    BigDecimal::from_str(amount).unwrap()
}

async fn setup(closing_day: u32, due_day: u32) -> (MemoryStorage, CardLedger<MemoryStorage>) {
    init_tracing();
    let storage = MemoryStorage::new();
    let mut ledger = CardLedger::new(storage.clone());

    let card = Account::credit_card(
        "visa".to_string(),
        "Visa Gold".to_string(),
        "USD".to_string(),
        closing_day,
        due_day,
    );
    let bank = Account::new(
        "checking".to_string(),
        "Checking".to_string(),
        AccountKind::Bank,
        "USD".to_string(),
    )
    .with_balance(usd("10000"));
    assert!(ledger.create_account(card).await.success);
    assert!(ledger.create_account(bank).await.success);
    (storage, ledger)
}

async fn record(
    ledger: &mut CardLedger<MemoryStorage>,
    amount: &str,
    d: NaiveDate,
    description: &str,
) -> LedgerEntry {
    let entry = LedgerEntry::expense(
        "visa",
        usd(amount),
        "USD".to_string(),
        d,
        description.to_string(),
    );
    ledger.record_entry(entry).await.into_result().unwrap()
}

fn charge(d: NaiveDate, description: &str, amount: &str) -> ParsedTransaction {
    ParsedTransaction::charge(d, description, usd(amount), "USD")
}

fn january_statement(total: &str) -> ParsedStatement {
    let mut statement = ParsedStatement::new(
        "Test Bank",
        date(2024, 1, 31),
        date(2024, 2, 10),
        "USD",
        usd(total),
    );
    statement.previous_closing_date = Some(date(2023, 12, 31));
    statement
}

#[tokio::test]
async fn test_exact_match_on_same_day_purchase() {
    let (_storage, mut ledger) = setup(31, 10).await;
    let entry = record(&mut ledger, "100.00", date(2024, 1, 12), "SUPERMERCADO").await;

    let mut statement = january_statement("100.00");
    statement.transactions.push(ParsedTransaction::charge(
        date(2024, 1, 12),
        "SUPERMERCADO 1234",
        usd("100.00"),
        "USD",
    ));

    let result = ledger.reconcile(&statement, "visa").await.into_result().unwrap();
    let item = &result.items[0];
    assert_eq!(item.match_type, MatchType::Exact);
    assert!(item.confidence >= 90);
    assert_eq!(item.matched_entry.as_ref().map(|e| e.id.as_str()), Some(entry.id.as_str()));
    assert_eq!(result.summary.exact, 1);
    assert_eq!(result.summary.difference, BigDecimal::from(0));
}

#[tokio::test]
async fn test_reconcile_is_deterministic_and_claims_once() {
    let (_storage, mut ledger) = setup(31, 10).await;
    record(&mut ledger, "25.00", date(2024, 1, 5), "COFFEE SHOP").await;
    record(&mut ledger, "25.00", date(2024, 1, 6), "COFFEE SHOP").await;
    record(&mut ledger, "60.00", date(2024, 1, 9), "GAS STATION").await;

    let mut statement = january_statement("135.00");
    for (day, description, amount) in [
        (5, "COFFEE SHOP", "25.00"),
        (6, "COFFEE SHOP", "25.00"),
        (7, "COFFEE SHOP", "25.00"),
        (9, "GAS STATION 77", "60.00"),
    ] {
        statement.transactions.push(ParsedTransaction::charge(
            date(2024, 1, day),
            description,
            usd(amount),
            "USD",
        ));
    }

    let first = ledger.reconcile(&statement, "visa").await.into_result().unwrap();
    let second = ledger.reconcile(&statement, "visa").await.into_result().unwrap();
    let verdicts = |r: &card_ledger_core::ReconciliationResult| {
        r.items
            .iter()
            .map(|i| (i.match_type, i.confidence))
            .collect::<Vec<_>>()
    };
    assert_eq!(verdicts(&first), verdicts(&second));

    let mut claimed = HashSet::new();
    for entry in first.items.iter().filter_map(|i| i.matched_entry.as_ref()) {
        assert!(claimed.insert(entry.id.clone()), "entry claimed twice");
    }
    assert_eq!(claimed.len(), 3);
    assert_eq!(first.summary.not_found, 1);
}

#[tokio::test]
async fn test_import_creates_installment_plan() {
    let (storage, mut ledger) = setup(31, 10).await;

    let mut statement = january_statement("250.00");
    statement
        .transactions
        .push(charge(date(2023, 11, 20), "SMART TV 3/6", "250.00").with_installment(3, 6));
    statement.next_closing_date = Some(date(2024, 2, 29));
    statement.next_due_date = Some(date(2024, 3, 11));

    let result = ledger.reconcile(&statement, "visa").await.into_result().unwrap();
    assert_eq!(result.items[0].match_type, MatchType::NotFound);

    let outcome = ledger.apply_import(&result, &[], true).await.into_result().unwrap();
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.created_entries(), 4);
    assert_eq!(outcome.period.total_amount, usd("250.00"));

    let mut entries = Vec::new();
    for id in &outcome.created_entry_ids {
        entries.push(storage.get_entry(id).await.unwrap().unwrap());
    }
    let groups: HashSet<String> = entries
        .iter()
        .map(|e| e.installment.as_ref().unwrap().group_id.clone())
        .collect();
    assert_eq!(groups.len(), 1);

    let schedule: Vec<(Option<u32>, NaiveDate, EntryStatus)> = entries
        .iter()
        .skip(1)
        .map(|e| (e.installment_position(), e.date, e.status))
        .collect();
    assert_eq!(
        schedule,
        vec![
            (Some(4), date(2024, 2, 29), EntryStatus::Pending),
            (Some(5), date(2024, 3, 31), EntryStatus::Pending),
            (Some(6), date(2024, 4, 30), EntryStatus::Pending),
        ]
    );

    let next = outcome.next_period.unwrap();
    assert_eq!(next.closing_date, date(2024, 2, 29));
    let detail = ledger.period_detail(&next.id).await.into_result().unwrap();
    assert_eq!(detail.period.total_amount, usd("250.00"));

    let card = storage.get_account("visa").await.unwrap().unwrap();
    assert_eq!(card.billing_cycle.map(|c| (c.closing_day, c.due_day)), Some((29, 11)));
}

#[tokio::test]
async fn test_imported_installment_survives_regeneration() {
    let (storage, mut ledger) = setup(31, 10).await;

    let mut statement = january_statement("250.00");
    statement
        .transactions
        .push(charge(date(2023, 11, 20), "SMART TV 3/6", "250.00").with_installment(3, 6));
    statement.next_closing_date = Some(date(2024, 2, 29));
    statement.next_due_date = Some(date(2024, 3, 11));

    let result = ledger.reconcile(&statement, "visa").await.into_result().unwrap();
    let outcome = ledger.apply_import(&result, &[], true).await.into_result().unwrap();
    let billed = storage
        .get_entry(&outcome.created_entry_ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(billed.date, date(2024, 1, 31));

    let regenerated = ledger.generate_period("visa", 2024, 1).await.into_result().unwrap();
    assert_eq!(regenerated.id, outcome.period.id);
    assert_eq!(regenerated.total_amount, usd("250.00"));

    let detail = ledger.period_detail(&regenerated.id).await.into_result().unwrap();
    assert_eq!(detail.line_items.len(), 1);
    assert_eq!(detail.line_items[0].entry_id, billed.id);

    let november = ledger.generate_period("visa", 2023, 11).await.into_result().unwrap();
    assert_eq!(november.total_amount, BigDecimal::from(0));
}

#[tokio::test]
async fn test_paying_an_imported_statement_settles_the_card() {
    let (storage, mut ledger) = setup(31, 10).await;
    record(&mut ledger, "100.00", date(2024, 1, 10), "HOTEL").await;

    let mut statement = january_statement("160.00");
    statement.transactions.push(charge(date(2024, 1, 10), "HOTEL", "100.00"));
    statement.transactions.push(charge(date(2024, 1, 14), "BOOKS", "50.00"));
    statement.adjustments.push(ParsedAdjustment::new(
        AdjustmentType::Interest,
        "Interest",
        usd("10.00"),
        "USD",
    ));

    let result = ledger.reconcile(&statement, "visa").await.into_result().unwrap();
    let outcome = ledger.apply_import(&result, &[], true).await.into_result().unwrap();
    assert_eq!(outcome.created_entries(), 1);
    assert_eq!(outcome.created_adjustments, 1);

    let card = storage.get_account("visa").await.unwrap().unwrap();
    assert_eq!(card.balance, usd("-150.00"));

    let receipt = ledger
        .pay_period(&outcome.period.id, "checking", Some(date(2024, 2, 8)))
        .await
        .into_result()
        .unwrap();
    assert_eq!(receipt.amount_paid, usd("160.00"));
    assert_eq!(receipt.adjustment_entries.len(), 1);

    let card = storage.get_account("visa").await.unwrap().unwrap();
    let bank = storage.get_account("checking").await.unwrap().unwrap();
    assert_eq!(card.balance, BigDecimal::from(0));
    assert_eq!(bank.balance, usd("9840.00"));
}

#[tokio::test]
async fn test_foreign_currency_line_is_reported_not_created() {
    let (storage, mut ledger) = setup(31, 10).await;
    let mut statement = january_statement("40.00");
    statement.transactions.push(charge(date(2024, 1, 6), "MUSEUM", "40.00"));
    statement.transactions.push(ParsedTransaction::charge(
        date(2024, 1, 7),
        "PARIS HOTEL",
        usd("120.00"),
        "EUR",
    ));

    let result = ledger.reconcile(&statement, "visa").await.into_result().unwrap();
    let outcome = ledger.apply_import(&result, &[], true).await.into_result().unwrap();

    assert_eq!(outcome.created_entries(), 1);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].contains("PARIS HOTEL"));
    assert!(outcome.errors[0].contains("EUR"));
    assert_eq!(storage.entry_count().unwrap(), 1);

    let card = storage.get_account("visa").await.unwrap().unwrap();
    assert_eq!(card.balance, usd("-40.00"));
}

#[tokio::test]
async fn test_failed_next_period_recompute_does_not_fail_import() {
    let (storage, mut ledger) = setup(31, 10).await;
    let mut statement = january_statement("22.00");
    statement.transactions.push(charge(date(2024, 1, 9), "BAKERY", "22.00"));

    let result = ledger.reconcile(&statement, "visa").await.into_result().unwrap();
    storage.fail_periods_for(Some((2024, 2))).unwrap();
    let outcome = ledger.apply_import(&result, &[], true).await;

    assert!(outcome.success);
    let outcome = outcome.into_result().unwrap();
    assert!(outcome.next_period.is_none());
    assert_eq!(outcome.period.total_amount, usd("22.00"));
    assert!(storage.find_period("visa", 2024, 2).await.unwrap().is_none());

    storage.fail_periods_for(None).unwrap();
    let february = ledger.generate_period("visa", 2024, 2).await.into_result().unwrap();
    assert_eq!(february.total_amount, BigDecimal::from(0));
}

#[tokio::test]
async fn test_import_links_matches_and_stores_adjustments() {
    let (storage, mut ledger) = setup(31, 10).await;
    record(&mut ledger, "80.00", date(2024, 1, 3), "BOOKSTORE").await;
    record(&mut ledger, "45.00", date(2024, 1, 8), "PHARMACY").await;

    let mut statement = january_statement("137.50");
    statement.transactions.push(charge(date(2024, 1, 3), "BOOKSTORE", "80.00"));
    statement.transactions.push(charge(date(2024, 1, 8), "PHARMACY", "47.00"));
    statement.adjustments.push(ParsedAdjustment::new(
        AdjustmentType::Tax,
        "Stamp tax",
        usd("10.50"),
        "USD",
    ));

    let result = ledger.reconcile(&statement, "visa").await.into_result().unwrap();
    assert_eq!(result.items[1].match_type, MatchType::Discrepancy);

    let outcome = ledger.apply_import(&result, &[], false).await.into_result().unwrap();
    assert_eq!(outcome.linked_entries, 2);
    assert_eq!(outcome.created_adjustments, 1);
    assert_eq!(outcome.created_entries(), 0);
    assert_eq!(outcome.period.total_amount, usd("137.50"));
    assert_eq!(outcome.period.calculated_amount, usd("125.00"));

    let items = storage.get_line_items(&outcome.period.id).await.unwrap();
    assert_eq!(items.iter().filter(|i| i.is_reconciled).count(), 1);
    assert_eq!(items.iter().filter(|i| i.has_discrepancy).count(), 1);

    let again = ledger.reconcile(&statement, "visa").await.into_result().unwrap();
    assert_eq!(again.summary.adjustments_existing, 1);
    assert_eq!(again.summary.adjustments_to_apply, 0);
}

#[tokio::test]
async fn test_rejected_decisions_are_skipped() {
    let (storage, mut ledger) = setup(31, 10).await;
    let mut statement = january_statement("30.00");
    statement.transactions.push(charge(date(2024, 1, 4), "MOVIES", "12.00"));
    statement.transactions.push(charge(date(2024, 1, 5), "TAXI", "18.00"));

    let result = ledger.reconcile(&statement, "visa").await.into_result().unwrap();
    let decisions = [ImportDecision::transaction(1, DecisionAction::Reject)];
    let outcome = ledger.apply_import(&result, &decisions, true).await.into_result().unwrap();
    assert_eq!(outcome.created_entries(), 1);
    assert_eq!(storage.entry_count().unwrap(), 1);
}

#[tokio::test]
async fn test_row_failures_are_collected() {
    let (storage, mut ledger) = setup(31, 10).await;
    let mut statement = january_statement("35.00");
    statement.transactions.push(charge(date(2024, 1, 4), "LUNCH", "15.00"));
    statement.transactions.push(charge(date(2024, 1, 5), "BROKEN ROW", "20.00"));

    let result = ledger.reconcile(&statement, "visa").await.into_result().unwrap();
    storage.fail_entries_containing(Some("BROKEN")).unwrap();
    let outcome = ledger.apply_import(&result, &[], true).await.into_result().unwrap();

    assert_eq!(outcome.created_entries(), 1);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].contains("BROKEN ROW"));
    assert_eq!(outcome.period.total_amount, usd("35.00"));
    assert_eq!(storage.entry_count().unwrap(), 1);
}

#[tokio::test]
async fn test_import_into_closed_period_conflicts() {
    let (storage, mut ledger) = setup(31, 10).await;
    let period = ledger.generate_period("visa", 2024, 1).await.into_result().unwrap();
    ledger.close_period(&period.id, None).await.into_result().unwrap();

    let mut statement = january_statement("9.00");
    statement.transactions.push(charge(date(2024, 1, 4), "SNACK", "9.00"));
    let result = ledger.reconcile(&statement, "visa").await.into_result().unwrap();

    let writes = storage.write_count();
    let outcome = ledger.apply_import(&result, &[], true).await;
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::StateConflict));
    assert_eq!(storage.write_count(), writes);
}

#[tokio::test]
async fn test_consolidated_statement_is_narrowed_to_the_card() {
    let (mut storage, mut ledger) = setup(31, 10).await;
    let mut card = storage.get_account("visa").await.unwrap().unwrap();
    card = card.with_card_tag("5678");
    storage.update_account(&card).await.unwrap();

    let mut statement = january_statement("70.00");
    statement.cards = vec![
        StatementCard {
            tag: "1234".to_string(),
            holder: Some("Main holder".to_string()),
            is_primary: true,
        },
        StatementCard {
            tag: "5678".to_string(),
            holder: Some("Additional".to_string()),
            is_primary: false,
        },
    ];
    statement
        .transactions
        .push(charge(date(2024, 1, 2), "MAIN", "40.00").with_card_tag("1234"));
    statement
        .transactions
        .push(charge(date(2024, 1, 3), "EXTRA", "30.00").with_card_tag("5678"));
    statement.transactions.push(charge(date(2024, 1, 4), "UNTAGGED", "5.00"));

    let result = ledger.reconcile(&statement, "visa").await.into_result().unwrap();
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].transaction.description, "EXTRA");
    assert_eq!(result.summary.pdf_total, usd("30.00"));
}

#[tokio::test]
async fn test_late_charge_belongs_to_next_period() {
    let (_storage, mut ledger) = setup(15, 5).await;
    record(&mut ledger, "500.00", date(2024, 4, 20), "APPLIANCE").await;

    let april = ledger.generate_period("visa", 2024, 4).await.into_result().unwrap();
    let may = ledger.generate_period("visa", 2024, 5).await.into_result().unwrap();
    assert_eq!(april.total_amount, BigDecimal::from(0));
    assert_eq!(may.total_amount, usd("500.00"));
}

#[tokio::test]
async fn test_generate_twice_writes_nothing() {
    let (storage, mut ledger) = setup(15, 5).await;
    record(&mut ledger, "12.00", date(2024, 4, 1), "PARKING").await;

    let first = ledger.generate_period("visa", 2024, 4).await.into_result().unwrap();
    let writes = storage.write_count();
    let second = ledger.generate_period("visa", 2024, 4).await.into_result().unwrap();
    assert_eq!(storage.write_count(), writes);
    assert_eq!(first.total_amount, second.total_amount);
}

#[tokio::test]
async fn test_plan_z_payment_conserves_balances() {
    let (storage, mut ledger) = setup(31, 10).await;
    let laptop = LedgerEntry::expense(
        "visa",
        usd("900.00"),
        "USD".to_string(),
        date(2024, 1, 10),
        "LAPTOP".to_string(),
    )
    .with_plan_z(true);
    ledger.record_entry(laptop.clone()).await.into_result().unwrap();
    record(&mut ledger, "100.00", date(2024, 1, 11), "GROCERIES").await;

    let period = ledger.generate_period("visa", 2024, 1).await.into_result().unwrap();
    assert_eq!(period.total_amount, usd("1000.00"));

    let bank_before = storage.get_account("checking").await.unwrap().unwrap().balance;
    let card_before = storage.get_account("visa").await.unwrap().unwrap().balance;

    let receipt = ledger
        .pay_period(&period.id, "checking", Some(date(2024, 2, 8)))
        .await
        .into_result()
        .unwrap();
    assert_eq!(receipt.amount_paid, usd("400.00"));
    assert_eq!(receipt.plan_z_splits.len(), 1);

    let bank_after = storage.get_account("checking").await.unwrap().unwrap().balance;
    let card_after = storage.get_account("visa").await.unwrap().unwrap().balance;
    assert_eq!(&bank_before - &receipt.amount_paid, bank_after);
    assert_eq!(&card_before + &receipt.amount_paid, card_after);

    assert!(storage.get_entry(&laptop.id).await.unwrap().is_none());
    let items = storage.get_line_items(&period.id).await.unwrap();
    let linked: BigDecimal = items.iter().map(|i| i.amount.clone()).sum();
    assert_eq!(linked, usd("400.00"));

    let split = &receipt.plan_z_splits[0];
    let later = ledger.generate_period("visa", 2024, 2).await.into_result().unwrap();
    assert_eq!(later.total_amount, split.installments[1].amount);
}

#[tokio::test]
async fn test_lifecycle_only_moves_forward() {
    let (storage, mut ledger) = setup(31, 10).await;
    record(&mut ledger, "50.00", date(2024, 1, 10), "DINNER").await;
    let period = ledger.generate_period("visa", 2024, 1).await.into_result().unwrap();

    ledger.close_period(&period.id, None).await.into_result().unwrap();
    let writes = storage.write_count();
    let closed_again = ledger.close_period(&period.id, None).await;
    assert_eq!(closed_again.error_kind, Some(ErrorKind::StateConflict));
    assert_eq!(storage.write_count(), writes);

    let paid = ledger.pay_period(&period.id, "checking", None).await.into_result().unwrap();
    assert_eq!(paid.period.status, PeriodStatus::Paid);

    let writes = storage.write_count();
    for outcome in [
        ledger.pay_period(&period.id, "checking", None).await.error_kind,
        ledger.close_period(&period.id, None).await.error_kind,
        ledger.reset_period(&period.id).await.error_kind,
    ] {
        assert_eq!(outcome, Some(ErrorKind::StateConflict));
    }
    assert_eq!(storage.write_count(), writes);
}

#[tokio::test]
async fn test_reset_clears_draft() {
    let (_storage, mut ledger) = setup(31, 10).await;
    for day in 1..=5 {
        record(&mut ledger, "10.00", date(2024, 1, day), "ITEM").await;
    }
    let period = ledger.generate_period("visa", 2024, 1).await.into_result().unwrap();
    ledger
        .add_adjustment(&period.id, AdjustmentType::Interest, "Interest", &usd("4.20"))
        .await
        .into_result()
        .unwrap();
    ledger
        .add_adjustment(&period.id, AdjustmentType::Credit, "Refund promo", &usd("2.00"))
        .await
        .into_result()
        .unwrap();

    let detail = ledger.period_detail(&period.id).await.into_result().unwrap();
    assert_eq!(detail.line_items.len(), 5);
    assert_eq!(detail.adjustments.len(), 2);
    assert_eq!(detail.period.total_amount, usd("52.20"));

    let reset = ledger.reset_period(&period.id).await.into_result().unwrap();
    assert_eq!(reset.status, PeriodStatus::Draft);
    assert_eq!(reset.total_amount, BigDecimal::from(0));
    let detail = ledger.period_detail(&period.id).await.into_result().unwrap();
    assert!(detail.line_items.is_empty() && detail.adjustments.is_empty());
}

#[tokio::test]
async fn test_payment_validation_errors() {
    let (_storage, mut ledger) = setup(31, 10).await;
    record(&mut ledger, "20000.00", date(2024, 1, 10), "CAR REPAIR").await;
    let period = ledger.generate_period("visa", 2024, 1).await.into_result().unwrap();

    let from_card = ledger.pay_period(&period.id, "visa", None).await;
    assert_eq!(from_card.error_kind, Some(ErrorKind::Validation));

    let short = ledger.pay_period(&period.id, "checking", None).await;
    assert_eq!(short.error_kind, Some(ErrorKind::StateConflict));

    let reconcile_on_bank = ledger.reconcile(&january_statement("0"), "checking").await;
    assert_eq!(reconcile_on_bank.error_kind, Some(ErrorKind::Validation));
}

#[tokio::test]
async fn test_projection_after_installment_import() {
    let (_storage, mut ledger) = setup(31, 10).await;
    let plan = card_ledger_core::patterns::installment_purchase(
        "visa",
        &usd("300.00"),
        3,
        "USD",
        date(2024, 1, 20),
        "BIKE",
    )
    .unwrap();
    ledger.record_entries(plan).await.into_result().unwrap();

    let projected = ledger
        .project_periods_from("visa", date(2024, 1, 25), 3)
        .await
        .into_result()
        .unwrap();
    let amounts: Vec<BigDecimal> = projected.iter().map(|p| p.amount.clone()).collect();
    assert_eq!(amounts, vec![usd("100.00"), usd("100.00"), BigDecimal::from(0)]);
    assert_eq!(projected[0].closing_date, date(2024, 2, 29));
}
