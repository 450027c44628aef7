//! Tests for plan validation and schema model collection.

use super::*;
use crate::adapters::MemoryDatabase;
use crate::adapters::memory::primary_key_column;

fn shop() -> MemoryDatabase {
    let db = MemoryDatabase::new();
    db.add_table(
        "users",
        vec![
            primary_key_column("id", "int"),
            RawColumn::new("email", "varchar(255)").with_key(KeyRole::Unique),
            RawColumn::new("name", "varchar(20)"),
            RawColumn::new("score", "decimal(5,2)"),
            RawColumn::new("avatar", "blob"),
        ],
        &[],
    );
    db.add_table(
        "orders",
        vec![
            primary_key_column("id", "bigint unsigned"),
            RawColumn::new("user_id", "int").with_key(KeyRole::Multiple),
            RawColumn::new("total", "double"),
        ],
        &["users"],
    );
    db
}

fn reason(result: Result<()>) -> String {
    match result {
        Err(ObfuscatorError::SchemaMismatch { reason }) => reason,
        other => panic!("expected a schema mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_collect_schema_model_flags() {
    let model = collect_schema_model(&shop()).await.unwrap();

    assert_eq!(model.keys().collect::<Vec<_>>(), vec!["orders", "users"]);

    let users = &model["users"];
    let flags: Vec<(&str, bool, bool)> = users
        .iter()
        .map(|c| (c.name.as_str(), c.needs_obfuscation, c.is_primary_key))
        .collect();
    assert_eq!(
        flags,
        vec![
            ("id", false, true),
            ("email", false, false),
            ("name", true, false),
            ("score", true, false),
            ("avatar", false, false),
        ]
    );

    let orders = &model["orders"];
    assert!(!orders[1].needs_obfuscation, "foreign key columns stay unmasked");
    assert!(orders[2].needs_obfuscation);
}

#[tokio::test]
async fn test_table_without_primary_key() {
    let db = shop();
    db.add_table("audit", vec![RawColumn::new("message", "text")], &[]);

    let error = collect_schema_model(&db).await.unwrap_err();
    assert!(matches!(error, ObfuscatorError::TableStructure { ref table, .. } if table == "audit"));
}

#[tokio::test]
async fn test_schema_model_round_trips_as_plan() {
    let db = shop();
    let plan = collect_schema_model(&db).await.unwrap();
    assert!(validate_plan(&plan, &db).await.is_ok());
}

#[tokio::test]
async fn test_plan_may_leave_maskable_columns_unmasked() {
    let db = shop();
    let mut plan = collect_schema_model(&db).await.unwrap();
    for columns in plan.values_mut() {
        for column in columns {
            column.needs_obfuscation = false;
        }
    }
    assert!(validate_plan(&plan, &db).await.is_ok());
}

#[tokio::test]
async fn test_plan_columns_may_be_reordered() {
    let db = shop();
    let mut plan = collect_schema_model(&db).await.unwrap();
    plan.get_mut("users").unwrap().reverse();
    assert!(validate_plan(&plan, &db).await.is_ok());
}

#[tokio::test]
async fn test_rejects_table_count_mismatch() {
    let db = shop();
    let mut plan = collect_schema_model(&db).await.unwrap();
    plan.remove("orders");

    let reason = reason(validate_plan(&plan, &db).await);
    assert!(reason.contains("1 tables"), "{}", reason);
}

#[tokio::test]
async fn test_rejects_unknown_table() {
    let db = shop();
    let mut plan = collect_schema_model(&db).await.unwrap();
    let orders = plan.remove("orders").unwrap();
    plan.insert("invoices".to_string(), orders);

    let reason = reason(validate_plan(&plan, &db).await);
    assert!(reason.contains("'invoices'"), "{}", reason);
}

#[test]
fn test_rejects_column_mismatches() {
    let live = ObfuscationPlan::from([(
        "users".to_string(),
        vec![
            Column::new("id", "int").primary_key(),
            Column::new("name", "varchar(20)").obfuscated(),
            Column::new("email", "varchar(255)"),
        ],
    )]);

    let mutate = |f: &dyn Fn(&mut Vec<Column>)| {
        let mut plan = live.clone();
        if let Some(columns) = plan.get_mut("users") {
            f(columns);
        }
        reason(compare_plan(&plan, &live))
    };

    assert!(mutate(&|c| {
        c.pop();
    })
    .contains("2 columns in the plan but 3"));
    assert!(mutate(&|c| c[2].name = "mail".to_string()).contains("no column 'mail'"));
    assert!(mutate(&|c| c[1].sql_type = "varchar(40)".to_string()).contains("varchar(40)"));
    assert!(mutate(&|c| c[2].needs_obfuscation = true).contains("cannot be obfuscated"));
    assert!(mutate(&|c| c[0].needs_obfuscation = true).contains("cannot be obfuscated"));
    assert!(mutate(&|c| c[1].is_primary_key = true).contains("primary key flag"));
    assert!(mutate(&|c| c[0].is_primary_key = false).contains("primary key flag"));
}

#[test]
fn test_can_obfuscate() {
    assert!(can_obfuscate(&RawColumn::new("a", "int(11)")));
    assert!(can_obfuscate(&RawColumn::new("a", "char(8)")));
    assert!(!can_obfuscate(&RawColumn::new("a", "datetime")));
    assert!(!can_obfuscate(&RawColumn::new("a", "varchar(x)")));
    assert!(!can_obfuscate(&RawColumn::new("a", "text").with_key(KeyRole::Multiple)));
    assert!(!can_obfuscate(&primary_key_column("a", "int")));
}
