//! DynamoDB integration tests against DynamoDB Local.
//!
//! These tests require Docker to be running. Run with `--ignored`.

use std::time::Duration;

use serde_json::json;
use testcontainers::core::IntoContainerPort;
use testcontainers::{ContainerAsync, GenericImage, runners::AsyncRunner};

use jobapp_backend::domain::{
    AppError, BackendKind, CREATED_AT_FIELD, Condition, DatabaseClient, FilterOp, FilterQuery,
    QueryExpr, Record, UPDATED_AT_FIELD,
};
use jobapp_backend::infra::{DatabaseConfig, DynamoDbClient};

const TABLE: &str = "users";

async fn setup_dynamodb() -> (DynamoDbClient, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("amazon/dynamodb-local", "latest")
        .with_exposed_port(8000.tcp())
        .start()
        .await
        .expect("Failed to start DynamoDB Local container");

    let port = container
        .get_host_port_ipv4(8000)
        .await
        .expect("Failed to get DynamoDB Local port");

    let config = DatabaseConfig::managed("us-east-1", Some(format!("http://127.0.0.1:{port}")))
        .with_static_credentials("local", "local");
    let client = DynamoDbClient::new(&config);

    let mut attempts = 0;
    loop {
        attempts += 1;
        match client.connect().await {
            Ok(()) => break,
            Err(_) if attempts < 30 => {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Err(e) => panic!("Failed to connect to DynamoDB Local after 30 attempts: {e:?}"),
        }
    }

    client.ensure_table(TABLE).await.expect("Failed to create table");
    (client, container)
}

fn user(email: &str, name: &str) -> Record {
    Record::new().with("email", email).with("name", name)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_create_and_get_round_trip() {
    let (client, _container) = setup_dynamodb().await;
    assert_eq!(client.backend(), BackendKind::Managed);

    let record = user("a@b.com", "A").with("skills", json!(["rust", "sql"]));
    let created = client.create(TABLE, record).await.unwrap();
    let id = created.id().expect("id assigned").to_string();
    assert_eq!(created.get(CREATED_AT_FIELD), created.get(UPDATED_AT_FIELD));

    let fetched = client.get(TABLE, &id).await.unwrap().expect("item stored");
    assert_eq!(fetched, created);
    assert!(client.get(TABLE, "missing").await.unwrap().is_none());
    assert!(client.get(TABLE, "").await.unwrap().is_none());
    client.delete(TABLE, "").await.unwrap();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_update_merges_and_missing_is_not_found() {
    let (client, _container) = setup_dynamodb().await;

    let created = client.create(TABLE, user("a@b.com", "A")).await.unwrap();
    let id = created.id().unwrap().to_string();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let updated = client
        .update(TABLE, &id, Record::new().with("name", "B"))
        .await
        .unwrap();
    assert_eq!(updated.get("name"), Some(&json!("B")));
    assert_eq!(updated.get("email"), Some(&json!("a@b.com")));
    assert_eq!(updated.get(CREATED_AT_FIELD), created.get(CREATED_AT_FIELD));
    assert_ne!(updated.get(UPDATED_AT_FIELD), created.get(UPDATED_AT_FIELD));

    let err = client
        .update(TABLE, "missing", Record::new().with("name", "B"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_delete_is_idempotent() {
    let (client, _container) = setup_dynamodb().await;

    let created = client.create(TABLE, user("a@b.com", "A")).await.unwrap();
    let id = created.id().unwrap().to_string();

    client.delete(TABLE, &id).await.unwrap();
    client.delete(TABLE, &id).await.unwrap();
    assert!(client.get(TABLE, &id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_scan_filters_and_rejects_raw_sql() {
    let (client, _container) = setup_dynamodb().await;

    assert!(client.query(&QueryExpr::table(TABLE)).await.unwrap().is_empty());

    for (email, name, age) in [("a@x.com", "A", 20), ("b@y.com", "B", 30), ("c@x.com", "C", 40)] {
        client
            .create(TABLE, user(email, name).with("age", age))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    // Scans come back in creation order regardless of partition layout
    let all = client.query(&QueryExpr::table(TABLE)).await.unwrap();
    let names: Vec<_> = all.iter().filter_map(|r| r.get("name")).collect();
    assert_eq!(names, vec![&json!("A"), &json!("B"), &json!("C")]);

    let query = FilterQuery::new(TABLE)
        .filter(Condition::contains("email", "@x."))
        .filter(Condition::new("age", FilterOp::Gt, 25));
    let rows = client.query(&query.into()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&json!("C")));

    let limited = client
        .query(&FilterQuery::new(TABLE).limit(2).into())
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].get("name"), Some(&json!("A")));

    let err = client
        .query(&QueryExpr::raw("SELECT * FROM users", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotSupported(_)));
}
