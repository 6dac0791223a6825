//! DynamoDB database client implementation.
//!
//! Items are addressed by a string partition key named `id`. DynamoDB has no
//! relational predicates, so `query` only honors [`QueryExpr::Filter`],
//! evaluated as a paginated `Scan` with a `FilterExpression`. Raw SQL is
//! rejected with `AppError::NotSupported`.
//!
//! The SDK client is cheap to clone and safe to use from concurrent tasks.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::Credentials;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType, ReturnValue,
    ScalarAttributeType,
};
use secrecy::ExposeSecret;
use serde_json::{Map, Number, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use super::config::DatabaseConfig;
use crate::domain::{
    AppError, BackendKind, Condition, DatabaseClient, DatabaseError, FilterOp, FilterQuery,
    ID_FIELD, QueryExpr, Record,
};

type Item = HashMap<String, AttributeValue>;

/// Placeholder bound to the partition key name in condition expressions.
const KEY_PLACEHOLDER: &str = "#pk";

/// DynamoDB's size limit for a partition key value.
const MAX_KEY_BYTES: usize = 2048;

/// Error codes meaning the request never reached an authorized session.
const CONNECTION_ERROR_CODES: &[&str] = &[
    "UnrecognizedClientException",
    "InvalidSignatureException",
    "MissingAuthenticationTokenException",
    "ExpiredTokenException",
    "AccessDeniedException",
];

/// DynamoDB database client
pub struct DynamoDbClient {
    region: Option<String>,
    endpoint: Option<String>,
    credentials: Option<Credentials>,
    client: RwLock<Option<Client>>,
}

impl DynamoDbClient {
    /// Create an unconnected client from the managed-store part of `config`.
    ///
    /// Without a region or static credentials the default AWS provider
    /// chains are used when connecting.
    pub fn new(config: &DatabaseConfig) -> Self {
        let credentials = match (&config.access_key_id, &config.secret_access_key) {
            (Some(key_id), Some(secret)) => Some(Credentials::new(
                key_id.clone(),
                secret.expose_secret().to_string(),
                None,
                None,
                "jobapp-static",
            )),
            _ => None,
        };

        Self {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
            credentials,
            client: RwLock::new(None),
        }
    }

    async fn client(&self) -> Result<Client, AppError> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| DatabaseError::not_connected("dynamodb").into())
    }

    /// Create `table` keyed by `id` when it does not exist yet.
    ///
    /// Meant for local emulators and tests; provisioned environments manage
    /// their tables outside the application.
    pub async fn ensure_table(&self, table: &str) -> Result<(), AppError> {
        let client = self.client().await?;

        match client.describe_table().table_name(table).send().await {
            Ok(_) => return Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) => {}
            Err(err) => return Err(map_sdk_error(err, "DescribeTable").into()),
        }

        info!(table = %table, "Creating DynamoDB table");
        let key_schema = KeySchemaElement::builder()
            .attribute_name(ID_FIELD)
            .key_type(KeyType::Hash)
            .build()
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let key_definition = AttributeDefinition::builder()
            .attribute_name(ID_FIELD)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|e| AppError::Internal(e.to_string()))?;

        client
            .create_table()
            .table_name(table)
            .key_schema(key_schema)
            .attribute_definitions(key_definition)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, "CreateTable"))?;
        Ok(())
    }

    async fn scan(&self, query: &FilterQuery) -> Result<Vec<Record>, AppError> {
        let client = self.client().await?;
        let filter = filter_expression(&query.conditions);
        let mut records = Vec::new();
        let mut start_key: Option<Item> = None;

        if query.limit == Some(0) {
            return Ok(records);
        }

        // Scan order follows partitions, so every match is read before ordering.

        loop {
            let mut request = client
                .scan()
                .table_name(&query.table)
                .set_exclusive_start_key(start_key.take());
            if let Some(expression) = &filter {
                request = request
                    .filter_expression(&expression.text)
                    .set_expression_attribute_names(Some(expression.names.clone()))
                    .set_expression_attribute_values(Some(expression.values.clone()));
            }

            let output = request
                .send()
                .await
                .map_err(|e| map_sdk_error(e, "Scan"))?;

            for item in output.items() {
                records.push(item_to_record(item)?);
            }

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
            debug!(fetched = records.len(), "Continuing paginated scan");
        }

        Ok(query.order_and_limit(records))
    }
}

#[async_trait]
impl DatabaseClient for DynamoDbClient {
    fn backend(&self) -> BackendKind {
        BackendKind::Managed
    }

    #[instrument(skip(self))]
    async fn connect(&self) -> Result<(), AppError> {
        let mut guard = self.client.write().await;
        if guard.is_some() {
            return Ok(());
        }

        info!(
            region = ?self.region,
            endpoint = ?self.endpoint,
            "Connecting to DynamoDB..."
        );
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &self.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let Some(credentials) = &self.credentials {
            loader = loader.credentials_provider(credentials.clone());
        }
        let client = Client::new(&loader.load().await);

        // The SDK connects lazily; a cheap call surfaces bad endpoints and credentials now.
        client
            .list_tables()
            .limit(1)
            .send()
            .await
            .map_err(|e| DatabaseError::connection(DisplayErrorContext(&e).to_string()).with_source(e))?;

        *guard = Some(client);
        info!("Connected to DynamoDB");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn disconnect(&self) -> Result<(), AppError> {
        if self.client.write().await.take().is_some() {
            info!("Disconnected from DynamoDB");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let client = self.client().await?;
        client
            .list_tables()
            .limit(1)
            .send()
            .await
            .map_err(|e| DatabaseError::connection(DisplayErrorContext(&e).to_string()).with_source(e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn query(&self, query: &QueryExpr) -> Result<Vec<Record>, AppError> {
        match query {
            QueryExpr::Filter(filter) => self.scan(filter).await,
            QueryExpr::Raw { .. } => Err(AppError::NotSupported(
                "raw SQL queries are not supported by the DynamoDB backend".to_string(),
            )),
        }
    }

    #[instrument(skip(self, record))]
    async fn create(&self, table: &str, record: Record) -> Result<Record, AppError> {
        let client = self.client().await?;
        let record = record.prepare_new();

        client
            .put_item()
            .table_name(table)
            .set_item(Some(record_to_item(&record)))
            .condition_expression(format!("attribute_not_exists({KEY_PLACEHOLDER})"))
            .expression_attribute_names(KEY_PLACEHOLDER, ID_FIELD)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, "PutItem"))?;

        info!(id = ?record.id(), "Record created");
        Ok(record)
    }

    #[instrument(skip(self, changes))]
    async fn update(&self, table: &str, id: &str, changes: Record) -> Result<Record, AppError> {
        let client = self.client().await?;
        if !is_storable_key(id) {
            return Err(DatabaseError::NotFound(format!("{table}/{id}")).into());
        }
        let expression = update_expression(&changes.prepare_changes());

        let output = client
            .update_item()
            .table_name(table)
            .key(ID_FIELD, AttributeValue::S(id.to_string()))
            .update_expression(expression.text)
            .set_expression_attribute_names(Some(expression.names))
            .set_expression_attribute_values(Some(expression.values))
            .condition_expression(format!("attribute_exists({KEY_PLACEHOLDER})"))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception())
                {
                    DatabaseError::NotFound(format!("{table}/{id}"))
                } else {
                    map_sdk_error(err, "UpdateItem")
                }
            })?;

        let item = output.attributes().ok_or_else(|| {
            DatabaseError::query("UpdateItem returned no attributes")
        })?;
        Ok(item_to_record(item)?)
    }

    #[instrument(skip(self))]
    async fn delete(&self, table: &str, id: &str) -> Result<(), AppError> {
        let client = self.client().await?;
        if !is_storable_key(id) {
            debug!(id_bytes = id.len(), "Nothing to delete for an unstorable key");
            return Ok(());
        }
        client
            .delete_item()
            .table_name(table)
            .key(ID_FIELD, AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, "DeleteItem"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>, AppError> {
        let client = self.client().await?;
        if !is_storable_key(id) {
            return Ok(None);
        }
        let output = client
            .get_item()
            .table_name(table)
            .key(ID_FIELD, AttributeValue::S(id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, "GetItem"))?;

        Ok(output.item().map(item_to_record).transpose()?)
    }
}

/// Empty ids and ids over the key size limit can never name a stored item.
fn is_storable_key(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_KEY_BYTES
}

/// Translates an SDK failure into the storage error taxonomy, keeping the
/// SDK error as the source of connection and query failures.
fn map_sdk_error<E, R>(err: SdkError<E, R>, operation: &str) -> DatabaseError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let message = format!("{operation}: {}", DisplayErrorContext(&err));
    let mapped = match &err {
        SdkError::DispatchFailure(_)
        | SdkError::TimeoutError(_)
        | SdkError::ConstructionFailure(_) => DatabaseError::connection(message),
        _ => match err.code() {
            Some(code) if CONNECTION_ERROR_CODES.contains(&code) => {
                DatabaseError::connection(message)
            }
            Some("ValidationException" | "ConditionalCheckFailedException") => {
                DatabaseError::Validation(message)
            }
            _ => DatabaseError::query(message),
        },
    };
    mapped.with_source(err)
}

/// An expression string with its name and value placeholders.
#[derive(Debug, Clone, PartialEq)]
struct Expression {
    text: String,
    names: HashMap<String, String>,
    values: Item,
}

/// `SET #f0 = :v0, ...` over every field of `changes`, plus the key
/// placeholder used by the existence condition.
fn update_expression(changes: &Record) -> Expression {
    let mut names = HashMap::from([(KEY_PLACEHOLDER.to_string(), ID_FIELD.to_string())]);
    let mut values = HashMap::new();
    let mut assignments = Vec::with_capacity(changes.len());

    for (i, (field, value)) in changes.fields().enumerate() {
        let name = format!("#f{i}");
        let placeholder = format!(":v{i}");
        assignments.push(format!("{name} = {placeholder}"));
        names.insert(name, field.clone());
        values.insert(placeholder, to_attribute(value));
    }

    Expression {
        text: format!("SET {}", assignments.join(", ")),
        names,
        values,
    }
}

/// ANDed filter over `conditions`; `None` when there is nothing to filter.
fn filter_expression(conditions: &[Condition]) -> Option<Expression> {
    if conditions.is_empty() {
        return None;
    }

    let mut names = HashMap::new();
    let mut values = HashMap::new();
    let mut clauses = Vec::with_capacity(conditions.len());

    for (i, condition) in conditions.iter().enumerate() {
        let name = format!("#c{i}");
        let placeholder = format!(":c{i}");
        let clause = match condition.op {
            FilterOp::Eq => format!("{name} = {placeholder}"),
            // A missing attribute never matches, mirroring the other backends
            FilterOp::Ne => format!("(attribute_exists({name}) AND {name} <> {placeholder})"),
            FilterOp::Lt => format!("{name} < {placeholder}"),
            FilterOp::Lte => format!("{name} <= {placeholder}"),
            FilterOp::Gt => format!("{name} > {placeholder}"),
            FilterOp::Gte => format!("{name} >= {placeholder}"),
            FilterOp::Contains => format!("contains({name}, {placeholder})"),
        };
        clauses.push(clause);
        names.insert(name, condition.field.clone());
        values.insert(placeholder, to_attribute(&condition.value));
    }

    Some(Expression {
        text: clauses.join(" AND "),
        names,
        values,
    })
}

fn record_to_item(record: &Record) -> Item {
    record
        .fields()
        .map(|(field, value)| (field.clone(), to_attribute(value)))
        .collect()
}

fn item_to_record(item: &Item) -> Result<Record, DatabaseError> {
    item.iter()
        .map(|(field, attr)| Ok((field.clone(), from_attribute(attr)?)))
        .collect()
}

fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attribute(v)))
                .collect(),
        ),
    }
}

fn from_attribute(attr: &AttributeValue) -> Result<Value, DatabaseError> {
    let value = match attr {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::N(n) => parse_number(n)?,
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::L(items) => Value::Array(
            items
                .iter()
                .map(from_attribute)
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), from_attribute(v)?)))
                .collect::<Result<Map<_, _>, DatabaseError>>()?,
        ),
        AttributeValue::Ss(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(items) => Value::Array(
            items
                .iter()
                .map(|n| parse_number(n))
                .collect::<Result<_, _>>()?,
        ),
        _ => {
            return Err(DatabaseError::query(
                "binary and unknown attribute types are not supported",
            ));
        }
    };
    Ok(value)
}

fn parse_number(raw: &str) -> Result<Value, DatabaseError> {
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Value::from(i));
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Ok(Value::from(u));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| DatabaseError::query(format!("invalid number attribute '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_conversion_preserves_json_shape() {
        let value = json!({
            "name": "A",
            "age": 31,
            "score": 4.5,
            "active": true,
            "manager": null,
            "skills": ["rust", "sql"],
            "address": {"city": "Oslo", "zip": 150}
        });
        let record = Record::try_from(value.clone()).unwrap();

        let item = record_to_item(&record);
        assert_eq!(item["name"], AttributeValue::S("A".to_string()));
        assert_eq!(item["age"], AttributeValue::N("31".to_string()));
        assert_eq!(item["manager"], AttributeValue::Null(true));

        let back = item_to_record(&item).unwrap();
        assert_eq!(Value::from(back), value);
    }

    #[test]
    fn test_string_and_number_sets_read_as_arrays() {
        let item: Item = HashMap::from([
            (
                "tags".to_string(),
                AttributeValue::Ss(vec!["a".to_string(), "b".to_string()]),
            ),
            (
                "ids".to_string(),
                AttributeValue::Ns(vec!["1".to_string(), "2.5".to_string()]),
            ),
        ]);
        let record = item_to_record(&item).unwrap();
        assert_eq!(record.get("tags"), Some(&json!(["a", "b"])));
        assert_eq!(record.get("ids"), Some(&json!([1, 2.5])));
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        assert!(matches!(parse_number("abc"), Err(DatabaseError::Query { .. })));
        assert_eq!(parse_number("18446744073709551615").unwrap(), json!(u64::MAX));
    }

    #[test]
    fn test_update_expression_sets_every_field() {
        let changes = Record::new().with("name", "B").with("email", "b@c.com");
        let expression = update_expression(&changes);

        assert!(expression.text.starts_with("SET "));
        assert_eq!(expression.text.matches(" = :v").count(), 2);
        assert_eq!(expression.names[KEY_PLACEHOLDER], "id");
        assert_eq!(expression.names.len(), 3);
        assert_eq!(expression.values.len(), 2);

        let name_placeholder = expression
            .names
            .iter()
            .find(|(_, field)| field.as_str() == "name")
            .map(|(placeholder, _)| placeholder.clone())
            .unwrap();
        let value_placeholder = name_placeholder.replace("#f", ":v");
        assert_eq!(
            expression.values[&value_placeholder],
            AttributeValue::S("B".to_string())
        );
    }

    #[test]
    fn test_filter_expression() {
        assert!(filter_expression(&[]).is_none());

        let conditions = vec![
            Condition::eq("email", "a@b.com"),
            Condition::new("age", FilterOp::Ne, 3),
            Condition::contains("skills", "rust"),
        ];
        let expression = filter_expression(&conditions).unwrap();

        assert_eq!(
            expression.text,
            "#c0 = :c0 AND (attribute_exists(#c1) AND #c1 <> :c1) AND contains(#c2, :c2)"
        );
        assert_eq!(expression.names["#c2"], "skills");
        assert_eq!(expression.values[":c1"], AttributeValue::N("3".to_string()));
    }

    #[test]
    fn test_backend_and_capabilities() {
        let client = DynamoDbClient::new(&DatabaseConfig::managed("us-east-1", None));
        assert_eq!(client.backend(), BackendKind::Managed);
        assert!(!client.capabilities().raw_sql);
    }

    #[test]
    fn test_static_credentials_require_both_keys() {
        let mut config = DatabaseConfig::managed("us-east-1", None);
        config.access_key_id = Some("AKID".to_string());
        assert!(DynamoDbClient::new(&config).credentials.is_none());

        let config = config.with_static_credentials("AKID", "secret");
        assert!(DynamoDbClient::new(&config).credentials.is_some());
    }

    #[tokio::test]
    async fn test_raw_queries_are_not_supported() {
        let client = DynamoDbClient::new(&DatabaseConfig::default());
        let err = client
            .query(&QueryExpr::raw("SELECT * FROM users", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotSupported(_)));
    }

    #[tokio::test]
    async fn test_operations_before_connect_fail_with_connection_error() {
        let client = DynamoDbClient::new(&DatabaseConfig::default());

        let err = client.get("users", "1").await.unwrap_err();
        assert!(matches!(err, AppError::Database(DatabaseError::Connection { .. })));

        let err = client.delete("users", "1").await.unwrap_err();
        assert!(matches!(err, AppError::Database(DatabaseError::Connection { .. })));

        let err = client.query(&QueryExpr::table("users")).await.unwrap_err();
        assert!(matches!(err, AppError::Database(DatabaseError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_disconnect_without_connect_is_noop() {
        let client = DynamoDbClient::new(&DatabaseConfig::default());
        assert!(client.disconnect().await.is_ok());
    }

    /// A connected client whose endpoint accepts nothing, so any request
    /// that reaches the SDK fails with a connection error.
    async fn unreachable_client() -> DynamoDbClient {
        let client = DynamoDbClient::new(&DatabaseConfig::managed("us-east-1", None));
        let sdk_config = aws_sdk_dynamodb::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url("http://127.0.0.1:9")
            .credentials_provider(Credentials::new("test", "test", None, None, "test"))
            .build();
        *client.client.write().await = Some(Client::from_conf(sdk_config));
        client
    }

    #[test]
    fn test_storable_key_bounds() {
        assert!(is_storable_key("a"));
        assert!(is_storable_key(&"x".repeat(MAX_KEY_BYTES)));
        assert!(!is_storable_key(""));
        assert!(!is_storable_key(&"x".repeat(MAX_KEY_BYTES + 1)));
        // The limit counts bytes, not characters
        assert!(!is_storable_key(&"é".repeat(MAX_KEY_BYTES / 2 + 1)));
    }

    #[tokio::test]
    async fn test_get_unstorable_key_is_none() {
        let client = unreachable_client().await;
        assert!(client.get("users", "").await.unwrap().is_none());
        assert!(
            client
                .get("users", &"x".repeat(MAX_KEY_BYTES + 1))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_delete_unstorable_key_succeeds() {
        let client = unreachable_client().await;
        client.delete("users", "").await.unwrap();
        client
            .delete("users", &"x".repeat(MAX_KEY_BYTES + 1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_unstorable_key_is_not_found() {
        let client = unreachable_client().await;
        let changes = Record::new().with("name", "B");

        let err = client.update("users", "", changes.clone()).await.unwrap_err();
        assert!(err.is_not_found());

        let err = client
            .update("users", &"x".repeat(MAX_KEY_BYTES + 1), changes)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_sdk_errors_keep_their_source() {
        use aws_sdk_dynamodb::config::http::HttpResponse;
        use aws_sdk_dynamodb::operation::get_item::GetItemError;
        use std::error::Error as _;

        let err: SdkError<GetItemError, HttpResponse> =
            SdkError::construction_failure("request could not be built");
        let mapped = map_sdk_error(err, "GetItem");

        assert!(matches!(mapped, DatabaseError::Connection { .. }));
        assert!(mapped.to_string().contains("GetItem"));
        assert!(mapped.source().is_some());
    }
}
