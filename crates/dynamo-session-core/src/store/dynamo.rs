use std::collections::HashMap;
use std::future::Future;

use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
    ScalarAttributeType, TimeToLiveSpecification,
};
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::error::StoreError;
use crate::session::record::SessionRecord;

use super::SessionStore;

const ATTR_ID: &str = "id";
const ATTR_DATA: &str = "data";
const ATTR_CREATED: &str = "created";
const ATTR_ACCESSED: &str = "accessed";
const ATTR_IDLE_TIMEOUT: &str = "idle_timeout";
const ATTR_ABSOLUTE_TIMEOUT: &str = "absolute_timeout";
const ATTR_EXPIRES: &str = "expires";

/// DynamoDB-based session store.
///
/// One item per session, hash key `id` (string). The API is synchronous; the
/// AWS SDK runs on a private current-thread runtime owned by the store.
pub struct DynamoSessionStore {
    client: Client,
    table_name: String,
    runtime: StoreRuntime,
}

impl DynamoSessionStore {
    pub fn new(client: Client, table_name: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self {
            client,
            table_name: table_name.into(),
            runtime: build_runtime()?,
        })
    }

    /// Build a client from the ambient AWS configuration, overridden by the
    /// endpoint and region in `config`.
    pub fn from_config(config: &SessionConfig) -> Result<Self, StoreError> {
        let runtime = build_runtime()?;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region_name {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = run_blocking(runtime.get()?, loader.load())?;

        Ok(Self {
            client: Client::new(&sdk_config),
            table_name: config.table_name.clone(),
            runtime,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Create the session table and enable TTL on the `expires` attribute.
    pub fn create_table(&self) -> Result<(), StoreError> {
        let attribute = AttributeDefinition::builder()
            .attribute_name(ATTR_ID)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let key = KeySchemaElement::builder()
            .attribute_name(ATTR_ID)
            .key_type(KeyType::Hash)
            .build()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let ttl = TimeToLiveSpecification::builder()
            .attribute_name(ATTR_EXPIRES)
            .enabled(true)
            .build()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let client = &self.client;
        let table = self.table_name.as_str();
        self.block_on(async move {
            client
                .create_table()
                .table_name(table)
                .attribute_definitions(attribute)
                .key_schema(key)
                .billing_mode(BillingMode::PayPerRequest)
                .send()
                .await
                .map_err(|e| StoreError::Backend(DisplayErrorContext(&e).to_string()))?;

            client
                .update_time_to_live()
                .table_name(table)
                .time_to_live_specification(ttl)
                .send()
                .await
                .map_err(|e| StoreError::Backend(DisplayErrorContext(&e).to_string()))?;

            Ok::<(), StoreError>(())
        })??;

        info!("Created session table {}", self.table_name);
        Ok(())
    }

    fn block_on<F>(&self, fut: F) -> Result<F::Output, StoreError>
    where
        F: Future + Send,
        F::Output: Send,
    {
        run_blocking(self.runtime.get()?, fut)
    }
}

impl SessionStore for DynamoSessionStore {
    fn get(&self, key: &str) -> Result<Option<SessionRecord>, StoreError> {
        let client = &self.client;
        let table = self.table_name.as_str();
        let output = self.block_on(async move {
            client
                .get_item()
                .table_name(table)
                .key(ATTR_ID, AttributeValue::S(key.to_string()))
                .consistent_read(true)
                .send()
                .await
        })?
        .map_err(|e| StoreError::Backend(DisplayErrorContext(&e).to_string()))?;

        match output.item {
            Some(item) => item_to_record(key, &item).map(Some),
            None => {
                debug!("No session item in {}", self.table_name);
                Ok(None)
            }
        }
    }

    fn put(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let client = &self.client;
        let table = self.table_name.as_str();
        let item = record_to_item(record);
        self.block_on(async move {
            client
                .put_item()
                .table_name(table)
                .set_item(Some(item))
                .send()
                .await
        })?
        .map_err(|e| StoreError::Backend(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    fn touch(&self, key: &str, accessed: DateTime<Utc>, expires: i64) -> Result<(), StoreError> {
        let client = &self.client;
        let table = self.table_name.as_str();
        let result = self.block_on(async move {
            client
                .update_item()
                .table_name(table)
                .key(ATTR_ID, AttributeValue::S(key.to_string()))
                .update_expression("SET #accessed = :accessed, #expires = :expires")
                .condition_expression("attribute_exists(#id)")
                .expression_attribute_names("#id", ATTR_ID)
                .expression_attribute_names("#accessed", ATTR_ACCESSED)
                .expression_attribute_names("#expires", ATTR_EXPIRES)
                .expression_attribute_values(":accessed", AttributeValue::S(format_time(&accessed)))
                .expression_attribute_values(":expires", AttributeValue::N(expires.to_string()))
                .send()
                .await
        })?;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                debug!("Skipped touch of a session item that no longer exists");
                Ok(())
            }
            Err(e) => Err(StoreError::Backend(DisplayErrorContext(&e).to_string())),
        }
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let client = &self.client;
        let table = self.table_name.as_str();
        self.block_on(async move {
            client
                .delete_item()
                .table_name(table)
                .key(ATTR_ID, AttributeValue::S(key.to_string()))
                .send()
                .await
        })?
        .map_err(|e| StoreError::Backend(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}

/// A private runtime that can be dropped from inside another runtime.
struct StoreRuntime(Option<Runtime>);

impl StoreRuntime {
    fn get(&self) -> Result<&Runtime, StoreError> {
        self.0
            .as_ref()
            .ok_or_else(|| StoreError::Runtime("store runtime is shut down".to_string()))
    }
}

impl Drop for StoreRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

fn build_runtime() -> Result<StoreRuntime, StoreError> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map(|rt| StoreRuntime(Some(rt)))
        .map_err(|e| StoreError::Runtime(e.to_string()))
}

/// Drive `fut` to completion on `runtime`.
///
/// Inside another tokio runtime, `block_on` would panic, so the call is moved
/// to a scoped helper thread instead.
fn run_blocking<F>(runtime: &Runtime, fut: F) -> Result<F::Output, StoreError>
where
    F: Future + Send,
    F::Output: Send,
{
    if Handle::try_current().is_ok() {
        std::thread::scope(|s| s.spawn(move || runtime.block_on(fut)).join())
            .map_err(|_| StoreError::Runtime("DynamoDB worker thread panicked".to_string()))
    } else {
        Ok(runtime.block_on(fut))
    }
}

fn format_time(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn record_to_item(record: &SessionRecord) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert(ATTR_ID.to_string(), AttributeValue::S(record.id.clone()));
    item.insert(ATTR_DATA.to_string(), AttributeValue::S(record.data.clone()));
    item.insert(
        ATTR_CREATED.to_string(),
        AttributeValue::S(format_time(&record.created)),
    );
    item.insert(
        ATTR_ACCESSED.to_string(),
        AttributeValue::S(format_time(&record.accessed)),
    );
    item.insert(
        ATTR_IDLE_TIMEOUT.to_string(),
        AttributeValue::N(record.idle_timeout.to_string()),
    );
    item.insert(
        ATTR_ABSOLUTE_TIMEOUT.to_string(),
        AttributeValue::N(record.absolute_timeout.to_string()),
    );
    item.insert(
        ATTR_EXPIRES.to_string(),
        AttributeValue::N(record.expires.to_string()),
    );
    item
}

fn item_to_record(
    key: &str,
    item: &HashMap<String, AttributeValue>,
) -> Result<SessionRecord, StoreError> {
    let data = string_attr(item, ATTR_DATA)?;
    let created = time_attr(item, ATTR_CREATED)?;
    let accessed = time_attr(item, ATTR_ACCESSED)?;
    let idle_timeout = number_attr(item, ATTR_IDLE_TIMEOUT)?;
    let absolute_timeout = number_attr(item, ATTR_ABSOLUTE_TIMEOUT)?;

    Ok(SessionRecord::new(
        key,
        data,
        created,
        accessed,
        idle_timeout,
        absolute_timeout,
    ))
}

fn string_attr<'a>(
    item: &'a HashMap<String, AttributeValue>,
    name: &str,
) -> Result<&'a str, StoreError> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .map(String::as_str)
        .ok_or_else(|| StoreError::Corrupt(format!("missing string attribute '{name}'")))
}

fn time_attr(
    item: &HashMap<String, AttributeValue>,
    name: &str,
) -> Result<DateTime<Utc>, StoreError> {
    let raw = string_attr(item, name)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("attribute '{name}': {e}")))
}

fn number_attr(item: &HashMap<String, AttributeValue>, name: &str) -> Result<u64, StoreError> {
    let raw = item
        .get(name)
        .and_then(|v| v.as_n().ok())
        .ok_or_else(|| StoreError::Corrupt(format!("missing number attribute '{name}'")))?;
    match raw.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(StoreError::Corrupt(format!(
            "attribute '{name}' is not a positive integer: {raw}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> SessionRecord {
        let created = Utc.with_ymd_and_hms(2020, 3, 11, 0, 0, 0).unwrap();
        let accessed = Utc.with_ymd_and_hms(2020, 3, 11, 1, 0, 0).unwrap();
        SessionRecord::new("abc", r#"{"foo":"bar"}"#, created, accessed, 7200, 43200)
    }

    #[test]
    fn test_item_roundtrip() {
        let rec = record();
        let item = record_to_item(&rec);
        assert_eq!(item.get(ATTR_ID).unwrap().as_s().unwrap(), "abc");
        assert_eq!(item.get(ATTR_IDLE_TIMEOUT).unwrap().as_n().unwrap(), "7200");
        assert_eq!(
            item.get(ATTR_EXPIRES).unwrap().as_n().unwrap(),
            &rec.expires.to_string()
        );

        let parsed = item_to_record("abc", &item).unwrap();
        assert_eq!(parsed, rec);
    }

    #[test]
    fn test_missing_attribute_is_corrupt() {
        let mut item = record_to_item(&record());
        item.remove(ATTR_CREATED);
        assert!(matches!(
            item_to_record("abc", &item),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_bad_timeout_is_corrupt() {
        let mut item = record_to_item(&record());
        item.insert(ATTR_IDLE_TIMEOUT.to_string(), AttributeValue::N("0".into()));
        assert!(matches!(
            item_to_record("abc", &item),
            Err(StoreError::Corrupt(_))
        ));

        item.insert(ATTR_IDLE_TIMEOUT.to_string(), AttributeValue::S("7200".into()));
        assert!(item_to_record("abc", &item).is_err());
    }

    #[test]
    fn test_bad_timestamp_is_corrupt() {
        let mut item = record_to_item(&record());
        item.insert(ATTR_ACCESSED.to_string(), AttributeValue::S("yesterday".into()));
        assert!(matches!(
            item_to_record("abc", &item),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_run_blocking_outside_runtime() {
        let runtime = build_runtime().unwrap();
        let value = run_blocking(runtime.get().unwrap(), async { 21 * 2 }).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_run_blocking_inside_runtime() {
        let outer = build_runtime().unwrap();
        let inner = build_runtime().unwrap();
        let value = outer
            .get()
            .unwrap()
            .block_on(async { run_blocking(inner.get().unwrap(), async { 7 }).unwrap() });
        assert_eq!(value, 7);
    }

    #[test]
    fn test_store_runtime_drops_inside_async_context() {
        let outer = build_runtime().unwrap();
        outer.get().unwrap().block_on(async {
            let inner = build_runtime().unwrap();
            drop(inner);
        });
    }

    #[test]
    fn test_shut_down_runtime_is_an_error() {
        let runtime = StoreRuntime(None);
        assert!(matches!(runtime.get(), Err(StoreError::Runtime(_))));
    }

    #[test]
    fn test_item_times_keep_microseconds() {
        let created = Utc.with_ymd_and_hms(2020, 3, 11, 0, 0, 0).unwrap()
            + chrono::Duration::microseconds(123_456);
        let rec = SessionRecord::new("abc", "{}", created, created, 7200, 43200);
        let parsed = item_to_record("abc", &record_to_item(&rec)).unwrap();
        assert_eq!(parsed.created, created);
        assert_eq!(parsed.accessed, created);
    }
}
