//! Update cross-check
//!
//! An update notification and a pull query taken shortly after it should
//! describe the same state. How far the query may lag the update is the
//! configured staleness window; fields that drift on their own (playback
//! position) are excluded from the comparison by JSON pointer.

use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use wpc_common::{Error, Notification, QueryResult, Result};

use crate::client::Client;

impl Client {
    /// Confirm that a pull query observes the state carried by `update`
    ///
    /// Waits `settle_ms`, then queries the update's domains with the
    /// subscription projection until the comparable parts match or
    /// `staleness_ms` elapses. Returns the matching query result.
    pub async fn confirm_update(&self, update: &Notification) -> Result<QueryResult> {
        let payload = update.payload().ok_or_else(|| {
            Error::Inconsistent("event notifications carry no payload to confirm".to_string())
        })?;

        let consistency = &self.config().consistency;
        let spec = self.config().updates.query_spec(update.domains());
        let expected = comparable(payload, &consistency.volatile_fields)?;

        sleep(consistency.settle()).await;
        let deadline = Instant::now() + consistency.staleness();
        let retry_interval = self.config().poll.interval();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let current = self.query(&spec).await?;
            let observed = comparable(&current, &consistency.volatile_fields)?;
            let difference = match first_difference(&expected, &observed, String::new()) {
                None => {
                    debug!(attempts, domains = %update.domains(), "Update confirmed by query");
                    return Ok(current);
                }
                Some(pointer) => pointer,
            };

            if Instant::now() >= deadline {
                warn!(attempts, pointer = %difference, "Update not observed within staleness window");
                return Err(Error::Inconsistent(format!(
                    "query still differs from update at '{}' after {:?} ({} queries)",
                    difference,
                    consistency.staleness(),
                    attempts
                )));
            }
            sleep(retry_interval.min(deadline.saturating_duration_since(Instant::now()))).await;
        }
    }
}

/// JSON form of `result` with every volatile pointer removed
fn comparable(result: &QueryResult, volatile_fields: &[String]) -> Result<Value> {
    let mut value = serde_json::to_value(result)
        .map_err(|e| Error::Inconsistent(format!("result is not comparable: {}", e)))?;
    for pointer in volatile_fields {
        strip_pointer(&mut value, pointer);
    }
    Ok(value)
}

/// Remove the member or element addressed by an RFC 6901 pointer, if present
fn strip_pointer(value: &mut Value, pointer: &str) {
    let Some((parent, last)) = pointer.rsplit_once('/') else {
        return;
    };
    let key = last.replace("~1", "/").replace("~0", "~");

    match value.pointer_mut(parent) {
        Some(Value::Object(map)) => {
            map.remove(&key);
        }
        Some(Value::Array(items)) => {
            if let Ok(index) = key.parse::<usize>() {
                if index < items.len() {
                    items.remove(index);
                }
            }
        }
        _ => {}
    }
}

/// `path` extended by one member name, escaped per RFC 6901
fn child_pointer(path: &str, key: &str) -> String {
    format!("{}/{}", path, key.replace('~', "~0").replace('/', "~1"))
}

/// Pointer to the first location where `a` and `b` differ
fn first_difference(a: &Value, b: &Value, path: String) -> Option<String> {
    match (a, b) {
        (Value::Object(left), Value::Object(right)) => {
            for (key, lv) in left {
                let child = child_pointer(&path, key);
                match right.get(key) {
                    Some(rv) => {
                        if let Some(found) = first_difference(lv, rv, child) {
                            return Some(found);
                        }
                    }
                    None => return Some(child),
                }
            }
            right
                .keys()
                .find(|key| !left.contains_key(*key))
                .map(|key| child_pointer(&path, key))
        }
        (Value::Array(left), Value::Array(right)) => {
            if left.len() != right.len() {
                return Some(path);
            }
            left.iter()
                .zip(right)
                .enumerate()
                .find_map(|(i, (lv, rv))| first_difference(lv, rv, format!("{}/{}", path, i)))
        }
        _ if a == b => None,
        _ => Some(path),
    }
}
