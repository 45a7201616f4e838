use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::models::*;
use crate::ledger::LedgerClient;

/// Sui fullnode JSON-RPC client configuration
#[derive(Debug, Clone)]
pub struct SuiRpcConfig {
    pub rpc_url: String,
    /// Payload field carrying the created object id in creation events
    pub event_id_field: String,
    /// HTTP-level timeout; callers apply their own per-operation bounds too
    pub request_timeout: Duration,
}

impl Default for SuiRpcConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://fullnode.testnet.sui.io:443".to_string(),
            event_id_field: "alarm_id".to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

pub struct SuiRpcClient {
    config: SuiRpcConfig,
    client: Client,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEventPage {
    #[serde(default)]
    data: Vec<RawEvent>,
    next_cursor: Option<EventCursor>,
    #[serde(default)]
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    id: EventCursor,
    #[serde(default)]
    parsed_json: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBalance {
    total_balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMoveCall {
    tx_bytes: String,
}

impl SuiRpcClient {
    pub fn new(config: SuiRpcConfig) -> LedgerResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LedgerError::Transport {
                method: "client_build".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            config,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> LedgerResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!("➡️  {} (id {})", method, id);

        let response = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Transport {
                method: method.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LedgerError::Transport {
                method: method.to_string(),
                message: format!("HTTP {}: {}", status, error_text),
            });
        }

        let envelope: RpcEnvelope =
            response
                .json()
                .await
                .map_err(|e| LedgerError::MalformedResponse {
                    method: method.to_string(),
                    message: e.to_string(),
                })?;

        if let Some(err) = envelope.error {
            return Err(LedgerError::Rpc {
                method: method.to_string(),
                code: err.code,
                message: err.message,
            });
        }

        let result = envelope.result.ok_or_else(|| LedgerError::MalformedResponse {
            method: method.to_string(),
            message: "No result in response".to_string(),
        })?;

        serde_json::from_value(result).map_err(|e| LedgerError::MalformedResponse {
            method: method.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl LedgerClient for SuiRpcClient {
    #[instrument(skip(self, query), fields(event_type = %query.event_type))]
    async fn query_events(&self, query: &EventQuery) -> LedgerResult<EventPage> {
        let raw: RawEventPage = self
            .call(
                "suix_queryEvents",
                json!([
                    { "MoveEventType": query.event_type },
                    query.cursor,
                    query.limit,
                    query.descending,
                ]),
            )
            .await?;

        let events = raw
            .data
            .into_iter()
            .map(|event| CreationEvent {
                object_id: event
                    .parsed_json
                    .get(&self.config.event_id_field)
                    .and_then(Value::as_str)
                    .map(ObjectId::new),
                cursor: event.id,
            })
            .collect();

        Ok(EventPage {
            events,
            next_cursor: raw.next_cursor,
            has_next_page: raw.has_next_page,
        })
    }

    #[instrument(skip(self), fields(object_id = %id))]
    async fn get_object(&self, id: &ObjectId) -> LedgerResult<ObjectState> {
        let response: Value = self
            .call(
                "sui_getObject",
                json!([id.as_str(), { "showContent": true, "showOwner": true }]),
            )
            .await?;

        parse_object_response(id, &response)
    }

    #[instrument(skip(self, request), fields(function = %request.function))]
    async fn build_move_call(&self, request: &MoveCallRequest) -> LedgerResult<UnsignedTransaction> {
        let raw: RawMoveCall = self
            .call(
                "unsafe_moveCall",
                json!([
                    request.signer,
                    request.package,
                    request.module,
                    request.function,
                    [],
                    request.arguments,
                    null,
                    request.gas_budget.to_string(),
                ]),
            )
            .await?;

        Ok(UnsignedTransaction {
            tx_bytes: raw.tx_bytes,
        })
    }

    #[instrument(skip(self, tx))]
    async fn execute_transaction(&self, tx: &SignedTransaction) -> LedgerResult<ExecutionEffects> {
        let response: Value = self
            .call(
                "sui_executeTransactionBlock",
                json!([
                    tx.tx_bytes,
                    [tx.signature],
                    { "showEffects": true, "showEvents": true },
                    "WaitForLocalExecution",
                ]),
            )
            .await?;

        parse_execution_response(&response)
    }

    async fn get_balance(&self, owner: &str) -> LedgerResult<u128> {
        let raw: RawBalance = self
            .call("suix_getBalance", json!([owner, "0x2::sui::SUI"]))
            .await?;

        raw.total_balance
            .parse::<u128>()
            .map_err(|e| LedgerError::MalformedResponse {
                method: "suix_getBalance".to_string(),
                message: format!("Invalid totalBalance {}: {}", raw.total_balance, e),
            })
    }
}

/// Map a `sui_getObject` result onto [`ObjectState`]
pub(crate) fn parse_object_response(id: &ObjectId, response: &Value) -> LedgerResult<ObjectState> {
    if let Some(error) = response.get("error") {
        let code = error.get("code").and_then(Value::as_str).unwrap_or_default();
        return match code {
            "notExists" | "deleted" => Ok(ObjectState::NotFound),
            other => Err(LedgerError::MalformedResponse {
                method: "sui_getObject".to_string(),
                message: format!("Object error {}: {}", other, error),
            }),
        };
    }

    let Some(data) = response.get("data") else {
        return Ok(ObjectState::NotFound);
    };

    let content = &data["content"];
    if content["dataType"].as_str() != Some("moveObject") {
        return Ok(ObjectState::NotACommitment(
            "object content is not a move object".to_string(),
        ));
    }

    let fields = &content["fields"];
    let snapshot = (|| {
        Some(CommitmentSnapshot {
            id: data
                .get("objectId")
                .and_then(Value::as_str)
                .map(ObjectId::new)
                .unwrap_or_else(|| id.clone()),
            owner: fields.get("owner")?.as_str()?.to_string(),
            category: fields
                .get("habit_type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            deadline_ms: value_as_u64(fields.get("wake_up_time")?)?,
            deposit_amount: value_as_u64(fields.get("deposit_amount")?)?,
            beneficiary: fields.get("charity_address")?.as_str()?.to_string(),
            active: fields.get("is_active")?.as_bool()?,
            completed: fields.get("is_completed")?.as_bool()?,
        })
    })();

    Ok(match snapshot {
        Some(snapshot) => ObjectState::Found(snapshot),
        None => ObjectState::NotACommitment(format!("missing commitment fields in {}", fields)),
    })
}

/// Map a `sui_executeTransactionBlock` result onto [`ExecutionEffects`]
pub(crate) fn parse_execution_response(response: &Value) -> LedgerResult<ExecutionEffects> {
    let malformed = |message: &str| LedgerError::MalformedResponse {
        method: "sui_executeTransactionBlock".to_string(),
        message: message.to_string(),
    };

    let digest = response
        .get("digest")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("No transaction digest in response"))?
        .to_string();

    let status = &response["effects"]["status"];
    let status_str = status
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("No effects status in response"))?;

    let effects = match status_str {
        "success" => ExecutionEffects {
            digest,
            status: ExecutionStatus::Success,
            error: None,
        },
        _ => ExecutionEffects {
            digest,
            status: ExecutionStatus::Failure,
            error: status
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
    };

    Ok(effects)
}

/// Move u64 fields arrive as JSON strings; accept numbers too
fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object_json(active: bool, completed: bool) -> Value {
        json!({
            "data": {
                "objectId": "0xAA",
                "content": {
                    "dataType": "moveObject",
                    "fields": {
                        "owner": "0xowner",
                        "habit_type": "Wake up early",
                        "wake_up_time": "1700000000000",
                        "deposit_amount": "1000000000",
                        "charity_address": "0xcharity",
                        "is_active": active,
                        "is_completed": completed
                    }
                }
            }
        })
    }

    #[test]
    fn test_parse_commitment_object() {
        let id = ObjectId::new("0xaa");
        let state = parse_object_response(&id, &object_json(true, false)).unwrap();

        let ObjectState::Found(snapshot) = state else {
            panic!("expected snapshot");
        };
        assert_eq!(snapshot.id, id);
        assert_eq!(snapshot.deadline_ms, 1_700_000_000_000);
        assert_eq!(snapshot.deposit_amount, 1_000_000_000);
        assert!(snapshot.is_open());
    }

    #[test]
    fn test_parse_missing_and_foreign_objects() {
        let id = ObjectId::new("0xaa");

        let deleted = json!({ "error": { "code": "deleted", "object_id": "0xaa" } });
        assert_eq!(parse_object_response(&id, &deleted).unwrap(), ObjectState::NotFound);

        let not_exists = json!({ "error": { "code": "notExists", "object_id": "0xaa" } });
        assert_eq!(parse_object_response(&id, &not_exists).unwrap(), ObjectState::NotFound);

        let package = json!({ "data": { "objectId": "0xaa", "content": { "dataType": "package" } } });
        assert!(matches!(
            parse_object_response(&id, &package).unwrap(),
            ObjectState::NotACommitment(_)
        ));

        let mut partial = object_json(true, false);
        partial["data"]["content"]["fields"]
            .as_object_mut()
            .unwrap()
            .remove("is_active");
        assert!(matches!(
            parse_object_response(&id, &partial).unwrap(),
            ObjectState::NotACommitment(_)
        ));
    }

    #[test]
    fn test_parse_execution_effects() {
        let ok = json!({ "digest": "D1", "effects": { "status": { "status": "success" } } });
        let effects = parse_execution_response(&ok).unwrap();
        assert_eq!(effects.status, ExecutionStatus::Success);
        assert_eq!(effects.digest, "D1");

        let failed = json!({
            "digest": "D2",
            "effects": { "status": { "status": "failure", "error": "InsufficientGas" } }
        });
        let effects = parse_execution_response(&failed).unwrap();
        assert_eq!(effects.status, ExecutionStatus::Failure);
        assert_eq!(effects.error.as_deref(), Some("InsufficientGas"));

        assert!(parse_execution_response(&json!({})).is_err());
    }
}
