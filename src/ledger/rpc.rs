use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use rocket::serde::json::{json, Value};
use serde::{de::DeserializeOwned, Deserialize};

use super::primitives::{from_hex, to_hex, Address, TxHash};
use super::{CallRequest, Ledger, LedgerError, Receipt, SignedTransaction};

/// A [`Ledger`] reached over JSON-RPC on HTTP.
pub struct RpcLedger {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl RpcErrorObject {
    /// Revert data, if the node reported a contract revert. Some nodes nest
    /// the hex string one level deeper.
    fn revert_data(&self) -> Option<Vec<u8>> {
        let data = match &self.data {
            Some(Value::String(data)) => data,
            Some(Value::Object(inner)) => inner.get("data")?.as_str()?,
            _ => return None,
        };
        from_hex(data).ok()
    }
}

#[derive(Deserialize)]
struct RpcBlock {
    timestamp: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: TxHash,
    block_number: Option<String>,
    status: Option<String>,
    contract_address: Option<Address>,
}

impl RpcLedger {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, LedgerError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!("rpc{id} {method} {params}");
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            debug!("rpc{id} {method} failed ({}): {}", error.code, error.message);
            return Err(match error.revert_data() {
                Some(data) => LedgerError::Reverted { data },
                None => LedgerError::Rpc {
                    code: error.code,
                    message: error.message,
                },
            });
        }
        let result = response.result.unwrap_or(Value::Null);
        rocket::serde::json::from_value(result)
            .map_err(|e| LedgerError::Malformed(format!("{method}: {e}")))
    }

    async fn quantity(&self, method: &str, params: Value) -> Result<u128, LedgerError> {
        let text: String = self.request(method, params).await?;
        parse_quantity(&text)
    }
}

fn parse_quantity(text: &str) -> Result<u128, LedgerError> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|_| LedgerError::Malformed(format!("bad quantity `{text}`")))
}

fn quantity_u64(value: u128) -> Result<u64, LedgerError> {
    u64::try_from(value).map_err(|_| LedgerError::Malformed(format!("{value} exceeds 64 bits")))
}

fn block_tag(block: u64) -> String {
    format!("0x{block:x}")
}

fn call_object(request: &CallRequest) -> Value {
    let mut object = json!({ "data": to_hex(&request.data) });
    if let Some(from) = request.from {
        object["from"] = json!(from);
    }
    if let Some(to) = request.to {
        object["to"] = json!(to);
    }
    object
}

#[rocket::async_trait]
impl Ledger for RpcLedger {
    async fn chain_id(&self) -> Result<u64, LedgerError> {
        quantity_u64(self.quantity("eth_chainId", json!([])).await?)
    }

    async fn balance(&self, account: Address) -> Result<u128, LedgerError> {
        self.quantity("eth_getBalance", json!([account, "latest"]))
            .await
    }

    async fn nonce(&self, account: Address) -> Result<u64, LedgerError> {
        quantity_u64(
            self.quantity("eth_getTransactionCount", json!([account, "pending"]))
                .await?,
        )
    }

    async fn gas_price(&self) -> Result<u128, LedgerError> {
        self.quantity("eth_gasPrice", json!([])).await
    }

    async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, LedgerError> {
        quantity_u64(
            self.quantity("eth_estimateGas", json!([call_object(request)]))
                .await?,
        )
    }

    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, LedgerError> {
        let result: String = self
            .request("eth_call", json!([call_object(request), "latest"]))
            .await?;
        from_hex(&result).map_err(|e| LedgerError::Malformed(e.to_string()))
    }

    async fn call_at(&self, request: &CallRequest, block: u64) -> Result<Vec<u8>, LedgerError> {
        let result: String = self
            .request("eth_call", json!([call_object(request), block_tag(block)]))
            .await?;
        from_hex(&result).map_err(|e| LedgerError::Malformed(e.to_string()))
    }

    async fn block_time(&self) -> Result<u64, LedgerError> {
        let block: Option<RpcBlock> = self
            .request("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        let block = block.ok_or_else(|| LedgerError::Malformed("no latest block".to_string()))?;
        quantity_u64(parse_quantity(&block.timestamp)?)
    }

    async fn send_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> Result<TxHash, LedgerError> {
        self.request("eth_sendRawTransaction", json!([to_hex(&transaction.raw)]))
            .await
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<Receipt>, LedgerError> {
        let receipt: Option<RpcReceipt> = self
            .request("eth_getTransactionReceipt", json!([hash]))
            .await?;
        let receipt = match receipt {
            Some(receipt) => receipt,
            None => return Ok(None),
        };
        // A receipt without a block number is still pending on some nodes.
        let block_number = match receipt.block_number {
            Some(number) => quantity_u64(parse_quantity(&number)?)?,
            None => return Ok(None),
        };
        let succeeded = match receipt.status.as_deref() {
            Some(status) => parse_quantity(status)? == 1,
            None => return Err(LedgerError::Malformed("receipt without status".to_string())),
        };
        Ok(Some(Receipt {
            transaction_hash: receipt.transaction_hash,
            block_number,
            succeeded,
            contract_address: receipt.contract_address.filter(|_| succeeded),
        }))
    }
}
