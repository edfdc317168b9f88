//! # EVM JSON-RPC Ledger
//!
//! Records certifications on an EVM-compatible chain through a JSON-RPC
//! endpoint.
//!
//! 1. `eth_gasPrice` gives the fee estimate checked against the ceiling.
//! 2. `certify(...)` is sent with `eth_sendTransaction`. The endpoint signs
//!    for `from_address`; no key material is held here.
//! 3. `eth_getTransactionReceipt` decides the outcome. A null receipt means
//!    pending, unless `eth_getTransactionByHash` is also null, in which case
//!    the transaction was dropped. The batch id is read from the
//!    `BatchCertified` log.
//! 4. `getCertification` is read with `eth_call`.

use std::future::Future;

use serde_json::{json, Value};

use crate::abi;
use crate::config::{is_valid_eth_address, EvmLedgerConfig};
use crate::error::LedgerError;
use crate::ledger::{Certification, CertificationLedger, CertifyRequest, TxHash, TxStatus};

/// JSON-RPC client for the certification contract.
#[derive(Debug)]
pub struct EvmLedger {
    client: reqwest::Client,
    config: EvmLedgerConfig,
}

impl EvmLedger {
    /// Create a ledger client. Fails on malformed addresses.
    pub fn new(config: EvmLedgerConfig) -> Result<Self, LedgerError> {
        if !is_valid_eth_address(&config.contract_address) {
            return Err(LedgerError::Config(format!(
                "invalid contract address: {}",
                config.contract_address
            )));
        }
        if !is_valid_eth_address(&config.from_address) {
            return Err(LedgerError::Config(format!(
                "invalid from address: {}",
                config.from_address
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LedgerError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// The configuration in use.
    pub fn config(&self) -> &EvmLedgerConfig {
        &self.config
    }

    /// Compare `eth_chainId` with the configured chain id, if one is set.
    pub async fn check_chain_id(&self) -> Result<(), LedgerError> {
        let Some(expected) = self.config.chain_id else {
            return Ok(());
        };
        let result = self.rpc_call("eth_chainId", json!([])).await?;
        let actual = quantity(&result, "eth_chainId")?;
        if actual != expected {
            return Err(LedgerError::Config(format!(
                "{}: endpoint reports chain id {actual}, expected {expected}",
                self.config.chain_name
            )));
        }
        Ok(())
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp = self
            .client
            .post(self.config.rpc_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LedgerError::Timeout(format!("{}: {method} timed out", self.config.chain_name))
                } else {
                    LedgerError::Transport(format!("{}: {e}", self.config.chain_name))
                }
            })?;

        if !resp.status().is_success() {
            return Err(LedgerError::Transport(format!(
                "{}: HTTP {}",
                self.config.chain_name,
                resp.status()
            )));
        }

        let json: Value = resp.json().await.map_err(|e| {
            LedgerError::InvalidResponse(format!("{}: invalid JSON response: {e}", self.config.chain_name))
        })?;

        if let Some(error) = json.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown RPC error");
            return Err(classify_rpc_error(code, message));
        }

        json.get("result").cloned().ok_or_else(|| {
            LedgerError::InvalidResponse(format!(
                "{}: JSON-RPC response missing 'result' field",
                self.config.chain_name
            ))
        })
    }

    async fn fetch_gas_price(&self) -> Result<u64, LedgerError> {
        let result = self.rpc_call("eth_gasPrice", json!([])).await?;
        quantity(&result, "eth_gasPrice")
    }

    async fn send(&self, request: &CertifyRequest) -> Result<TxHash, LedgerError> {
        let data = abi::encode_certify(&request.merkle_root, &request.metadata_uri, request.item_count);
        let tx = json!({
            "from": self.config.from_address,
            "to": self.config.contract_address,
            "data": format!("0x{}", abi::encode_hex(&data)),
            "gasPrice": abi::format_quantity(request.gas_price_wei),
        });

        let result = self.rpc_call("eth_sendTransaction", json!([tx])).await?;
        result
            .as_str()
            .map(TxHash::new)
            .ok_or_else(|| LedgerError::InvalidResponse("eth_sendTransaction returned non-string result".into()))
    }

    async fn status(&self, tx_hash: &TxHash) -> Result<TxStatus, LedgerError> {
        let receipt = self
            .rpc_call("eth_getTransactionReceipt", json!([tx_hash.as_str()]))
            .await?;

        if receipt.is_null() {
            let tx = self
                .rpc_call("eth_getTransactionByHash", json!([tx_hash.as_str()]))
                .await?;
            return Ok(if tx.is_null() { TxStatus::Dropped } else { TxStatus::Pending });
        }

        let head = self.rpc_call("eth_blockNumber", json!([])).await?;
        let head = quantity(&head, "eth_blockNumber")?;
        status_from_receipt(&receipt, &self.config.contract_address, head, self.config.confirmations)
    }

    async fn certification(&self, batch_id: u64) -> Result<Option<Certification>, LedgerError> {
        let call = json!({
            "to": self.config.contract_address,
            "data": format!("0x{}", abi::encode_hex(&abi::encode_get_certification(batch_id))),
        });
        let result = match self.rpc_call("eth_call", json!([call, "latest"])).await {
            Ok(result) => result,
            // Contracts that `require` a known id revert instead of returning zeroes.
            Err(LedgerError::Rpc { message, .. }) if message.to_ascii_lowercase().contains("revert") => {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };
        let hex = result
            .as_str()
            .ok_or_else(|| LedgerError::InvalidResponse("eth_call returned non-string result".into()))?;
        abi::decode_certification(&abi::decode_hex(hex)?)
    }
}

impl CertificationLedger for EvmLedger {
    fn chain_name(&self) -> &str {
        &self.config.chain_name
    }

    fn ledger_id(&self) -> String {
        let contract = self.config.contract_address.to_ascii_lowercase();
        match self.config.chain_id {
            Some(chain_id) => format!("eip155:{chain_id}:{contract}"),
            None => format!("{}:{contract}", self.config.chain_name),
        }
    }

    fn gas_price(&self) -> impl Future<Output = Result<u64, LedgerError>> + Send {
        self.fetch_gas_price()
    }

    fn send_certify(
        &self,
        request: &CertifyRequest,
    ) -> impl Future<Output = Result<TxHash, LedgerError>> + Send {
        self.send(request)
    }

    fn transaction_status(
        &self,
        tx_hash: &TxHash,
    ) -> impl Future<Output = Result<TxStatus, LedgerError>> + Send {
        self.status(tx_hash)
    }

    fn get_certification(
        &self,
        batch_id: u64,
    ) -> impl Future<Output = Result<Option<Certification>, LedgerError>> + Send {
        self.certification(batch_id)
    }
}

/// Map a JSON-RPC error object onto the ledger taxonomy.
///
/// Node implementations disagree on codes, so classification is by message.
pub fn classify_rpc_error(code: i64, message: &str) -> LedgerError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("nonce too low") || lower.contains("nonce too high") || lower.contains("already known") {
        LedgerError::NonceConflict(message.to_string())
    } else if lower.contains("underpriced") || lower.contains("fee too low") {
        LedgerError::Underpriced(message.to_string())
    } else if lower.contains("timeout") || lower.contains("timed out") {
        LedgerError::Timeout(message.to_string())
    } else {
        LedgerError::Rpc {
            code,
            message: message.to_string(),
        }
    }
}

/// Interpret a non-null transaction receipt.
///
/// `head` is the current block number. A successful receipt is `Pending`
/// until it has `confirmations` blocks, counting its own.
pub fn status_from_receipt(
    receipt: &Value,
    contract_address: &str,
    head: u64,
    confirmations: u64,
) -> Result<TxStatus, LedgerError> {
    let status = receipt
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| LedgerError::InvalidResponse("receipt without status".into()))?;
    if abi::parse_quantity(status)? == 0 {
        return Ok(TxStatus::Reverted);
    }

    let block_number = receipt
        .get("blockNumber")
        .ok_or_else(|| LedgerError::InvalidResponse("receipt without blockNumber".into()))
        .and_then(|b| quantity(b, "blockNumber"))?;
    if head.saturating_sub(block_number) + 1 < confirmations {
        return Ok(TxStatus::Pending);
    }

    let logs = receipt
        .get("logs")
        .and_then(Value::as_array)
        .ok_or_else(|| LedgerError::InvalidResponse("receipt without logs".into()))?;
    for log in logs {
        let from_contract = log
            .get("address")
            .and_then(Value::as_str)
            .is_some_and(|a| a.eq_ignore_ascii_case(contract_address));
        if !from_contract {
            continue;
        }
        let topics: Vec<String> = log
            .get("topics")
            .and_then(Value::as_array)
            .map(|t| t.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        if let Some(batch_id) = abi::batch_id_from_topics(&topics)? {
            return Ok(TxStatus::Confirmed { batch_id, block_number });
        }
    }
    Err(LedgerError::InvalidResponse(
        "successful receipt carries no BatchCertified event".into(),
    ))
}

fn quantity(value: &Value, what: &str) -> Result<u64, LedgerError> {
    value
        .as_str()
        .ok_or_else(|| LedgerError::InvalidResponse(format!("{what}: expected hex string")))
        .and_then(abi::parse_quantity)
}
