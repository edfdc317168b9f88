//! Certification registry: the read path.
//!
//! Resolves an on-chain batch id to what the contract recorded. Unknown ids
//! are `None`, not errors. The only failure handling is the RPC timeout.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{LedgerError, RegistryError};
use crate::ledger::{Certification, CertificationLedger};

/// Read-only view of the certification contract.
#[derive(Debug)]
pub struct CertificationRegistry<L> {
    ledger: Arc<L>,
    timeout: Duration,
}

impl<L> Clone for CertificationRegistry<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            timeout: self.timeout,
        }
    }
}

impl<L: CertificationLedger> CertificationRegistry<L> {
    /// Registry reads bounded by `timeout`.
    pub fn new(ledger: Arc<L>, timeout: Duration) -> Self {
        Self { ledger, timeout }
    }

    /// Look up a batch id.
    pub async fn get(&self, batch_id: u64) -> Result<Option<Certification>, RegistryError> {
        let lookup = self.ledger.get_certification(batch_id);
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(result) => {
                let certification = result?;
                tracing::debug!(batch_id, found = certification.is_some(), "registry lookup");
                Ok(certification)
            }
            Err(_) => Err(LedgerError::Timeout(format!(
                "getCertification({batch_id}) exceeded {}s",
                self.timeout.as_secs()
            ))
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{CertifyRequest, InMemoryLedger};
    use gitchain_core::ContentDigest;

    #[tokio::test]
    async fn known_and_unknown_ids() {
        let ledger = Arc::new(InMemoryLedger::default());
        let tx = ledger
            .send_certify(&CertifyRequest {
                merkle_root: ContentDigest::from_bytes([7; 32]),
                metadata_uri: "mem://7".into(),
                item_count: 1,
                gas_price_wei: 1,
            })
            .await
            .unwrap();
        let (batch_id, _) = ledger.mine(&tx).unwrap();

        let registry = CertificationRegistry::new(Arc::clone(&ledger), Duration::from_secs(1));
        let cert = registry.get(batch_id).await.unwrap().unwrap();
        assert_eq!(cert.merkle_root, ContentDigest::from_bytes([7; 32]));
        assert_eq!(cert.metadata_uri, "mem://7");
        assert_eq!(cert.issuer_address, ledger.issuer_address());

        assert_eq!(registry.clone().get(batch_id + 1).await.unwrap(), None);
    }
}
