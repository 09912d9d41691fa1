use std::sync::Arc;

use crate::error::ProcessingError;
use crate::repository::TransactionLookup;
use crate::types::EventSubscription;

use super::HandlerContext;

/// Fetches the transaction that emitted the event and attaches it, so later
/// handlers (and the queue payload) can see sender, calldata and gas.
pub struct GetTransactionEventHandler {
    pub id: i64,
    pub subscription: Arc<EventSubscription>,
    pub proxy: Arc<dyn TransactionLookup>,
}

impl GetTransactionEventHandler {
    pub(crate) async fn handle(
        &self,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<bool, ProcessingError> {
        let tx_hash = ctx.event.tx_hash.clone();
        let tx = self
            .proxy
            .get_transaction_by_hash(&tx_hash)
            .await?
            .ok_or_else(|| ProcessingError::Backend(format!("transaction {tx_hash} not found")))?;

        tracing::debug!(
            handler_id = self.id,
            tx_hash = %tx_hash,
            from = %tx.from,
            "transaction attached"
        );
        ctx.event.transaction = Some(tx);
        Ok(true)
    }
}
