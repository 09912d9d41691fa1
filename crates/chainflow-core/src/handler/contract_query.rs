use serde_json::Value;
use std::sync::Arc;

use crate::config::ContractQueryConfiguration;
use crate::error::ProcessingError;
use crate::repository::ContractQuery;
use crate::types::EventSubscription;
use crate::value;

use super::HandlerContext;

/// Calls a read-only contract function and stores the result on the event,
/// the subscription state, or both.
pub struct ContractQueryEventHandler {
    pub id: i64,
    pub subscription: Arc<EventSubscription>,
    pub configuration: Arc<ContractQueryConfiguration>,
    pub contract_query: Arc<dyn ContractQuery>,
}

impl ContractQueryEventHandler {
    pub(crate) async fn handle(
        &self,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<bool, ProcessingError> {
        let cfg = &self.configuration;
        let (event, state) = (&*ctx.event, &*ctx.state);

        let address = value::resolve(&cfg.contract_address, event, state)
            .map(|v| value::as_text(&v))
            .filter(|a| !a.is_empty())
            .ok_or_else(|| {
                ProcessingError::InvalidValue(format!(
                    "contract query {}: no contract address in {}",
                    self.id,
                    value::describe(&cfg.contract_address)
                ))
            })?;

        let mut ordered: Vec<_> = cfg.parameters.iter().collect();
        ordered.sort_by_key(|p| p.order);
        let args = ordered
            .into_iter()
            .map(|p| {
                value::resolve(&p.source, event, state).ok_or_else(|| {
                    ProcessingError::InvalidValue(format!(
                        "contract query {}: argument {} missing ({})",
                        self.id,
                        p.order,
                        value::describe(&p.source)
                    ))
                })
            })
            .collect::<Result<Vec<Value>, _>>()?;

        let result = self
            .contract_query
            .query(&cfg.contract_abi, &cfg.function_signature, &address, &args)
            .await?;

        tracing::debug!(
            handler_id = self.id,
            function = %cfg.function_signature,
            contract = %address,
            "contract queried"
        );

        if let Some(name) = &cfg.event_state_output_name {
            ctx.event.set_state(name.clone(), result.clone());
        }
        match &cfg.subscription_state_output_name {
            Some(name) if ctx.replay => {
                tracing::debug!(
                    handler_id = self.id,
                    output = %name,
                    "replay, subscription state kept"
                );
            }
            Some(name) => ctx.state.set(name.clone(), result),
            None => {}
        }
        Ok(true)
    }
}
