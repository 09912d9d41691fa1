//! Maps a handler configuration row to a constructed [`EventHandler`].

use std::sync::Arc;

use crate::config::{EventHandlerDto, EventHandlerType};
use crate::error::ProcessingError;
use crate::handler::{
    ContractQueryEventHandler, EventAggregator, EventHandler, EventRule,
    GetTransactionEventHandler, QueueHandler, SearchIndexHandler, StorageHandler,
};
use crate::repository::*;
use crate::types::EventSubscription;

/// The collaborators a factory resolves configuration and resources from.
pub struct FactoryDependencies {
    pub rule_configurations: Arc<dyn EventRuleConfigurationRepository>,
    pub aggregator_configurations: Arc<dyn EventAggregatorConfigurationRepository>,
    pub contract_query_configurations: Arc<dyn ContractQueryConfigurationRepository>,
    pub contract_query: Arc<dyn ContractQuery>,
    pub transaction_lookup: Arc<dyn TransactionLookup>,
    pub queues: Arc<dyn SubscriberQueueFactory>,
    pub search_indexes: Arc<dyn SubscriberSearchIndexFactory>,
    pub log_stores: Arc<dyn SubscriberStorageFactory>,
}

/// Builds handlers from configuration.
///
/// Each handler type performs at most one lookup. Configuration and resource
/// lookups are keyed by the subscription's `subscriber_id`, not its own id.
/// Construction has no side effects.
pub struct EventHandlerFactory {
    deps: FactoryDependencies,
}

impl EventHandlerFactory {
    pub fn new(deps: FactoryDependencies) -> Self {
        Self { deps }
    }

    /// Use one repository for every configuration and resource lookup.
    pub fn from_repository<R>(
        repository: Arc<R>,
        contract_query: Arc<dyn ContractQuery>,
        transaction_lookup: Arc<dyn TransactionLookup>,
    ) -> Self
    where
        R: EventRuleConfigurationRepository
            + EventAggregatorConfigurationRepository
            + ContractQueryConfigurationRepository
            + SubscriberQueueFactory
            + SubscriberSearchIndexFactory
            + SubscriberStorageFactory
            + 'static,
    {
        Self::new(FactoryDependencies {
            rule_configurations: repository.clone(),
            aggregator_configurations: repository.clone(),
            contract_query_configurations: repository.clone(),
            contract_query,
            transaction_lookup,
            queues: repository.clone(),
            search_indexes: repository.clone(),
            log_stores: repository,
        })
    }

    /// Construct the handler described by `config`, bound to `subscription`.
    pub async fn load(
        &self,
        subscription: &Arc<EventSubscription>,
        config: &EventHandlerDto,
    ) -> Result<EventHandler, ProcessingError> {
        let kind = config.kind()?;
        let id = config.id;
        let subscriber_id = subscription.subscriber_id;
        let subscription = Arc::clone(subscription);

        let handler = match kind {
            EventHandlerType::Rule => {
                let configuration = self
                    .deps
                    .rule_configurations
                    .get_rule_configuration(id)
                    .await?
                    .ok_or_else(|| ProcessingError::not_found("rule configuration", id))?;
                EventHandler::Rule(EventRule { id, subscription, configuration })
            }
            EventHandlerType::Aggregate => {
                let configuration = self
                    .deps
                    .aggregator_configurations
                    .get_aggregator_configuration(id)
                    .await?
                    .ok_or_else(|| ProcessingError::not_found("aggregator configuration", id))?;
                EventHandler::Aggregator(EventAggregator { id, subscription, configuration })
            }
            EventHandlerType::ContractQuery => {
                let configuration = self
                    .deps
                    .contract_query_configurations
                    .get_contract_query_configuration(subscriber_id, id)
                    .await?
                    .ok_or_else(|| ProcessingError::not_found("contract query configuration", id))?;
                EventHandler::ContractQuery(ContractQueryEventHandler {
                    id,
                    subscription,
                    configuration,
                    contract_query: Arc::clone(&self.deps.contract_query),
                })
            }
            EventHandlerType::Queue => {
                let queue_id = config
                    .subscriber_queue_id
                    .ok_or_else(|| ProcessingError::not_found("subscriber queue id", id))?;
                let queue = self
                    .deps
                    .queues
                    .get_subscriber_queue(subscriber_id, queue_id)
                    .await?
                    .ok_or_else(|| ProcessingError::not_found("subscriber queue", id))?;
                EventHandler::Queue(QueueHandler { id, subscription, queue })
            }
            EventHandlerType::Store => {
                let repository_id = config
                    .subscriber_repository_id
                    .ok_or_else(|| ProcessingError::not_found("subscriber repository id", id))?;
                let log_store = self
                    .deps
                    .log_stores
                    .get_log_store(subscriber_id, repository_id)
                    .await?
                    .ok_or_else(|| ProcessingError::not_found("subscriber log store", id))?;
                EventHandler::Store(StorageHandler { id, subscription, log_store })
            }
            EventHandlerType::GetTransaction => {
                EventHandler::GetTransaction(GetTransactionEventHandler {
                    id,
                    subscription,
                    proxy: Arc::clone(&self.deps.transaction_lookup),
                })
            }
            EventHandlerType::Index => {
                let index_id = config
                    .subscriber_search_index_id
                    .ok_or_else(|| ProcessingError::not_found("subscriber search index id", id))?;
                let search_index = self
                    .deps
                    .search_indexes
                    .get_search_index(subscriber_id, index_id)
                    .await?
                    .ok_or_else(|| ProcessingError::not_found("subscriber search index", id))?;
                EventHandler::Index(SearchIndexHandler { id, subscription, search_index })
            }
        };

        tracing::debug!(
            handler_id = id,
            handler_type = %kind,
            event_subscription_id = config.event_subscription_id,
            "handler constructed"
        );
        Ok(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ContractQueryConfiguration, EventAggregatorConfiguration, EventRuleDto,
    };
    use crate::test_utils::*;
    use crate::types::EventSubscriptionState;
    use serde_json::json;

    const HANDLER_ID: i64 = 50;
    const OTHER_SUBSCRIBER_ID: i64 = 8;

    struct Fixture {
        repo: Arc<StubRepository>,
        contract_query: Arc<StubContractQuery>,
        tx_lookup: Arc<StubTransactionLookup>,
        factory: EventHandlerFactory,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(StubRepository::default());
        let contract_query = Arc::new(StubContractQuery::returning(json!(0)));
        let tx_lookup = Arc::new(StubTransactionLookup::with(vec![]));
        let factory = EventHandlerFactory::from_repository(
            repo.clone(),
            contract_query.clone(),
            tx_lookup.clone(),
        );
        Fixture { repo, contract_query, tx_lookup, factory }
    }

    fn config(kind: EventHandlerType) -> EventHandlerDto {
        EventHandlerDto::new(HANDLER_ID, SUBSCRIPTION_ID, kind)
    }

    fn other_subscriber() -> Arc<EventSubscription> {
        EventSubscription::new(
            SUBSCRIPTION_ID,
            OTHER_SUBSCRIBER_ID,
            EventSubscriptionState::new(SUBSCRIPTION_ID),
        )
    }

    fn same<T: ?Sized, U: ?Sized>(a: &Arc<T>, b: &Arc<U>) -> bool {
        Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
    }

    fn assert_common(handler: &EventHandler, kind: EventHandlerType, sub: &Arc<EventSubscription>) {
        assert_eq!(handler.id(), HANDLER_ID);
        assert_eq!(handler.handler_type(), kind);
        assert!(Arc::ptr_eq(handler.subscription(), sub));
    }

    #[tokio::test]
    async fn loads_rule() {
        let f = fixture();
        let stub = Arc::new(EventRuleDto::default());
        f.repo.rules.lock().unwrap().insert(HANDLER_ID, stub.clone());
        let sub = subscription();

        let handler = f.factory.load(&sub, &config(EventHandlerType::Rule)).await.unwrap();
        assert_common(&handler, EventHandlerType::Rule, &sub);
        match handler {
            EventHandler::Rule(h) => assert!(Arc::ptr_eq(&h.configuration, &stub)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.repo.lookups(), vec!["rule 50"]);
    }

    #[tokio::test]
    async fn loads_aggregator_with_the_stub_configuration() {
        let f = fixture();
        let stub = Arc::new(EventAggregatorConfiguration::default());
        f.repo.aggregators.lock().unwrap().insert(HANDLER_ID, stub.clone());
        let sub = subscription();

        let handler = f.factory.load(&sub, &config(EventHandlerType::Aggregate)).await.unwrap();
        assert_common(&handler, EventHandlerType::Aggregate, &sub);
        match handler {
            EventHandler::Aggregator(h) => assert!(Arc::ptr_eq(&h.configuration, &stub)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.repo.lookups(), vec!["aggregator 50"]);
    }

    #[tokio::test]
    async fn loads_contract_query_by_subscriber() {
        let f = fixture();
        let stub = Arc::new(ContractQueryConfiguration::default());
        f.repo
            .contract_queries
            .lock()
            .unwrap()
            .insert((SUBSCRIBER_ID, HANDLER_ID), stub.clone());
        let sub = subscription();

        let handler = f.factory.load(&sub, &config(EventHandlerType::ContractQuery)).await.unwrap();
        assert_common(&handler, EventHandlerType::ContractQuery, &sub);
        match handler {
            EventHandler::ContractQuery(h) => {
                assert!(Arc::ptr_eq(&h.configuration, &stub));
                assert!(same(&h.contract_query, &f.contract_query));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.repo.lookups(), vec!["contract query 7/50"]);
    }

    #[tokio::test]
    async fn loads_queue_registered_under_subscriber_and_queue_id() {
        let f = fixture();
        let queue = Arc::new(RecordingQueue::default());
        f.repo.queues.lock().unwrap().insert((SUBSCRIBER_ID, 33), queue.clone());
        let sub = subscription();

        let handler = f
            .factory
            .load(&sub, &config(EventHandlerType::Queue).with_queue(33))
            .await
            .unwrap();
        assert_common(&handler, EventHandlerType::Queue, &sub);
        match handler {
            EventHandler::Queue(h) => assert!(same(&h.queue, &queue)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.repo.lookups(), vec!["queue 7/33"]);
    }

    #[tokio::test]
    async fn different_queue_id_uses_a_different_key() {
        let f = fixture();
        f.repo
            .queues
            .lock()
            .unwrap()
            .insert((SUBSCRIBER_ID, 33), Arc::new(RecordingQueue::default()));
        let sub = subscription();

        let err = f
            .factory
            .load(&sub, &config(EventHandlerType::Queue).with_queue(34))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::ConfigurationNotFound { id: HANDLER_ID, .. }));
        assert_eq!(f.repo.lookups(), vec!["queue 7/34"]);
    }

    #[tokio::test]
    async fn subscriber_id_picks_the_subscribers_resources() {
        let f = fixture();
        let theirs = Arc::new(ContractQueryConfiguration::default());
        let ours = Arc::new(ContractQueryConfiguration {
            function_signature: "totalSupply()".into(),
            ..Default::default()
        });
        let stores = [
            Arc::new(RecordingLogStore::default()),
            Arc::new(RecordingLogStore::default()),
        ];
        let indexes = [
            Arc::new(RecordingSearchIndex::default()),
            Arc::new(RecordingSearchIndex::default()),
        ];
        for (i, subscriber) in [SUBSCRIBER_ID, OTHER_SUBSCRIBER_ID].into_iter().enumerate() {
            let query = if i == 0 { theirs.clone() } else { ours.clone() };
            f.repo.contract_queries.lock().unwrap().insert((subscriber, HANDLER_ID), query);
            f.repo.log_stores.lock().unwrap().insert((subscriber, 12), stores[i].clone());
            f.repo.search_indexes.lock().unwrap().insert((subscriber, 21), indexes[i].clone());
        }
        let sub = other_subscriber();

        let query = f.factory.load(&sub, &config(EventHandlerType::ContractQuery)).await.unwrap();
        let store = f
            .factory
            .load(&sub, &config(EventHandlerType::Store).with_repository(12))
            .await
            .unwrap();
        let index = f
            .factory
            .load(&sub, &config(EventHandlerType::Index).with_search_index(21))
            .await
            .unwrap();

        match (query, store, index) {
            (EventHandler::ContractQuery(q), EventHandler::Store(s), EventHandler::Index(i)) => {
                assert!(Arc::ptr_eq(&q.configuration, &ours));
                assert!(same(&s.log_store, &stores[1]));
                assert!(same(&i.search_index, &indexes[1]));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            f.repo.lookups(),
            vec!["contract query 8/50", "log store 8/12", "search index 8/21"]
        );
    }

    #[tokio::test]
    async fn resources_of_another_subscriber_are_not_found() {
        let f = fixture();
        f.repo
            .contract_queries
            .lock()
            .unwrap()
            .insert((SUBSCRIBER_ID, HANDLER_ID), Arc::new(ContractQueryConfiguration::default()));
        f.repo
            .log_stores
            .lock()
            .unwrap()
            .insert((SUBSCRIBER_ID, 12), Arc::new(RecordingLogStore::default()));
        f.repo
            .search_indexes
            .lock()
            .unwrap()
            .insert((SUBSCRIBER_ID, 21), Arc::new(RecordingSearchIndex::default()));
        let sub = other_subscriber();

        for row in [
            config(EventHandlerType::ContractQuery),
            config(EventHandlerType::Store).with_repository(12),
            config(EventHandlerType::Index).with_search_index(21),
        ] {
            let err = f.factory.load(&sub, &row).await.unwrap_err();
            assert!(matches!(err, ProcessingError::ConfigurationNotFound { id: HANDLER_ID, .. }));
        }
        assert_eq!(
            f.repo.lookups(),
            vec!["contract query 8/50", "log store 8/12", "search index 8/21"]
        );
    }

    #[tokio::test]
    async fn row_ids_pick_the_store_index_and_aggregator() {
        let f = fixture();
        let stores = [
            Arc::new(RecordingLogStore::default()),
            Arc::new(RecordingLogStore::default()),
        ];
        let indexes = [
            Arc::new(RecordingSearchIndex::default()),
            Arc::new(RecordingSearchIndex::default()),
        ];
        for (i, id) in [12, 13].into_iter().enumerate() {
            f.repo.log_stores.lock().unwrap().insert((SUBSCRIBER_ID, id), stores[i].clone());
        }
        for (i, id) in [21, 22].into_iter().enumerate() {
            f.repo.search_indexes.lock().unwrap().insert((SUBSCRIBER_ID, id), indexes[i].clone());
        }
        let second = Arc::new(EventAggregatorConfiguration {
            output_key: "second".into(),
            ..Default::default()
        });
        let aggregators = &f.repo.aggregators;
        aggregators.lock().unwrap().insert(HANDLER_ID, Arc::new(Default::default()));
        aggregators.lock().unwrap().insert(HANDLER_ID + 1, second.clone());
        let sub = subscription();

        let store = f
            .factory
            .load(&sub, &config(EventHandlerType::Store).with_repository(13))
            .await
            .unwrap();
        let index = f
            .factory
            .load(&sub, &config(EventHandlerType::Index).with_search_index(22))
            .await
            .unwrap();
        let row = EventHandlerDto::new(HANDLER_ID + 1, SUBSCRIPTION_ID, EventHandlerType::Aggregate);
        let aggregator = f.factory.load(&sub, &row).await.unwrap();

        match (store, index, aggregator) {
            (EventHandler::Store(s), EventHandler::Index(i), EventHandler::Aggregator(a)) => {
                assert!(same(&s.log_store, &stores[1]));
                assert!(same(&i.search_index, &indexes[1]));
                assert_eq!(a.id, HANDLER_ID + 1);
                assert!(Arc::ptr_eq(&a.configuration, &second));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            f.repo.lookups(),
            vec!["log store 7/13", "search index 7/22", "aggregator 51"]
        );
    }

    #[tokio::test]
    async fn loads_store() {
        let f = fixture();
        let store = Arc::new(RecordingLogStore::default());
        f.repo.log_stores.lock().unwrap().insert((SUBSCRIBER_ID, 12), store.clone());
        let sub = subscription();

        let handler = f
            .factory
            .load(&sub, &config(EventHandlerType::Store).with_repository(12))
            .await
            .unwrap();
        assert_common(&handler, EventHandlerType::Store, &sub);
        match handler {
            EventHandler::Store(h) => assert!(same(&h.log_store, &store)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.repo.lookups(), vec!["log store 7/12"]);
    }

    #[tokio::test]
    async fn loads_index() {
        let f = fixture();
        let index = Arc::new(RecordingSearchIndex::default());
        f.repo.search_indexes.lock().unwrap().insert((SUBSCRIBER_ID, 21), index.clone());
        let sub = subscription();

        let handler = f
            .factory
            .load(&sub, &config(EventHandlerType::Index).with_search_index(21))
            .await
            .unwrap();
        assert_common(&handler, EventHandlerType::Index, &sub);
        match handler {
            EventHandler::Index(h) => assert!(same(&h.search_index, &index)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.repo.lookups(), vec!["search index 7/21"]);
    }

    #[tokio::test]
    async fn loads_get_transaction_without_lookups() {
        let f = fixture();
        let sub = subscription();

        let row = config(EventHandlerType::GetTransaction);
        let handler = f.factory.load(&sub, &row).await.unwrap();
        assert_common(&handler, EventHandlerType::GetTransaction, &sub);
        match handler {
            EventHandler::GetTransaction(h) => assert!(same(&h.proxy, &f.tx_lookup)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(f.repo.lookups().is_empty());
    }

    #[tokio::test]
    async fn missing_contract_query_configuration_names_the_handler() {
        let f = fixture();
        let sub = subscription();

        let err = f
            .factory
            .load(&sub, &config(EventHandlerType::ContractQuery))
            .await
            .unwrap_err();
        assert!(err.is_configuration_error());
        match err {
            ProcessingError::ConfigurationNotFound { id, .. } => assert_eq!(id, HANDLER_ID),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_foreign_key_is_not_found() {
        let f = fixture();
        let sub = subscription();
        let err = f.factory.load(&sub, &config(EventHandlerType::Queue)).await.unwrap_err();
        assert!(matches!(err, ProcessingError::ConfigurationNotFound { id: HANDLER_ID, .. }));
        assert!(f.repo.lookups().is_empty());
    }

    #[tokio::test]
    async fn unknown_tag_is_unsupported() {
        let f = fixture();
        let sub = subscription();
        let dto = EventHandlerDto {
            handler_type: "Webhook".into(),
            ..config(EventHandlerType::Rule)
        };
        let err = f.factory.load(&sub, &dto).await.unwrap_err();
        assert!(matches!(err, ProcessingError::UnsupportedHandlerType(_)));
        assert!(f.repo.lookups().is_empty());
    }
}
