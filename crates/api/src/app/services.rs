use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value as JsonValue;

use videostore_core::{Aggregate, AggregateId, DomainError};
use videostore_events::{EventEnvelope, InMemoryEventBus};
use videostore_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    config::AppConfig,
    event_store::{InMemoryEventStore, StoredEvent},
    projections::ReadModels,
    rental_service::RentalService,
    workers::{ProjectionWorker, WorkerHandle},
};

type Store = Arc<InMemoryEventStore>;
type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

/// Everything the handlers need: the write side (dispatcher, rental
/// service) and the eventually consistent read side.
pub struct AppServices {
    dispatcher: CommandDispatcher<Store, Bus>,
    rentals: RentalService<Store, Bus>,
    read_models: Arc<ReadModels<Store>>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl std::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppServices")
            .field("loan_policy", &self.rentals.policy())
            .finish_non_exhaustive()
    }
}

impl AppServices {
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: videostore_events::Event + serde::Serialize + serde::de::DeserializeOwned,
    {
        self.dispatcher
            .dispatch(aggregate_id, aggregate_type, command, make_aggregate)
    }

    pub fn rentals(&self) -> &RentalService<Store, Bus> {
        &self.rentals
    }

    pub fn read_models(&self) -> &ReadModels<Store> {
        &self.read_models
    }

    /// Stop the projection worker (tests, graceful shutdown).
    pub fn shutdown(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.shutdown();
        }
    }
}

/// Wire the in-memory store and bus, the projections and their worker.
pub fn build_services(config: &AppConfig) -> io::Result<AppServices> {
    let store: Store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let read_models = Arc::new(ReadModels::new(store.clone()));

    let projections = read_models.clone();
    let worker = ProjectionWorker::spawn(
        "read-model-projections",
        &bus,
        move |env: EventEnvelope<JsonValue>| projections.apply_envelope(&env),
    )?;

    Ok(AppServices {
        dispatcher: CommandDispatcher::new(store.clone(), bus.clone()),
        rentals: RentalService::new(store, bus, config.loan_policy),
        read_models,
        worker: Mutex::new(Some(worker)),
    })
}
