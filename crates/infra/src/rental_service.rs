//! Checkout and checkin: the cross-aggregate rental transitions.
//!
//! One checkout touches three streams (movie, customer, new rental). The
//! decisions are made on rehydrated aggregates and committed with a single
//! [`EventStore::append_batch`], each stream pinned to the version it was
//! loaded at. Two concurrent checkouts of the last copy therefore cannot
//! both commit: the loser fails with `Concurrency` and nothing of it is
//! written.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, instrument};

use videostore_core::{Aggregate, AggregateId, ExpectedVersion};
use videostore_events::{EventBus, EventEnvelope};
use videostore_rentals::customer::{self, Customer};
use videostore_rentals::movie::{self, Movie};
use videostore_rentals::rental::{self, Rental};
use videostore_rentals::{
    CheckOutCopy, CheckOutMovie, CloseRental, CustomerCommand, CustomerId, LoanPolicy,
    MovieCommand, MovieId, OpenRental, RentalCommand, RentalId, ReturnCopy, ReturnMovie,
};

use crate::command_dispatcher::{DispatchError, load_aggregate, publish, to_uncommitted};
use crate::event_store::{EventStore, StreamAppend};

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    pub rental_id: RentalId,
    pub movie_id: MovieId,
    pub customer_id: CustomerId,
    pub checkout_date: NaiveDate,
    pub due_date: NaiveDate,
    pub available_inventory: u32,
    pub movies_checked_out_count: u32,
}

/// Result of a successful checkin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckinReceipt {
    pub rental_id: RentalId,
    pub movie_id: MovieId,
    pub customer_id: CustomerId,
    pub returned_date: NaiveDate,
    pub available_inventory: u32,
    pub movies_checked_out_count: u32,
}

#[derive(Debug)]
pub struct RentalService<S, B> {
    store: S,
    bus: B,
    policy: LoanPolicy,
}

impl<S, B> RentalService<S, B> {
    pub fn new(store: S, bus: B, policy: LoanPolicy) -> Self {
        Self { store, bus, policy }
    }

    pub fn policy(&self) -> LoanPolicy {
        self.policy
    }
}

impl<S, B> RentalService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Check a movie out to a customer today (UTC).
    pub fn checkout(
        &self,
        movie_id: MovieId,
        customer_id: CustomerId,
    ) -> Result<CheckoutReceipt, DispatchError> {
        self.checkout_on(movie_id, customer_id, Utc::now().date_naive())
    }

    /// Check a movie out on `checkout_date`.
    ///
    /// Fails with `NotFound` for an unknown movie, then an unknown customer,
    /// and with `Conflict` when no copy is available.
    #[instrument(skip(self))]
    pub fn checkout_on(
        &self,
        movie_id: MovieId,
        customer_id: CustomerId,
        checkout_date: NaiveDate,
    ) -> Result<CheckoutReceipt, DispatchError> {
        let (mut movie, movie_version) = self.load_movie(movie_id)?;
        let (mut customer, customer_version) = self.load_customer(customer_id)?;

        let rental_id = RentalId::new(AggregateId::new());
        let due_date = self.policy.due_date(checkout_date)?;
        let occurred_at = Utc::now();

        let movie_events = movie.handle(&MovieCommand::CheckOutCopy(CheckOutCopy {
            movie_id,
            rental_id,
            occurred_at,
        }))?;
        let customer_events = customer.handle(&CustomerCommand::CheckOutMovie(CheckOutMovie {
            customer_id,
            rental_id,
            movie_id,
            occurred_at,
        }))?;
        let mut rental = Rental::empty(rental_id);
        let rental_events = rental.handle(&RentalCommand::OpenRental(OpenRental {
            rental_id,
            customer_id,
            movie_id,
            checkout_date,
            due_date,
            occurred_at,
        }))?;

        let batch = vec![
            StreamAppend {
                aggregate_id: movie_id.0,
                expected_version: ExpectedVersion::Exact(movie_version),
                events: to_uncommitted(movie_id.0, movie::AGGREGATE_TYPE, &movie_events)?,
            },
            StreamAppend {
                aggregate_id: customer_id.0,
                expected_version: ExpectedVersion::Exact(customer_version),
                events: to_uncommitted(customer_id.0, customer::AGGREGATE_TYPE, &customer_events)?,
            },
            StreamAppend {
                aggregate_id: rental_id.0,
                expected_version: ExpectedVersion::Exact(0),
                events: to_uncommitted(rental_id.0, rental::AGGREGATE_TYPE, &rental_events)?,
            },
        ];
        let committed = self.store.append_batch(batch)?;

        apply_all(&mut movie, &movie_events);
        apply_all(&mut customer, &customer_events);
        apply_all(&mut rental, &rental_events);

        info!(
            rental = %rental_id,
            %due_date,
            available_inventory = movie.available_inventory(),
            movies_checked_out_count = customer.movies_checked_out_count(),
            "movie checked out"
        );

        publish(&self.bus, &committed)?;

        Ok(CheckoutReceipt {
            rental_id,
            movie_id,
            customer_id,
            checkout_date,
            due_date,
            available_inventory: movie.available_inventory(),
            movies_checked_out_count: customer.movies_checked_out_count(),
        })
    }

    /// Return a movie today (UTC).
    pub fn checkin(
        &self,
        movie_id: MovieId,
        customer_id: CustomerId,
    ) -> Result<CheckinReceipt, DispatchError> {
        self.checkin_on(movie_id, customer_id, Utc::now().date_naive())
    }

    /// Return a movie on `returned_date`.
    ///
    /// Closes the customer's oldest open rental of that movie. Fails with
    /// `Conflict` when the customer holds no copy of it.
    #[instrument(skip(self))]
    pub fn checkin_on(
        &self,
        movie_id: MovieId,
        customer_id: CustomerId,
        returned_date: NaiveDate,
    ) -> Result<CheckinReceipt, DispatchError> {
        let (mut movie, movie_version) = self.load_movie(movie_id)?;
        let (mut customer, customer_version) = self.load_customer(customer_id)?;

        let rental_id = customer.open_rental_for(movie_id).ok_or_else(|| {
            DispatchError::Conflict(format!(
                "customer {customer_id} has no open rental of movie {movie_id}"
            ))
        })?;
        let (mut rental, rental_version) = self.load_rental(rental_id)?;
        let occurred_at = Utc::now();

        let rental_events = rental.handle(&RentalCommand::CloseRental(CloseRental {
            rental_id,
            returned_date,
            occurred_at,
        }))?;
        let movie_events = movie.handle(&MovieCommand::ReturnCopy(ReturnCopy {
            movie_id,
            rental_id,
            occurred_at,
        }))?;
        let customer_events = customer.handle(&CustomerCommand::ReturnMovie(ReturnMovie {
            customer_id,
            rental_id,
            occurred_at,
        }))?;

        let batch = vec![
            StreamAppend {
                aggregate_id: movie_id.0,
                expected_version: ExpectedVersion::Exact(movie_version),
                events: to_uncommitted(movie_id.0, movie::AGGREGATE_TYPE, &movie_events)?,
            },
            StreamAppend {
                aggregate_id: customer_id.0,
                expected_version: ExpectedVersion::Exact(customer_version),
                events: to_uncommitted(customer_id.0, customer::AGGREGATE_TYPE, &customer_events)?,
            },
            StreamAppend {
                aggregate_id: rental_id.0,
                expected_version: ExpectedVersion::Exact(rental_version),
                events: to_uncommitted(rental_id.0, rental::AGGREGATE_TYPE, &rental_events)?,
            },
        ];
        let committed = self.store.append_batch(batch)?;

        apply_all(&mut movie, &movie_events);
        apply_all(&mut customer, &customer_events);
        apply_all(&mut rental, &rental_events);

        info!(
            rental = %rental_id,
            %returned_date,
            available_inventory = movie.available_inventory(),
            movies_checked_out_count = customer.movies_checked_out_count(),
            "movie checked in"
        );

        publish(&self.bus, &committed)?;

        Ok(CheckinReceipt {
            rental_id,
            movie_id,
            customer_id,
            returned_date,
            available_inventory: movie.available_inventory(),
            movies_checked_out_count: customer.movies_checked_out_count(),
        })
    }

    pub fn movie(&self, movie_id: MovieId) -> Result<Movie, DispatchError> {
        self.load_movie(movie_id).map(|(m, _)| m)
    }

    pub fn customer(&self, customer_id: CustomerId) -> Result<Customer, DispatchError> {
        self.load_customer(customer_id).map(|(c, _)| c)
    }

    pub fn rental(&self, rental_id: RentalId) -> Result<Rental, DispatchError> {
        self.load_rental(rental_id).map(|(r, _)| r)
    }

    fn load_movie(&self, movie_id: MovieId) -> Result<(Movie, u64), DispatchError> {
        let loaded = load_aggregate(&self.store, movie_id.0, movie::AGGREGATE_TYPE, |id| {
            Movie::empty(MovieId::new(id))
        })?;
        existing(loaded, |m: &Movie| m.exists())
    }

    fn load_customer(&self, customer_id: CustomerId) -> Result<(Customer, u64), DispatchError> {
        let loaded = load_aggregate(&self.store, customer_id.0, customer::AGGREGATE_TYPE, |id| {
            Customer::empty(CustomerId::new(id))
        })?;
        existing(loaded, |c: &Customer| c.exists())
    }

    fn load_rental(&self, rental_id: RentalId) -> Result<(Rental, u64), DispatchError> {
        let loaded = load_aggregate(&self.store, rental_id.0, rental::AGGREGATE_TYPE, |id| {
            Rental::empty(RentalId::new(id))
        })?;
        existing(loaded, |r: &Rental| r.exists())
    }
}

fn existing<A>(loaded: (A, u64), exists: impl Fn(&A) -> bool) -> Result<(A, u64), DispatchError> {
    if exists(&loaded.0) {
        Ok(loaded)
    } else {
        Err(DispatchError::NotFound)
    }
}

fn apply_all<A: Aggregate>(aggregate: &mut A, events: &[A::Event]) {
    for e in events {
        aggregate.apply(e);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use proptest::prelude::*;
    use videostore_events::InMemoryEventBus;
    use videostore_rentals::{AddMovie, RegisterCustomer};

    use super::*;
    use crate::command_dispatcher::CommandDispatcher;
    use crate::event_store::InMemoryEventStore;

    type Store = Arc<InMemoryEventStore>;
    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    struct Fixture {
        dispatcher: CommandDispatcher<Store, Bus>,
        service: RentalService<Store, Bus>,
    }

    fn fixture() -> Fixture {
        let store: Store = Arc::new(InMemoryEventStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        Fixture {
            dispatcher: CommandDispatcher::new(store.clone(), bus.clone()),
            service: RentalService::new(store, bus, LoanPolicy::default()),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    impl Fixture {
        fn movie(&self, copies: u32) -> MovieId {
            let id = MovieId::new(AggregateId::new());
            self.dispatcher
                .dispatch(
                    id.0,
                    movie::AGGREGATE_TYPE,
                    MovieCommand::AddMovie(AddMovie {
                        movie_id: id,
                        title: "Psycho".to_string(),
                        overview: Some("A secretary embezzles money.".to_string()),
                        release_date: Some(date(1960, 6, 16)),
                        total_inventory: copies,
                        occurred_at: Utc::now(),
                    }),
                    |a| Movie::empty(MovieId::new(a)),
                )
                .unwrap();
            id
        }

        fn customer(&self) -> CustomerId {
            let id = CustomerId::new(AggregateId::new());
            self.dispatcher
                .dispatch(
                    id.0,
                    customer::AGGREGATE_TYPE,
                    CustomerCommand::RegisterCustomer(RegisterCustomer {
                        customer_id: id,
                        name: "Shelley Rocha".to_string(),
                        phone: None,
                        postal_code: None,
                        occurred_at: Utc::now(),
                    }),
                    |a| Customer::empty(CustomerId::new(a)),
                )
                .unwrap();
            id
        }
    }

    #[test]
    fn checkout_decrements_inventory_and_increments_count() {
        let f = fixture();
        let movie_id = f.movie(3);
        let customer_id = f.customer();

        let receipt = f
            .service
            .checkout_on(movie_id, customer_id, date(2019, 11, 5))
            .unwrap();

        assert_eq!(receipt.available_inventory, 2);
        assert_eq!(receipt.movies_checked_out_count, 1);
        assert_eq!(receipt.checkout_date, date(2019, 11, 5));
        assert_eq!(receipt.due_date, date(2019, 11, 12));

        let rental = f.service.rental(receipt.rental_id).unwrap();
        assert!(rental.is_open());
        assert_eq!(rental.movie_id(), Some(movie_id));
        assert_eq!(rental.customer_id(), Some(customer_id));
        assert_eq!(f.service.movie(movie_id).unwrap().available_inventory(), 2);
        assert_eq!(
            f.service.customer(customer_id).unwrap().movies_checked_out_count(),
            1
        );
    }

    #[test]
    fn checkin_restores_counters_and_keeps_the_rental() {
        let f = fixture();
        let movie_id = f.movie(3);
        let customer_id = f.customer();

        let out = f
            .service
            .checkout_on(movie_id, customer_id, date(2019, 11, 5))
            .unwrap();
        let back = f
            .service
            .checkin_on(movie_id, customer_id, date(2019, 11, 7))
            .unwrap();

        assert_eq!(back.rental_id, out.rental_id);
        assert_eq!(back.available_inventory, 3);
        assert_eq!(back.movies_checked_out_count, 0);

        let rental = f.service.rental(out.rental_id).unwrap();
        assert!(!rental.is_open());
        assert_eq!(rental.returned_date(), Some(date(2019, 11, 7)));
    }

    #[test]
    fn unknown_movie_or_customer_is_not_found() {
        let f = fixture();
        let movie_id = f.movie(1);
        let customer_id = f.customer();
        let unknown_movie = MovieId::new(AggregateId::new());
        let unknown_customer = CustomerId::new(AggregateId::new());

        assert!(matches!(
            f.service.checkout(unknown_movie, customer_id),
            Err(DispatchError::NotFound)
        ));
        assert!(matches!(
            f.service.checkout(movie_id, unknown_customer),
            Err(DispatchError::NotFound)
        ));
        assert!(matches!(
            f.service.checkin(unknown_movie, customer_id),
            Err(DispatchError::NotFound)
        ));
        assert!(matches!(
            f.service.checkin(movie_id, unknown_customer),
            Err(DispatchError::NotFound)
        ));
    }

    #[test]
    fn customer_id_passed_as_movie_is_not_found() {
        let f = fixture();
        let customer_id = f.customer();
        assert!(matches!(
            f.service.checkout(MovieId::new(customer_id.0), customer_id),
            Err(DispatchError::NotFound)
        ));
    }

    #[test]
    fn no_available_copy_conflicts_and_writes_nothing() {
        let f = fixture();
        let movie_id = f.movie(1);
        let first = f.customer();
        let second = f.customer();

        f.service.checkout(movie_id, first).unwrap();
        let err = f.service.checkout(movie_id, second).unwrap_err();

        assert!(matches!(err, DispatchError::Conflict(_)));
        assert_eq!(
            f.service.customer(second).unwrap().movies_checked_out_count(),
            0
        );
        assert_eq!(f.service.movie(movie_id).unwrap().available_inventory(), 0);
    }

    #[test]
    fn checkin_without_open_rental_conflicts() {
        let f = fixture();
        let movie_id = f.movie(2);
        let customer_id = f.customer();

        let err = f.service.checkin(movie_id, customer_id).unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));
        assert_eq!(f.service.movie(movie_id).unwrap().available_inventory(), 2);
    }

    #[test]
    fn checkout_publishes_all_three_streams_after_commit() {
        let f = fixture();
        let movie_id = f.movie(1);
        let customer_id = f.customer();
        let sub = f.dispatcher.bus().subscribe();

        let receipt = f.service.checkout(movie_id, customer_id).unwrap();

        let types: Vec<String> = std::iter::from_fn(|| sub.try_recv().ok())
            .map(|e| e.aggregate_type().to_string())
            .collect();
        assert_eq!(
            types,
            vec![
                movie::AGGREGATE_TYPE.to_string(),
                customer::AGGREGATE_TYPE.to_string(),
                rental::AGGREGATE_TYPE.to_string(),
            ]
        );
        assert!(f.service.rental(receipt.rental_id).is_ok());
    }

    #[test]
    fn racing_checkouts_of_the_last_copy_admit_one() {
        let f = Arc::new(fixture());
        let movie_id = f.movie(1);
        let customers: Vec<CustomerId> = (0..8).map(|_| f.customer()).collect();

        let handles: Vec<_> = customers
            .into_iter()
            .map(|c| {
                let f = f.clone();
                std::thread::spawn(move || f.service.checkout(movie_id, c))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().all(|r| matches!(
            r,
            Ok(_) | Err(DispatchError::Conflict(_)) | Err(DispatchError::Concurrency(_))
        )));
        assert_eq!(f.service.movie(movie_id).unwrap().available_inventory(), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        CheckOut { movie: usize, customer: usize },
        CheckIn { movie: usize, customer: usize },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..2usize, 0..3usize).prop_map(|(movie, customer)| Op::CheckOut { movie, customer }),
            (0..2usize, 0..3usize).prop_map(|(movie, customer)| Op::CheckIn { movie, customer }),
        ]
    }

    proptest! {
        #[test]
        fn counters_match_open_rentals(ops in proptest::collection::vec(op(), 1..40)) {
            let f = fixture();
            let movies = [f.movie(2), f.movie(3)];
            let customers = [f.customer(), f.customer(), f.customer()];
            let mut rentals: Vec<RentalId> = Vec::new();

            for op in ops {
                match op {
                    Op::CheckOut { movie, customer } => {
                        if let Ok(r) = f.service.checkout(movies[movie], customers[customer]) {
                            rentals.push(r.rental_id);
                        }
                    }
                    Op::CheckIn { movie, customer } => {
                        let _ = f.service.checkin(movies[movie], customers[customer]);
                    }
                }

                for m in movies {
                    let movie = f.service.movie(m).unwrap();
                    prop_assert!(movie.available_inventory() <= movie.total_inventory());
                }

                let mut open: HashMap<CustomerId, u32> = HashMap::new();
                for r in &rentals {
                    let rental = f.service.rental(*r).unwrap();
                    if rental.is_open() {
                        *open.entry(rental.customer_id().unwrap()).or_default() += 1;
                    }
                }
                for c in customers {
                    let customer = f.service.customer(c).unwrap();
                    prop_assert_eq!(
                        customer.movies_checked_out_count(),
                        open.get(&c).copied().unwrap_or(0)
                    );
                }
            }
        }
    }
}
