use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use videostore_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use videostore_events::Event;

use crate::customer::CustomerId;
use crate::movie::MovieId;

/// Stream type for rental aggregates.
pub const AGGREGATE_TYPE: &str = "rentals.rental";

/// Rental identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RentalId(pub AggregateId);

impl RentalId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for RentalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Rental (one checkout cycle of one movie by one customer).
///
/// A rental is open until `returned_date` is recorded; records are never deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rental {
    id: RentalId,
    customer_id: Option<CustomerId>,
    movie_id: Option<MovieId>,
    checkout_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    returned_date: Option<NaiveDate>,
    version: u64,
    created: bool,
}

impl Rental {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: RentalId) -> Self {
        Self {
            id,
            customer_id: None,
            movie_id: None,
            checkout_date: None,
            due_date: None,
            returned_date: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> RentalId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn movie_id(&self) -> Option<MovieId> {
        self.movie_id
    }

    pub fn checkout_date(&self) -> Option<NaiveDate> {
        self.checkout_date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn returned_date(&self) -> Option<NaiveDate> {
        self.returned_date
    }

    pub fn is_open(&self) -> bool {
        self.created && self.returned_date.is_none()
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_open() && self.due_date.is_some_and(|due| due < today)
    }
}

impl AggregateRoot for Rental {
    type Id = RentalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenRental.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRental {
    pub rental_id: RentalId,
    pub customer_id: CustomerId,
    pub movie_id: MovieId,
    pub checkout_date: NaiveDate,
    pub due_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseRental.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseRental {
    pub rental_id: RentalId,
    pub returned_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RentalCommand {
    OpenRental(OpenRental),
    CloseRental(CloseRental),
}

/// Event: RentalOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalOpened {
    pub rental_id: RentalId,
    pub customer_id: CustomerId,
    pub movie_id: MovieId,
    pub checkout_date: NaiveDate,
    pub due_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RentalClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalClosed {
    pub rental_id: RentalId,
    pub returned_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RentalEvent {
    RentalOpened(RentalOpened),
    RentalClosed(RentalClosed),
}

impl RentalEvent {
    pub fn rental_id(&self) -> RentalId {
        match self {
            RentalEvent::RentalOpened(e) => e.rental_id,
            RentalEvent::RentalClosed(e) => e.rental_id,
        }
    }
}

impl Event for RentalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RentalEvent::RentalOpened(_) => "rentals.rental.opened",
            RentalEvent::RentalClosed(_) => "rentals.rental.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RentalEvent::RentalOpened(e) => e.occurred_at,
            RentalEvent::RentalClosed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Rental {
    type Command = RentalCommand;
    type Event = RentalEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RentalEvent::RentalOpened(e) => {
                self.id = e.rental_id;
                self.customer_id = Some(e.customer_id);
                self.movie_id = Some(e.movie_id);
                self.checkout_date = Some(e.checkout_date);
                self.due_date = Some(e.due_date);
                self.returned_date = None;
                self.created = true;
            }
            RentalEvent::RentalClosed(e) => {
                self.returned_date = Some(e.returned_date);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RentalCommand::OpenRental(cmd) => self.handle_open(cmd),
            RentalCommand::CloseRental(cmd) => self.handle_close(cmd),
        }
    }
}

impl Rental {
    fn handle_open(&self, cmd: &OpenRental) -> Result<Vec<RentalEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("rental already exists"));
        }
        if cmd.due_date < cmd.checkout_date {
            return Err(DomainError::validation("due_date cannot precede checkout_date"));
        }
        Ok(vec![RentalEvent::RentalOpened(RentalOpened {
            rental_id: cmd.rental_id,
            customer_id: cmd.customer_id,
            movie_id: cmd.movie_id,
            checkout_date: cmd.checkout_date,
            due_date: cmd.due_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close(&self, cmd: &CloseRental) -> Result<Vec<RentalEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != cmd.rental_id {
            return Err(DomainError::invariant("rental_id mismatch"));
        }
        if self.returned_date.is_some() {
            return Err(DomainError::conflict("rental was already returned"));
        }
        if self.checkout_date.is_some_and(|d| cmd.returned_date < d) {
            return Err(DomainError::validation("returned_date cannot precede checkout_date"));
        }
        Ok(vec![RentalEvent::RentalClosed(RentalClosed {
            rental_id: cmd.rental_id,
            returned_date: cmd.returned_date,
            occurred_at: cmd.occurred_at,
        })])
    }
}
