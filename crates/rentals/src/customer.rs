use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use videostore_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use videostore_events::Event;

use crate::movie::MovieId;
use crate::rental::RentalId;

/// Stream type for customer aggregates.
pub const AGGREGATE_TYPE: &str = "rentals.customer";

/// Customer identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub AggregateId);

impl CustomerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A rental the customer has not returned yet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenLoan {
    pub rental_id: RentalId,
    pub movie_id: MovieId,
}

/// Aggregate root: Customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    id: CustomerId,
    name: String,
    phone: Option<String>,
    postal_code: Option<String>,
    registered_at: Option<DateTime<Utc>>,
    /// In checkout order, oldest first.
    open_loans: Vec<OpenLoan>,
    version: u64,
    created: bool,
}

impl Customer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CustomerId) -> Self {
        Self {
            id,
            name: String::new(),
            phone: None,
            postal_code: None,
            registered_at: None,
            open_loans: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn postal_code(&self) -> Option<&str> {
        self.postal_code.as_deref()
    }

    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }

    pub fn open_loans(&self) -> &[OpenLoan] {
        &self.open_loans
    }

    /// Number of rentals currently open for this customer.
    pub fn movies_checked_out_count(&self) -> u32 {
        u32::try_from(self.open_loans.len()).unwrap_or(u32::MAX)
    }

    /// Oldest open rental of `movie_id`, if any.
    pub fn open_rental_for(&self, movie_id: MovieId) -> Option<RentalId> {
        self.open_loans
            .iter()
            .find(|l| l.movie_id == movie_id)
            .map(|l| l.rental_id)
    }
}

impl AggregateRoot for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterCustomer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCustomer {
    pub customer_id: CustomerId,
    pub name: String,
    pub phone: Option<String>,
    pub postal_code: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CheckOutMovie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutMovie {
    pub customer_id: CustomerId,
    pub rental_id: RentalId,
    pub movie_id: MovieId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReturnMovie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnMovie {
    pub customer_id: CustomerId,
    pub rental_id: RentalId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerCommand {
    RegisterCustomer(RegisterCustomer),
    CheckOutMovie(CheckOutMovie),
    ReturnMovie(ReturnMovie),
}

/// Event: CustomerRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRegistered {
    pub customer_id: CustomerId,
    pub name: String,
    pub phone: Option<String>,
    pub postal_code: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MovieCheckedOut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieCheckedOut {
    pub customer_id: CustomerId,
    pub rental_id: RentalId,
    pub movie_id: MovieId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MovieReturned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieReturned {
    pub customer_id: CustomerId,
    pub rental_id: RentalId,
    pub movie_id: MovieId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerEvent {
    CustomerRegistered(CustomerRegistered),
    MovieCheckedOut(MovieCheckedOut),
    MovieReturned(MovieReturned),
}

impl CustomerEvent {
    pub fn customer_id(&self) -> CustomerId {
        match self {
            CustomerEvent::CustomerRegistered(e) => e.customer_id,
            CustomerEvent::MovieCheckedOut(e) => e.customer_id,
            CustomerEvent::MovieReturned(e) => e.customer_id,
        }
    }
}

impl Event for CustomerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::CustomerRegistered(_) => "rentals.customer.registered",
            CustomerEvent::MovieCheckedOut(_) => "rentals.customer.movie_checked_out",
            CustomerEvent::MovieReturned(_) => "rentals.customer.movie_returned",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CustomerEvent::CustomerRegistered(e) => e.occurred_at,
            CustomerEvent::MovieCheckedOut(e) => e.occurred_at,
            CustomerEvent::MovieReturned(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Customer {
    type Command = CustomerCommand;
    type Event = CustomerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CustomerEvent::CustomerRegistered(e) => {
                self.id = e.customer_id;
                self.name = e.name.clone();
                self.phone = e.phone.clone();
                self.postal_code = e.postal_code.clone();
                self.registered_at = Some(e.occurred_at);
                self.open_loans.clear();
                self.created = true;
            }
            CustomerEvent::MovieCheckedOut(e) => {
                self.open_loans.push(OpenLoan {
                    rental_id: e.rental_id,
                    movie_id: e.movie_id,
                });
            }
            CustomerEvent::MovieReturned(e) => {
                self.open_loans.retain(|l| l.rental_id != e.rental_id);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CustomerCommand::RegisterCustomer(cmd) => self.handle_register(cmd),
            CustomerCommand::CheckOutMovie(cmd) => self.handle_check_out(cmd),
            CustomerCommand::ReturnMovie(cmd) => self.handle_return(cmd),
        }
    }
}

impl Customer {
    fn ensure_customer_id(&self, customer_id: CustomerId) -> Result<(), DomainError> {
        if self.id != customer_id {
            return Err(DomainError::invariant("customer_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("customer already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(vec![CustomerEvent::CustomerRegistered(CustomerRegistered {
            customer_id: cmd.customer_id,
            name: cmd.name.trim().to_string(),
            phone: cmd.phone.clone(),
            postal_code: cmd.postal_code.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_check_out(&self, cmd: &CheckOutMovie) -> Result<Vec<CustomerEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_customer_id(cmd.customer_id)?;

        if self.open_loans.iter().any(|l| l.rental_id == cmd.rental_id) {
            return Err(DomainError::conflict("rental is already open for this customer"));
        }

        Ok(vec![CustomerEvent::MovieCheckedOut(MovieCheckedOut {
            customer_id: cmd.customer_id,
            rental_id: cmd.rental_id,
            movie_id: cmd.movie_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_return(&self, cmd: &ReturnMovie) -> Result<Vec<CustomerEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_customer_id(cmd.customer_id)?;

        let loan = self
            .open_loans
            .iter()
            .find(|l| l.rental_id == cmd.rental_id)
            .ok_or_else(|| DomainError::conflict("rental is not open for this customer"))?;

        Ok(vec![CustomerEvent::MovieReturned(MovieReturned {
            customer_id: cmd.customer_id,
            rental_id: cmd.rental_id,
            movie_id: loan.movie_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
