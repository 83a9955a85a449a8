use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use videostore_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use videostore_events::Event;

use crate::rental::RentalId;

/// Stream type for movie aggregates.
pub const AGGREGATE_TYPE: &str = "rentals.movie";

/// Movie identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovieId(pub AggregateId);

impl MovieId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MovieId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Movie.
///
/// Owns the copy count and the set of rentals currently holding a copy.
/// `available_inventory` is derived from both, so it can never drift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movie {
    id: MovieId,
    title: String,
    overview: Option<String>,
    release_date: Option<NaiveDate>,
    total_inventory: u32,
    on_loan: Vec<RentalId>,
    version: u64,
    created: bool,
}

impl Movie {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: MovieId) -> Self {
        Self {
            id,
            title: String::new(),
            overview: None,
            release_date: None,
            total_inventory: 0,
            on_loan: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> MovieId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn overview(&self) -> Option<&str> {
        self.overview.as_deref()
    }

    pub fn release_date(&self) -> Option<NaiveDate> {
        self.release_date
    }

    pub fn total_inventory(&self) -> u32 {
        self.total_inventory
    }

    /// Copies not currently on loan.
    pub fn available_inventory(&self) -> u32 {
        self.total_inventory.saturating_sub(self.copies_on_loan())
    }

    pub fn copies_on_loan(&self) -> u32 {
        u32::try_from(self.on_loan.len()).unwrap_or(u32::MAX)
    }

    pub fn is_on_loan(&self, rental_id: RentalId) -> bool {
        self.on_loan.contains(&rental_id)
    }
}

impl AggregateRoot for Movie {
    type Id = MovieId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: AddMovie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMovie {
    pub movie_id: MovieId,
    pub title: String,
    pub overview: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub total_inventory: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CheckOutCopy (one copy leaves the shelf for `rental_id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutCopy {
    pub movie_id: MovieId,
    pub rental_id: RentalId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReturnCopy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnCopy {
    pub movie_id: MovieId,
    pub rental_id: RentalId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeInventory (copies bought or written off).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeInventory {
    pub movie_id: MovieId,
    pub total_inventory: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovieCommand {
    AddMovie(AddMovie),
    CheckOutCopy(CheckOutCopy),
    ReturnCopy(ReturnCopy),
    ChangeInventory(ChangeInventory),
}

/// Event: MovieAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieAdded {
    pub movie_id: MovieId,
    pub title: String,
    pub overview: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub total_inventory: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CopyCheckedOut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyCheckedOut {
    pub movie_id: MovieId,
    pub rental_id: RentalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CopyReturned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyReturned {
    pub movie_id: MovieId,
    pub rental_id: RentalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InventoryChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryChanged {
    pub movie_id: MovieId,
    pub total_inventory: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovieEvent {
    MovieAdded(MovieAdded),
    CopyCheckedOut(CopyCheckedOut),
    CopyReturned(CopyReturned),
    InventoryChanged(InventoryChanged),
}

impl MovieEvent {
    pub fn movie_id(&self) -> MovieId {
        match self {
            MovieEvent::MovieAdded(e) => e.movie_id,
            MovieEvent::CopyCheckedOut(e) => e.movie_id,
            MovieEvent::CopyReturned(e) => e.movie_id,
            MovieEvent::InventoryChanged(e) => e.movie_id,
        }
    }
}

impl Event for MovieEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MovieEvent::MovieAdded(_) => "rentals.movie.added",
            MovieEvent::CopyCheckedOut(_) => "rentals.movie.copy_checked_out",
            MovieEvent::CopyReturned(_) => "rentals.movie.copy_returned",
            MovieEvent::InventoryChanged(_) => "rentals.movie.inventory_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MovieEvent::MovieAdded(e) => e.occurred_at,
            MovieEvent::CopyCheckedOut(e) => e.occurred_at,
            MovieEvent::CopyReturned(e) => e.occurred_at,
            MovieEvent::InventoryChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Movie {
    type Command = MovieCommand;
    type Event = MovieEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MovieEvent::MovieAdded(e) => {
                self.id = e.movie_id;
                self.title = e.title.clone();
                self.overview = e.overview.clone();
                self.release_date = e.release_date;
                self.total_inventory = e.total_inventory;
                self.on_loan.clear();
                self.created = true;
            }
            MovieEvent::CopyCheckedOut(e) => {
                self.on_loan.push(e.rental_id);
            }
            MovieEvent::CopyReturned(e) => {
                self.on_loan.retain(|r| *r != e.rental_id);
            }
            MovieEvent::InventoryChanged(e) => {
                self.total_inventory = e.total_inventory;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MovieCommand::AddMovie(cmd) => self.handle_add(cmd),
            MovieCommand::CheckOutCopy(cmd) => self.handle_check_out(cmd),
            MovieCommand::ReturnCopy(cmd) => self.handle_return(cmd),
            MovieCommand::ChangeInventory(cmd) => self.handle_change_inventory(cmd),
        }
    }
}

impl Movie {
    fn ensure_movie_id(&self, movie_id: MovieId) -> Result<(), DomainError> {
        if self.id != movie_id {
            return Err(DomainError::invariant("movie_id mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_add(&self, cmd: &AddMovie) -> Result<Vec<MovieEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("movie already exists"));
        }
        if cmd.title.trim().is_empty() {
            return Err(DomainError::validation("title cannot be empty"));
        }
        Ok(vec![MovieEvent::MovieAdded(MovieAdded {
            movie_id: cmd.movie_id,
            title: cmd.title.trim().to_string(),
            overview: cmd.overview.clone(),
            release_date: cmd.release_date,
            total_inventory: cmd.total_inventory,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_check_out(&self, cmd: &CheckOutCopy) -> Result<Vec<MovieEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_movie_id(cmd.movie_id)?;

        if self.is_on_loan(cmd.rental_id) {
            return Err(DomainError::conflict("rental already holds a copy"));
        }
        if self.available_inventory() == 0 {
            return Err(DomainError::conflict(format!(
                "no copies of '{}' are available",
                self.title
            )));
        }

        Ok(vec![MovieEvent::CopyCheckedOut(CopyCheckedOut {
            movie_id: cmd.movie_id,
            rental_id: cmd.rental_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_return(&self, cmd: &ReturnCopy) -> Result<Vec<MovieEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_movie_id(cmd.movie_id)?;

        if !self.is_on_loan(cmd.rental_id) {
            return Err(DomainError::conflict("rental does not hold a copy of this movie"));
        }

        Ok(vec![MovieEvent::CopyReturned(CopyReturned {
            movie_id: cmd.movie_id,
            rental_id: cmd.rental_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_inventory(
        &self,
        cmd: &ChangeInventory,
    ) -> Result<Vec<MovieEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_movie_id(cmd.movie_id)?;

        if cmd.total_inventory < self.copies_on_loan() {
            return Err(DomainError::invariant(format!(
                "total inventory {} is below the {} copies on loan",
                cmd.total_inventory,
                self.copies_on_loan()
            )));
        }
        if cmd.total_inventory == self.total_inventory {
            return Ok(vec![]);
        }

        Ok(vec![MovieEvent::InventoryChanged(InventoryChanged {
            movie_id: cmd.movie_id,
            total_inventory: cmd.total_inventory,
            occurred_at: cmd.occurred_at,
        })])
    }
}
