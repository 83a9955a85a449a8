//! Rental domain module (event-sourced).
//!
//! Movies, customers and rental records, implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage). Cross-aggregate orchestration
//! (checkout/checkin) lives in the infrastructure layer.

pub mod customer;
pub mod movie;
pub mod policy;
pub mod rental;

pub use customer::{
    CheckOutMovie, Customer, CustomerCommand, CustomerEvent, CustomerId, CustomerRegistered,
    MovieCheckedOut, MovieReturned, OpenLoan, RegisterCustomer, ReturnMovie,
};
pub use movie::{
    AddMovie, ChangeInventory, CheckOutCopy, CopyCheckedOut, CopyReturned, InventoryChanged, Movie,
    MovieAdded, MovieCommand, MovieEvent, MovieId, ReturnCopy,
};
pub use policy::LoanPolicy;
pub use rental::{
    CloseRental, OpenRental, Rental, RentalClosed, RentalCommand, RentalEvent, RentalId,
    RentalOpened,
};
