//! Records read from the booking side of the system

mod booking;

pub use booking::{Booking, BookingUpgrade, Provider, Room, Upgrade};
