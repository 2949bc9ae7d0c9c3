mod booking;
mod coordinates;
mod ride;

pub use booking::{Booking, ConfirmationStage, PaymentRef, Status as BookingStatus};
pub use coordinates::{Coordinates, RouteGeometry};
pub use ride::{Ride, Status as RideStatus};
