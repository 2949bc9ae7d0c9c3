pub mod bookings;
pub mod rides;
