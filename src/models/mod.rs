pub mod appointment;
pub mod business_hours;
pub mod directory;
pub mod interval;
pub mod slot;

pub use appointment::{Appointment, AppointmentStatus};
pub use business_hours::{WeeklyHours, WorkingWindow};
pub use directory::{Service, Staff, Tenant};
pub use interval::Interval;
pub use slot::{AvailableSlot, DayCount, FanOutFailure};
