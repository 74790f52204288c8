pub mod availability;
pub mod booking;
pub mod busy;
pub mod calendar;
pub mod clock;
pub mod locks;
pub mod slots;
pub mod sync;
pub mod working_hours;

#[cfg(test)]
pub(crate) mod test_support;
