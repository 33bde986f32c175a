pub mod agents;
pub mod bookings;

#[cfg(test)]
mod agents_http_tests;


pub use agents::configure_agent_routes;
pub use bookings::configure_booking_routes;
