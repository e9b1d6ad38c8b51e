pub mod country;
pub mod lifecycle;
pub mod trip;
pub mod user;
