pub mod credentials;
pub mod endpoints;
pub mod events;
pub mod pantry;
pub mod runs;
