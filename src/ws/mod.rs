pub mod connctx;
pub mod hub;
pub mod presence;
pub mod router;
pub mod socket;
