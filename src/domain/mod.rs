//! Domain layer: subscription records and nonce identity.

pub mod subscription;

pub use subscription::{ExtraNonce1, NewSubscription, Subscription};
