pub mod delivery_state;

pub use delivery_state::DeliveryState;
