pub mod axis;
pub mod controller_service;
pub mod goal;
pub mod multi_axis;
pub mod ptu;
pub mod single_axis;
pub mod state_store;
pub mod stepper;
