pub mod authorization_store;
pub mod detection_event;
pub mod detection_log;
