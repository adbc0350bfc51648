pub mod config;
pub mod logging;

pub mod bus;
pub mod checkpoint;
pub mod dispatcher;
pub mod job;
pub mod paths;
pub mod publisher;
pub mod registry;
pub mod transfer;
pub mod worker;
