//! Types shared between the radio daemon and its clients: the control-socket
//! wire protocol, configuration, platform paths and the published daemon state.

pub mod config;
pub mod platform;
pub mod protocol;
pub mod state;
