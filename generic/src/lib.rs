#![cfg_attr(not(test), no_std)]

pub mod channel_status;
pub mod command_to_proto;
pub mod pump_error;
pub mod pump_proto;
