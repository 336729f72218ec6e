#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod calibration;
pub mod channel;
pub mod command;
pub mod controller;
pub mod decimal_editor;
pub mod flow_rate;
pub mod keypad;
pub mod menu;
pub mod message_queue;
pub mod scheduler;
pub mod screen;
pub mod state;
pub mod storage;
pub mod timer;
