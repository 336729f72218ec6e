mod board_helper;

pub mod config;

#[cfg(feature = "bsp_pico_shield_stack")]
pub mod board_pico_shield_stack;
#[cfg(feature = "bsp_pico_shield_stack")]
pub use board_pico_shield_stack::*;
