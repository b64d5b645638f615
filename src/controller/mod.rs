//! # Controller Module
//!
//! Train controller input handling.
//!
//! This module handles:
//! - The canonical, hardware-independent controller state
//! - Decoding each hardware family into that state
//! - Output reports for controllers with lamps and displays
//! - Tracking known controllers across reconnects
//! - Calibrating classic adapters with unknown button layouts

pub mod analog;
pub mod byte_range;
pub mod calibration;
pub mod classic;
pub mod decoder;
pub mod display;
pub mod registry;
pub mod state;
pub mod train_sim;
