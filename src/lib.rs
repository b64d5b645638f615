//! # Dengo Bridge Library
//!
//! Drive a train simulator with Densha de GO! controllers.
//!
//! Raw input from console-adapter joysticks, direct-USB controllers and PC
//! peripherals is decoded into one canonical state (brake notch, power
//! notch, reverser and buttons) and translated into abstract host commands.
//!
//! - [`controller`] - canonical state, per-family decoders, registry and calibration
//! - [`joystick`] - joystick-style input sources
//! - [`usb`] - raw USB transport and the background poll thread
//! - [`commands`] - notch conversion, button bindings and key repeat
//! - [`bridge`] - the per-frame facade used by the host

pub mod bridge;
pub mod commands;
pub mod config;
pub mod controller;
pub mod error;
pub mod joystick;
pub mod notify;
pub mod usb;
