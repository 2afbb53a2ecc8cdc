#![cfg_attr(docsrs, feature(doc_cfg))]
//! # imaxb6_lib
//!
//! This crate provides a library for controlling iMAX B6 mini battery chargers over their
//! USB bulk interface: starting charge/discharge programs, stopping them and reading back
//! charge, system and device information.
//!
//! ## Features
//!
//! - `default`: Enables `bin-dependencies`, which is intended for compiling the `imaxb6` command-line tool and pulls in `usb` and `serde`.
//!
//! ### Client Features
//! - `usb`: Enables the USB endpoint using the `nusb` crate together with `Charger::open`.
//!
//! Without `usb` the [`client::Charger`] can still be driven by any [`transport::Endpoint`].
//!
//! ### Utility Features
//! - `serde`: Enables `serde` support for serializing the decoded records.
//! - `bin-dependencies`: Enables all features required by the `imaxb6` binary executable.

/// Contains error types for the library.
mod error;
/// Defines the wire protocol of the charger.
pub mod protocol;
/// Request/reply exchange with retry.
pub mod transport;
/// High level charger client.
pub mod client;

pub use client::Charger;
pub use error::Error;

/// USB endpoint for the charger.
#[cfg_attr(docsrs, doc(cfg(feature = "usb")))]
#[cfg(feature = "usb")]
pub mod usb;
