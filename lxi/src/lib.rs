//! # LXI Socket Client
//!
//! A thin client for LAN-attached lab instruments speaking SCPI/ASCII over a
//! raw TCP socket (the LXI socket interface). It opens one connection per
//! [`Device`], moves newline-terminated text frames across it and applies a
//! configurable read timeout.
//!
//! Instruments are addressed with VISA resource strings:
//!
//! ```
//! use lxi::VisaResource;
//!
//! let resource = VisaResource::parse("TCPIP::192.168.1.10::5025::SOCKET").unwrap();
//! assert_eq!(resource.port, 5025);
//! ```
//!
//! Errors are captured in the [`enum@Error`] type. Every failure is returned
//! to the caller; nothing is retried or swallowed internally.

use std::io;
use std::string::FromUtf8Error;

use thiserror::Error;

pub mod device;
pub mod resource;

pub use device::Device;
pub use resource::{VisaResource, DEFAULT_SOCKET_PORT};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid resource string: {0}")]
    InvalidResource(String),
    #[error("Unsupported interface type: {0}")]
    UnsupportedInterface(String),
    #[error("Invalid port: {0}")]
    InvalidPort(String),
    #[error("IO Error occurred: {0}")]
    Io(#[from] io::Error),
    #[error("Timeout")]
    Timeout,
    #[error("Device is disconnected")]
    Disconnected,
    #[error("Response is not valid UTF-8: {0}")]
    DecodeError(#[from] FromUtf8Error),
}

pub type Result<T> = std::result::Result<T, Error>;
