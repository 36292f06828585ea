/// This module implements [`VisaResource`] which is used for parsing
/// VISA resource strings of the form "TCPIP::192.168.1.10::5025::SOCKET"
use std::fmt;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Port used when the resource string omits the port segment. This is the
/// conventional port for raw SCPI socket connections on LXI instruments.
pub const DEFAULT_SOCKET_PORT: u16 = 5025;

/// Represents a parsed VISA resource string.
///
/// Only the TCPIP socket interface class is supported, i.e. strings of the
/// shape `TCPIP[board]::<host>[::<port>][::SOCKET]`. Segment comparison is
/// ASCII-case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisaResource {
    pub host: String,
    pub port: u16,
}

impl VisaResource {
    /// Create a new `VisaResource` by parsing the given resource string.
    ///
    /// Each malformed shape maps to a distinct error: an unrecognized
    /// interface class or sub-type token yields
    /// [`Error::UnsupportedInterface`], a bad port segment yields
    /// [`Error::InvalidPort`] and everything else (wrong segment count,
    /// empty host) yields [`Error::InvalidResource`].
    pub fn parse(address: &str) -> crate::Result<Self> {
        let splits: Vec<&str> = address.split("::").collect();
        if splits.len() < 2 || splits.len() > 4 {
            return Err(Error::InvalidResource(address.to_string()));
        }
        if !is_tcpip(splits[0]) {
            return Err(Error::UnsupportedInterface(splits[0].to_string()));
        }
        let host = splits[1];
        if host.is_empty() {
            return Err(Error::InvalidResource(address.to_string()));
        }
        let mut rest = &splits[2..];
        if let Some(last) = rest.last() {
            if last.chars().any(|x| x.is_ascii_alphabetic()) {
                if !last.eq_ignore_ascii_case("SOCKET") {
                    return Err(Error::UnsupportedInterface(last.to_string()));
                }
                rest = &rest[..rest.len() - 1];
            }
        }
        let port = match rest {
            [] => DEFAULT_SOCKET_PORT,
            [port] => match port.parse::<u16>() {
                Ok(x) if x > 0 => x,
                _ => return Err(Error::InvalidPort(port.to_string())),
            },
            _ => return Err(Error::InvalidResource(address.to_string())),
        };
        Ok(VisaResource {
            host: host.to_string(),
            port,
        })
    }
}

/// The interface class token is "TCPIP", optionally followed by a decimal
/// board index as in "TCPIP0".
fn is_tcpip(token: &str) -> bool {
    match token.get(..5) {
        Some(class) if class.eq_ignore_ascii_case("TCPIP") => {
            token[5..].chars().all(|x| x.is_ascii_digit())
        }
        _ => false,
    }
}

impl From<VisaResource> for String {
    fn from(resource: VisaResource) -> Self {
        format!("TCPIP::{}::{}::SOCKET", resource.host, resource.port)
    }
}

impl Display for VisaResource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let x: String = self.clone().into();
        f.write_str(&x)
    }
}
